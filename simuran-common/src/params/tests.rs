use super::*;
use serde_json::json;
use tempfile::TempDir;

fn sample() -> ParameterMap {
    let mut params = ParameterMap::new();
    params.insert("a", json!(1));
    params.insert("b", json!([1, 2, 3]));
    params.insert("c", json!({"d": "x"}));
    params
}

#[test]
fn test_insertion_order_preserved() {
    let mut params = ParameterMap::new();
    params.insert("zeta", json!(1));
    params.insert("alpha", json!(2));
    params.insert("mid", json!(3));

    let keys: Vec<&String> = params.keys().collect();
    assert_eq!(keys, ["zeta", "alpha", "mid"]);

    // Replacing a key keeps its slot
    params.insert("zeta", json!(10));
    let keys: Vec<&String> = params.keys().collect();
    assert_eq!(keys, ["zeta", "alpha", "mid"]);
}

#[test]
fn test_setdefault_only_inserts_missing() {
    let mut params = ParameterMap::new();
    params.insert("rate", json!(250));

    assert_eq!(*params.setdefault("rate", json!(1000)), json!(250));
    assert_eq!(*params.setdefault("channels", json!(4)), json!(4));
    assert_eq!(params.get_i64("channels"), Some(4));
}

#[test]
fn test_pop_keeps_remaining_order() {
    let mut params = ParameterMap::new();
    params.insert("a", json!(1));
    params.insert("b", json!(2));
    params.insert("c", json!(3));

    assert_eq!(params.pop("b"), Some(json!(2)));
    assert_eq!(params.pop("missing"), None);
    let keys: Vec<&String> = params.keys().collect();
    assert_eq!(keys, ["a", "c"]);
}

#[test]
fn test_update_other_wins() {
    let mut base = ParameterMap::new();
    base.insert("a", json!(1));
    base.insert("b", json!(2));

    let mut other = ParameterMap::new();
    other.insert("b", json!(20));
    other.insert("c", json!(30));

    base.update(&other);
    assert_eq!(base.get_i64("a"), Some(1));
    assert_eq!(base.get_i64("b"), Some(20));
    assert_eq!(base.get_i64("c"), Some(30));
}

#[test]
fn test_require_reports_missing_key() {
    let params = sample();
    assert!(params.require("a").is_ok());

    let err = params.require("sample_rate").unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("sample_rate"));
}

#[test]
fn test_lookup_dotted_path() {
    let params = sample();
    assert_eq!(params.lookup("c.d"), Some(&json!("x")));
    assert_eq!(params.lookup("c.missing"), None);
    assert_eq!(params.lookup("a"), Some(&json!(1)));
}

#[test]
fn test_get_string_list_accepts_scalar() {
    let mut params = ParameterMap::new();
    params.insert("one", json!("signals"));
    params.insert("many", json!(["signals", "units"]));

    assert_eq!(params.get_string_list("one"), Some(vec!["signals".to_string()]));
    assert_eq!(
        params.get_string_list("many"),
        Some(vec!["signals".to_string(), "units".to_string()])
    );
    assert_eq!(params.get_string_list("absent"), None);
}

#[test]
fn test_round_trip_all_formats() {
    let temp_dir = TempDir::new().unwrap();
    let params = sample();

    for ext in ["toml", "yaml", "yml", "json"] {
        let path = temp_dir.path().join(format!("params.{}", ext));
        params.write(&path).unwrap();
        let loaded = ParameterMap::read(&path).unwrap();
        assert_eq!(loaded, params, "round trip failed for .{}", ext);
        assert_eq!(loaded.source_file(), Some(path.as_path()));
    }
}

#[test]
fn test_round_trip_floats_and_bools() {
    let temp_dir = TempDir::new().unwrap();
    let mut params = ParameterMap::new();
    params.insert("threshold", json!(0.25));
    params.insert("enabled", json!(true));
    params.insert("names", json!(["CA1", "RSC"]));
    params.insert("filter", json!({"low": 1.5, "high": 300.0, "order": 4}));

    for ext in ["toml", "yaml", "json"] {
        let path = temp_dir.path().join(format!("floats.{}", ext));
        params.write(&path).unwrap();
        assert_eq!(ParameterMap::read(&path).unwrap(), params);
    }
}

#[test]
fn test_toml_rejects_null() {
    let temp_dir = TempDir::new().unwrap();
    let mut params = ParameterMap::new();
    params.insert("missing", Value::Null);

    let err = params.write(temp_dir.path().join("null.toml")).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn test_unknown_extension_is_configuration_error() {
    let err = ParameterMap::read("params.ini").unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_missing_file_is_source_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let err = ParameterMap::read(temp_dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable(_)));
}

#[test]
fn test_malformed_file_is_format_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.json");
    std::fs::write(&path, "{\"a\": [1, 2").unwrap();

    let err = ParameterMap::read(&path).unwrap_err();
    assert!(matches!(err, Error::Format { .. }));
}

#[test]
fn test_top_level_must_be_mapping() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("list.yaml");
    std::fs::write(&path, "- 1\n- 2\n").unwrap();

    let err = ParameterMap::read(&path).unwrap_err();
    assert!(matches!(err, Error::Format { .. }));
}

#[test]
fn test_dirname_placeholder_uses_file_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "table: __dirname__/index.csv\nnested:\n  out: __dirname__/results\nlist:\n  - __dirname__\n",
    )
    .unwrap();

    let params = ParameterMap::read(&path).unwrap();
    let dir = temp_dir.path().to_string_lossy().to_string();
    assert_eq!(params.get_str("table"), Some(format!("{}/index.csv", dir).as_str()));
    assert_eq!(params.lookup("nested.out"), Some(&json!(format!("{}/results", dir))));
    assert_eq!(params.get("list"), Some(&json!([dir])));
}

#[test]
fn test_dirname_placeholder_uses_configured_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, r#"{"cache": "__dirname__/cache"}"#).unwrap();

    let params = ParameterMap::read_with_dirname(&path, Path::new("/data/sessions")).unwrap();
    assert_eq!(params.get_str("cache"), Some("/data/sessions/cache"));
}

#[test]
fn test_serializes_as_plain_mapping() {
    let mut params = sample();
    params.set_source_file("/tmp/somewhere.json");
    let text = serde_json::to_string(&params).unwrap();
    assert_eq!(text, r#"{"a":1,"b":[1,2,3],"c":{"d":"x"}}"#);
}
