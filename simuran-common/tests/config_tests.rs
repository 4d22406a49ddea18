//! Run configuration files and directory resolution

use serde_json::json;
use serial_test::serial;
use simuran_common::config::{resolve_output_dir, DEFAULT_OUTPUT_DIRNAME, OUTPUT_DIR_ENV};
use simuran_common::{ErrorKind, ParameterMap};
use std::path::Path;
use tempfile::TempDir;

const RUN_CONFIG: &str = r#"
loader = "csv"
load_on_fly = true
to_load = ["csv"]

[loader_options]
sample_rate = 250.0
cache_dir = "__dirname__/cache"

[summary]
columns = ["payload_overview.signals"]
decimals = 3
"#;

#[test]
fn test_read_run_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("place_cells.toml");
    std::fs::write(&path, RUN_CONFIG).unwrap();

    let config = ParameterMap::read(&path).unwrap();
    assert_eq!(config.get_str("loader"), Some("csv"));
    assert_eq!(config.get_bool("load_on_fly"), Some(true));
    assert_eq!(config.get_string_list("to_load"), Some(vec!["csv".to_string()]));

    let options = config.get_map("loader_options").unwrap();
    assert_eq!(options.get_f64("sample_rate"), Some(250.0));
    assert_eq!(
        options.get_str("cache_dir").map(str::to_string),
        Some(format!("{}/cache", temp_dir.path().display()))
    );
    assert_eq!(config.lookup("summary.decimals"), Some(&json!(3)));
    assert_eq!(config.source_file(), Some(path.as_path()));
}

#[test]
fn test_function_list_in_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("functions.yaml");
    std::fs::write(
        &path,
        "functions:\n  - attrs_summary\n  - payload_overview\nfunction_args:\n  attrs_summary:\n    keys: [rat, region]\n",
    )
    .unwrap();

    let list = ParameterMap::read(&path).unwrap();
    assert_eq!(
        list.get_string_list("functions"),
        Some(vec!["attrs_summary".to_string(), "payload_overview".to_string()])
    );
    assert_eq!(
        list.lookup("function_args.attrs_summary.keys"),
        Some(&json!(["rat", "region"]))
    );
}

#[test]
fn test_write_then_read_json_keeps_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested/out.json");
    let mut params = ParameterMap::new();
    params.insert("zeta", json!(1));
    params.insert("alpha", json!({"b": 2, "a": 1}));
    params.write(&path).unwrap();

    let read = ParameterMap::read(&path).unwrap();
    assert_eq!(read, params);
    assert_eq!(read.keys().collect::<Vec<_>>(), ["zeta", "alpha"]);
}

#[test]
fn test_missing_required_key_is_configuration_error() {
    let params = ParameterMap::new();
    assert_eq!(params.require("functions").unwrap_err().kind(), ErrorKind::Configuration);
}

#[test]
#[serial]
fn test_output_dir_defaults_next_to_index() {
    std::env::remove_var(OUTPUT_DIR_ENV);
    let temp_dir = TempDir::new().unwrap();
    let index = temp_dir.path().join("index.csv");
    std::fs::write(&index, "index,rat\n0,r1\n").unwrap();

    assert_eq!(
        resolve_output_dir(None, &index),
        temp_dir.path().join(DEFAULT_OUTPUT_DIRNAME)
    );
    assert_eq!(
        resolve_output_dir(None, temp_dir.path()),
        temp_dir.path().join(DEFAULT_OUTPUT_DIRNAME)
    );
}

#[test]
#[serial]
fn test_output_dir_priority() {
    let temp_dir = TempDir::new().unwrap();
    let index = temp_dir.path().join("index.csv");

    std::env::set_var(OUTPUT_DIR_ENV, "/srv/simuran/out");
    assert_eq!(resolve_output_dir(None, &index), Path::new("/srv/simuran/out"));
    assert_eq!(
        resolve_output_dir(Some(Path::new("/cli/out")), &index),
        Path::new("/cli/out")
    );
    std::env::remove_var(OUTPUT_DIR_ENV);
}
