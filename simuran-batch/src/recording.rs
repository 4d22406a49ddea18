//! A single recording session
//!
//! A [`Recording`] carries free-form metadata, an optional source handle,
//! the loader that knows how to materialize it, the loaded payload and an
//! append-only bag of analysis results.
//!
//! The loaded state is derived, never stored: a recording is loaded exactly
//! when `last_loaded_source` is set and equals `source_file`. Changing the
//! source handle therefore invalidates the payload and the next `load()`
//! re-materializes it. `load()` is the only place that commits a payload, so
//! a failed load leaves `data` and `last_loaded_source` untouched.

use crate::loader::Loader;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use simuran_common::{Error, ErrorKind, ParameterMap, Result};
use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Reserved attribute holding the index-table row identity
pub const INDEX_KEY: &str = "_index";

/// Loader-owned OS resource kept alive inside a payload
pub trait SourceResource: Send + fmt::Debug {
    /// Release the resource; must be safe to call more than once
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// An open file kept by a loader until unload
#[derive(Debug)]
pub struct OpenFile {
    path: PathBuf,
    file: Option<File>,
}

impl OpenFile {
    pub fn new(path: impl Into<PathBuf>, file: File) -> Self {
        Self {
            path: path.into(),
            file: Some(file),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceResource for OpenFile {
    fn close(&mut self) {
        if self.file.take().is_some() {
            tracing::debug!("Closed {}", self.path.display());
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

/// Uniformly sampled numeric signal
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Signal {
    pub sample_rate: Option<f64>,
    pub samples: Vec<f64>,
}

impl Signal {
    pub fn new(samples: Vec<f64>, sample_rate: Option<f64>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds when the sample rate is known
    pub fn duration(&self) -> Option<f64> {
        self.sample_rate
            .filter(|rate| *rate > 0.0)
            .map(|rate| self.samples.len() as f64 / rate)
    }
}

/// Data materialized by a loader
#[derive(Debug, Default)]
pub struct Payload {
    /// Structured sections (e.g. top-level keys of a JSON session file)
    pub sections: Map<String, Value>,
    /// Named numeric signals
    pub signals: IndexMap<String, Signal>,
    handle: Option<Box<dyn SourceResource>>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the resource the loader must release on unload
    pub fn with_handle(mut self, handle: Box<dyn SourceResource>) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn handle(&self) -> Option<&dyn SourceResource> {
        self.handle.as_deref()
    }

    pub fn has_open_handle(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_open()).unwrap_or(false)
    }

    /// Close and drop the attached resource, if any
    pub fn release_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.signals.is_empty()
    }
}

/// Sentinel stored in a result slot when an analysis call failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorResult {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error({}): {}", self.kind, self.message)
    }
}

impl From<&Error> for ErrorResult {
    fn from(err: &Error) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// One entry of a recording's result bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultValue {
    Ok(Value),
    Failed(ErrorResult),
}

impl ResultValue {
    pub fn value(&self) -> Option<&Value> {
        match self {
            ResultValue::Ok(value) => Some(value),
            ResultValue::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorResult> {
        match self {
            ResultValue::Ok(_) => None,
            ResultValue::Failed(err) => Some(err),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResultValue::Failed(_))
    }

    /// Follow `path` into nested mappings (or list positions) of an ok value
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let value = self.value()?;
        path.iter().try_fold(value, |value, part| match value {
            Value::Object(map) => map.get(*part),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Value placed in a flattened result table
    pub fn to_cell(&self) -> Value {
        match self {
            ResultValue::Ok(value) => value.clone(),
            ResultValue::Failed(err) => Value::String(err.to_string()),
        }
    }
}

impl From<Value> for ResultValue {
    fn from(value: Value) -> Self {
        ResultValue::Ok(value)
    }
}

/// Pick a key for `name` that is not yet used in `existing`
///
/// The first use is `name` itself, later ones `name_2`, `name_3`, ...
pub fn unique_key<V>(existing: &IndexMap<String, V>, name: &str) -> String {
    if !existing.contains_key(name) {
        return name.to_string();
    }
    (2..)
        .map(|k| format!("{}_{}", name, k))
        .find(|candidate| !existing.contains_key(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// One experimental session
#[derive(Debug, Default)]
pub struct Recording {
    /// Free-form metadata; keys starting with `_` are reserved
    pub attrs: ParameterMap,
    /// Opaque source handle: a path, session id or URL
    pub source_file: Option<String>,
    /// Data tags the loader advertises or the caller requests
    pub available_data: BTreeSet<String>,
    /// Wall-clock time of the session
    pub datetime: Option<DateTime<Utc>>,
    pub tag: Option<String>,
    /// Append-only analysis results in insertion order
    pub results: IndexMap<String, ResultValue>,
    last_loaded_source: Option<String>,
    loader: Option<Arc<dyn Loader>>,
    data: Option<Payload>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_attrs(attrs: ParameterMap) -> Self {
        let mut recording = Self::default();
        recording.attrs = attrs;
        recording
    }

    pub fn with_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_file = Some(source.into());
        self
    }

    pub fn loader(&self) -> Option<&Arc<dyn Loader>> {
        self.loader.as_ref()
    }

    /// Replace the loader; any payload from the previous loader is released first
    pub fn set_loader(&mut self, loader: Arc<dyn Loader>) {
        self.unload();
        self.loader = Some(loader);
    }

    /// Point the recording at a new source; the old payload stays until the next load
    pub fn set_source_file(&mut self, source: Option<String>) {
        self.source_file = source;
    }

    pub fn last_loaded_source(&self) -> Option<&str> {
        self.last_loaded_source.as_deref()
    }

    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    pub fn data_mut(&mut self) -> Option<&mut Payload> {
        self.data.as_mut()
    }

    /// Row identity from the index table, if this recording came from one
    pub fn index(&self) -> Option<&Value> {
        self.attrs.get(INDEX_KEY)
    }

    fn require_loader(&self) -> Result<Arc<dyn Loader>> {
        self.loader.clone().ok_or_else(|| {
            Error::Configuration(format!(
                "recording {} has no loader assigned",
                self.display_name()
            ))
        })
    }

    /// Let the loader derive the source handle and data tags from `attrs`
    pub fn parse_metadata(&mut self) -> Result<()> {
        let loader = self.require_loader()?;
        loader.parse_metadata(self)
    }

    pub fn is_loaded(&self) -> bool {
        match (&self.last_loaded_source, &self.source_file) {
            (Some(loaded), Some(current)) => loaded == current,
            _ => false,
        }
    }

    /// Materialize the payload; a no-op when already loaded
    pub fn load(&mut self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let loader = self.require_loader()?;
        let payload = loader.load_recording(self)?;

        if let Some(mut previous) = self.data.replace(payload) {
            loader.unload(&mut previous);
        }
        self.last_loaded_source = self.source_file.clone();
        tracing::debug!("Loaded recording {}", self.display_name());
        Ok(())
    }

    /// Release the payload and any loader-owned resources; idempotent
    pub fn unload(&mut self) {
        if let Some(mut payload) = self.data.take() {
            match &self.loader {
                Some(loader) => loader.unload(&mut payload),
                None => payload.release_handle(),
            }
            tracing::debug!("Unloaded recording {}", self.display_name());
        }
        self.last_loaded_source = None;
    }

    /// Copy of the metadata and results without the payload
    pub fn metadata_copy(&self) -> Self {
        Self {
            attrs: self.attrs.clone(),
            source_file: self.source_file.clone(),
            available_data: self.available_data.clone(),
            datetime: self.datetime,
            tag: self.tag.clone(),
            results: self.results.clone(),
            last_loaded_source: None,
            loader: self.loader.clone(),
            data: None,
        }
    }

    /// Value of `key` from `attrs`, falling back to the recording's own fields
    pub fn property(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.attrs.get(key) {
            return Some(value.clone());
        }
        match key {
            "source_file" => self.source_file.clone().map(Value::String),
            "tag" => self.tag.clone().map(Value::String),
            "datetime" => self.datetime.map(|dt| Value::String(dt.to_rfc3339())),
            "available_data" => Some(Value::Array(
                self.available_data.iter().cloned().map(Value::String).collect(),
            )),
            _ => None,
        }
    }

    /// Append results, disambiguating keys that are already present
    pub fn merge_results<I>(&mut self, results: I)
    where
        I: IntoIterator<Item = (String, ResultValue)>,
    {
        for (name, value) in results {
            let key = unique_key(&self.results, &name);
            self.results.insert(key, value);
        }
    }

    pub fn reset_results(&mut self) {
        self.results.clear();
    }

    /// Filesystem-safe stem naming this recording's outputs
    ///
    /// Built from the source handle (relative to `base_dir` when it is a
    /// prefix) with path separators replaced by `--`; falls back to the row
    /// index, then the tag.
    pub fn name_for_save(&self, base_dir: Option<&Path>) -> String {
        if let Some(source) = &self.source_file {
            let path = Path::new(source);
            let relative = base_dir
                .and_then(|base| path.strip_prefix(base).ok())
                .unwrap_or(path);
            let parts: Vec<String> = relative
                .with_extension("")
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            if !parts.is_empty() {
                return sanitize_name(&parts.join("--"));
            }
        }
        if let Some(index) = self.index() {
            return sanitize_name(&crate::table::render_value(index, None));
        }
        self.tag
            .as_deref()
            .map(sanitize_name)
            .unwrap_or_else(|| "recording".to_string())
    }

    /// Short label for logs
    pub fn display_name(&self) -> String {
        match (&self.source_file, self.index()) {
            (Some(source), _) => source.clone(),
            (None, Some(index)) => format!("row {}", crate::table::render_value(index, None)),
            (None, None) => self.tag.clone().unwrap_or_else(|| "<unnamed>".to_string()),
        }
    }

    /// Human-readable summary for debugging
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Recording {}", self.display_name());
        let _ = writeln!(
            out,
            "  source_file: {}",
            self.source_file.as_deref().unwrap_or("<none>")
        );
        let _ = writeln!(
            out,
            "  loader: {}",
            self.loader.as_ref().map(|l| l.name()).unwrap_or("<none>")
        );
        let _ = writeln!(out, "  loaded: {}", self.is_loaded());
        if let Some(dt) = self.datetime {
            let _ = writeln!(out, "  datetime: {}", dt.to_rfc3339());
        }
        if let Some(tag) = &self.tag {
            let _ = writeln!(out, "  tag: {}", tag);
        }
        let tags: Vec<&str> = self.available_data.iter().map(String::as_str).collect();
        let _ = writeln!(out, "  available_data: [{}]", tags.join(", "));
        let _ = writeln!(out, "  attrs:");
        for (key, value) in self.attrs.iter() {
            let _ = writeln!(out, "    {}: {}", key, value);
        }
        if let Some(payload) = &self.data {
            let _ = writeln!(
                out,
                "  data: {} sections, {} signals",
                payload.sections.len(),
                payload.signals.len()
            );
        }
        let keys: Vec<&str> = self.results.keys().map(String::as_str).collect();
        let _ = write!(out, "  results: [{}]", keys.join(", "));
        out
    }

    pub fn to_snapshot(&self) -> RecordingSnapshot {
        RecordingSnapshot {
            attrs: self.attrs.clone(),
            source_file: self.source_file.clone(),
            available_data: self.available_data.clone(),
            datetime: self.datetime,
            tag: self.tag.clone(),
            results: self.results.clone(),
        }
    }

    /// Rebuild an unloaded recording from a snapshot
    pub fn from_snapshot(snapshot: RecordingSnapshot, loader: Option<Arc<dyn Loader>>) -> Self {
        Self {
            attrs: snapshot.attrs,
            source_file: snapshot.source_file,
            available_data: snapshot.available_data,
            datetime: snapshot.datetime,
            tag: snapshot.tag,
            results: snapshot.results,
            last_loaded_source: None,
            loader,
            data: None,
        }
    }
}

impl Clone for Recording {
    /// Clones never share or copy the payload
    fn clone(&self) -> Self {
        self.metadata_copy()
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        self.unload();
    }
}

/// Serializable, payload-free form of a [`Recording`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSnapshot {
    pub attrs: ParameterMap,
    pub source_file: Option<String>,
    #[serde(default)]
    pub available_data: BTreeSet<String>,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub results: IndexMap<String, ResultValue>,
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MetadataLoader;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Loader that fails on demand and counts releases
    #[derive(Debug, Default)]
    struct FlakyLoader {
        fail: std::sync::atomic::AtomicBool,
        loads: AtomicUsize,
        unloads: AtomicUsize,
    }

    #[derive(Debug)]
    struct Token(bool);

    impl SourceResource for Token {
        fn close(&mut self) {
            self.0 = false;
        }

        fn is_open(&self) -> bool {
            self.0
        }
    }

    impl Loader for FlakyLoader {
        fn name(&self) -> &str {
            "flaky"
        }

        fn parse_metadata(&self, recording: &mut Recording) -> Result<()> {
            recording.source_file = recording.attrs.get_str("path").map(str::to_string);
            Ok(())
        }

        fn load_recording(&self, recording: &Recording) -> Result<Payload> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::format(
                    recording.source_file.clone().unwrap_or_default(),
                    "truncated",
                ));
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            let mut payload = Payload::new().with_handle(Box::new(Token(true)));
            payload
                .sections
                .insert("source".into(), json!(recording.source_file));
            Ok(payload)
        }

        fn unload(&self, payload: &mut Payload) {
            if payload.has_open_handle() {
                self.unloads.fetch_add(1, Ordering::SeqCst);
            }
            payload.release_handle();
        }
    }

    fn flaky_recording(loader: &Arc<FlakyLoader>, path: &str) -> Recording {
        let mut attrs = ParameterMap::new();
        attrs.insert("path", json!(path));
        let mut rec = Recording::from_attrs(attrs).with_loader(loader.clone());
        rec.parse_metadata().unwrap();
        rec
    }

    #[test]
    fn test_unique_key_sequence() {
        let mut map: IndexMap<String, i32> = IndexMap::new();
        for i in 0..3 {
            let key = unique_key(&map, "fn");
            map.insert(key, i);
        }
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["fn", "fn_2", "fn_3"]);
    }

    #[test]
    fn test_load_sets_loaded_state() {
        let loader = Arc::new(FlakyLoader::default());
        let mut rec = flaky_recording(&loader, "/data/s1.json");
        assert!(!rec.is_loaded());

        rec.load().unwrap();
        assert!(rec.is_loaded());
        assert_eq!(rec.last_loaded_source(), rec.source_file.as_deref());

        // Second load is a no-op
        rec.load().unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_source_change_invalidates_and_releases_old_payload() {
        let loader = Arc::new(FlakyLoader::default());
        let mut rec = flaky_recording(&loader, "/data/s1.json");
        rec.load().unwrap();

        rec.set_source_file(Some("/data/s2.json".to_string()));
        assert!(!rec.is_loaded());
        rec.load().unwrap();
        assert!(rec.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(loader.unloads.load(Ordering::SeqCst), 1);
        assert_eq!(
            rec.data().unwrap().sections.get("source"),
            Some(&json!("/data/s2.json"))
        );
    }

    #[test]
    fn test_failed_load_leaves_state_unchanged() {
        let loader = Arc::new(FlakyLoader::default());
        let mut rec = flaky_recording(&loader, "/data/s1.json");
        rec.load().unwrap();

        rec.set_source_file(Some("/data/s2.json".to_string()));
        loader.fail.store(true, Ordering::SeqCst);
        let err = rec.load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(rec.last_loaded_source(), Some("/data/s1.json"));
        assert_eq!(
            rec.data().unwrap().sections.get("source"),
            Some(&json!("/data/s1.json"))
        );
    }

    #[test]
    fn test_unload_is_idempotent_and_drop_releases() {
        let loader = Arc::new(FlakyLoader::default());
        let mut rec = flaky_recording(&loader, "/data/s1.json");
        rec.load().unwrap();
        rec.unload();
        rec.unload();
        assert!(!rec.is_loaded());
        assert!(rec.data().is_none());
        assert_eq!(loader.unloads.load(Ordering::SeqCst), 1);

        rec.load().unwrap();
        drop(rec);
        assert_eq!(loader.unloads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_load_unload_load_matches_single_load() {
        let loader = Arc::new(FlakyLoader::default());
        let mut once = flaky_recording(&loader, "/data/s1.json");
        once.load().unwrap();

        let mut twice = flaky_recording(&loader, "/data/s1.json");
        twice.load().unwrap();
        twice.unload();
        twice.load().unwrap();

        assert_eq!(once.is_loaded(), twice.is_loaded());
        assert_eq!(once.last_loaded_source(), twice.last_loaded_source());
        assert_eq!(once.data().unwrap().sections, twice.data().unwrap().sections);
        assert_eq!(once.to_snapshot(), twice.to_snapshot());
    }

    #[test]
    fn test_clone_does_not_copy_payload() {
        let loader = Arc::new(FlakyLoader::default());
        let mut rec = flaky_recording(&loader, "/data/s1.json");
        rec.load().unwrap();

        let copy = rec.clone();
        assert!(copy.data().is_none());
        assert!(!copy.is_loaded());
        assert_eq!(copy.source_file, rec.source_file);
    }

    #[test]
    fn test_load_without_loader_is_configuration_error() {
        let mut rec = Recording::new().with_source("/data/s1.json");
        assert_eq!(rec.load().unwrap_err().kind(), ErrorKind::Configuration);
        assert_eq!(rec.parse_metadata().unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_merge_results_never_overwrites() {
        let mut rec = Recording::new();
        rec.merge_results(vec![("rate".to_string(), ResultValue::Ok(json!(1)))]);
        rec.merge_results(vec![("rate".to_string(), ResultValue::Ok(json!(2)))]);
        let keys: Vec<&str> = rec.results.keys().map(String::as_str).collect();
        assert_eq!(keys, ["rate", "rate_2"]);

        rec.reset_results();
        assert!(rec.results.is_empty());
    }

    #[test]
    fn test_property_falls_back_to_fields() {
        let mut attrs = ParameterMap::new();
        attrs.insert("rat", json!("r1"));
        let mut rec = Recording::from_attrs(attrs).with_source("/data/s1.json");
        rec.tag = Some("baseline".to_string());

        assert_eq!(rec.property("rat"), Some(json!("r1")));
        assert_eq!(rec.property("source_file"), Some(json!("/data/s1.json")));
        assert_eq!(rec.property("tag"), Some(json!("baseline")));
        assert_eq!(rec.property("missing"), None);
    }

    #[test]
    fn test_name_for_save() {
        let rec = Recording::new().with_source("/data/rat1/s1.json");
        assert_eq!(rec.name_for_save(Some(Path::new("/data"))), "rat1--s1");
        assert_eq!(rec.name_for_save(Some(Path::new("/other"))), "data--rat1--s1");

        let mut attrs = ParameterMap::new();
        attrs.insert(INDEX_KEY, json!(4));
        assert_eq!(Recording::from_attrs(attrs).name_for_save(None), "4");
        assert_eq!(Recording::new().name_for_save(None), "recording");
    }

    #[test]
    fn test_result_lookup_and_cell() {
        let ok = ResultValue::Ok(json!({"fields": {"peak": 2.5}, "list": [1, 2]}));
        assert_eq!(ok.lookup(&["fields", "peak"]), Some(&json!(2.5)));
        assert_eq!(ok.lookup(&["list", "1"]), Some(&json!(2)));
        assert_eq!(ok.lookup(&["nope"]), None);

        let failed = ResultValue::Failed(ErrorResult::new(ErrorKind::Analysis, "boom"));
        assert_eq!(failed.to_cell(), json!("error(AnalysisError): boom"));
        assert!(failed.lookup(&[]).is_none());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let loader: Arc<dyn Loader> = Arc::new(MetadataLoader::new());
        let mut attrs = ParameterMap::new();
        attrs.insert("rat", json!("r1"));
        let mut rec = Recording::from_attrs(attrs).with_loader(loader.clone());
        rec.parse_metadata().unwrap();
        rec.merge_results(vec![("n".to_string(), ResultValue::Ok(json!(3)))]);

        let text = serde_json::to_string(&rec.to_snapshot()).unwrap();
        let snapshot: RecordingSnapshot = serde_json::from_str(&text).unwrap();
        let restored = Recording::from_snapshot(snapshot, Some(loader));
        assert_eq!(restored.to_snapshot(), rec.to_snapshot());
    }

    #[test]
    fn test_inspect_mentions_fields() {
        let rec = Recording::new().with_source("/data/s1.json");
        let text = rec.inspect();
        assert!(text.contains("/data/s1.json"));
        assert!(text.contains("loaded: false"));
    }
}
