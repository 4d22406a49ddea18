//! Ordered parameter mappings
//!
//! `ParameterMap` is the string-keyed mapping used for recording metadata,
//! container attributes and per-function configuration. Iteration follows
//! insertion order. Maps can be read from and written to TOML, YAML and JSON
//! files (see [`ParamFormat`]); the `__dirname__` placeholder inside string
//! values is replaced with a directory path at read time so config files can
//! be relocated.
//!
//! # Usage
//!
//! ```rust
//! use simuran_common::ParameterMap;
//! use serde_json::json;
//!
//! let mut params = ParameterMap::new();
//! params.insert("sample_rate", json!(250.0));
//! params.setdefault("channels", json!([1, 2, 3]));
//! assert_eq!(params.get_f64("sample_rate"), Some(250.0));
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

mod format;
#[cfg(test)]
mod tests;

pub use format::ParamFormat;

/// Literal token replaced with the configured directory when a file is read
pub const DIRNAME_PLACEHOLDER: &str = "__dirname__";

/// Ordered string-keyed mapping with file provenance
///
/// Serializes as a plain mapping; `source_file` is provenance only and is
/// not part of equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap {
    entries: Map<String, Value>,
    #[serde(skip)]
    source_file: Option<PathBuf>,
}

impl PartialEq for ParameterMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing JSON object map
    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self {
            entries,
            source_file: None,
        }
    }

    /// Build from a JSON value, which must be an object (or null for empty)
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            Value::Null => Ok(Self::new()),
            other => Err(Error::InvalidInput(format!(
                "ParameterMap requires a mapping, got {}",
                type_name(&other)
            ))),
        }
    }

    /// File this map was read from, if any
    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn set_source_file(&mut self, path: impl Into<PathBuf>) {
        self.source_file = Some(path.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    /// Get a value or fail with a configuration error naming the key
    pub fn require(&self, key: &str) -> Result<&Value> {
        self.entries.get(key).ok_or_else(|| {
            let origin = self
                .source_file
                .as_ref()
                .map(|p| format!(" (in {})", p.display()))
                .unwrap_or_default();
            Error::Configuration(format!("missing required key '{}'{}", key, origin))
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.entries.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.entries.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.entries.get(key).and_then(Value::as_bool)
    }

    /// Nested mapping under `key`, if the value is an object
    pub fn get_map(&self, key: &str) -> Option<ParameterMap> {
        match self.entries.get(key) {
            Some(Value::Object(map)) => Some(ParameterMap::from_map(map.clone())),
            _ => None,
        }
    }

    /// String list under `key`; a single string counts as a one-element list
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.entries.get(key)? {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Insert a value, returning the previous one for that key
    ///
    /// A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Return the value for `key`, inserting `default` first if absent
    pub fn setdefault(&mut self, key: impl Into<String>, default: Value) -> &mut Value {
        self.entries.entry(key.into()).or_insert(default)
    }

    /// Remove `key`, preserving the order of the remaining entries
    pub fn pop(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Merge another map into this one; `other` wins on key collision
    pub fn update(&mut self, other: &ParameterMap) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Merge key/value pairs; later pairs win
    pub fn extend<I, K>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in pairs {
            self.entries.insert(key.into(), value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.entries
    }

    /// Look up a dotted path such as `"summary.columns"` through nested mappings
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = self.entries.get(parts.next()?)?;
        parts.try_fold(first, |value, part| value.get(part))
    }

    /// Replace the dirname placeholder in every string value
    pub fn substitute_dirname(&mut self, dirname: &Path) {
        let replacement = dirname.to_string_lossy();
        for value in self.entries.values_mut() {
            substitute_in_value(value, &replacement);
        }
    }

    /// Read a map from a file, substituting the placeholder with the file's directory
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dirname = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::read_with_dirname(path, &dirname)
    }

    /// Read a map from a file, substituting the placeholder with `dirname`
    pub fn read_with_dirname(path: impl AsRef<Path>, dirname: &Path) -> Result<Self> {
        let path = path.as_ref();
        let format = ParamFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::SourceUnavailable(format!("parameter file {}", path.display()))
            }
            _ => Error::Io(e),
        })?;
        let entries = format.parse(&content, &path.display().to_string())?;

        let mut params = Self::from_map(entries);
        params.substitute_dirname(dirname);
        params.source_file = Some(path.to_path_buf());
        tracing::debug!(
            "Read {} parameters from {} ({:?})",
            params.len(),
            path.display(),
            format
        );
        Ok(params)
    }

    /// Write the map to `path` in the format chosen by its extension
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = ParamFormat::from_path(path)?;
        let content = format.render(&self.entries)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl From<Map<String, Value>> for ParameterMap {
    fn from(entries: Map<String, Value>) -> Self {
        Self::from_map(entries)
    }
}

impl FromIterator<(String, Value)> for ParameterMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ParameterMap {
    type Item = (&'a String, &'a Value);
    type IntoIter = serde_json::map::Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn substitute_in_value(value: &mut Value, replacement: &str) {
    match value {
        Value::String(s) if s.contains(DIRNAME_PLACEHOLDER) => {
            *s = s.replace(DIRNAME_PLACEHOLDER, replacement);
        }
        Value::Array(items) => {
            for item in items {
                substitute_in_value(item, replacement);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_in_value(item, replacement);
            }
        }
        _ => {}
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
