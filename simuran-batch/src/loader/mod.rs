//! Loader contract and registry
//!
//! A [`Loader`] is the data-source driver behind a [`Recording`]. Consumers
//! only ever go through this trait; adding a data source means adding a new
//! implementation and registering a factory for it under a name.
//!
//! Loaders never mutate a recording's payload directly: `load_recording`
//! returns a [`Payload`] and [`Recording::load`] commits it together with
//! the loaded source handle, so a failed load changes nothing.
//!
//! # Usage
//!
//! ```rust
//! use simuran_batch::loader::{create_loader, Loader};
//! use simuran_common::ParameterMap;
//!
//! let loader = create_loader("metadata", &ParameterMap::new()).unwrap();
//! assert_eq!(loader.name(), "metadata");
//! ```

use crate::recording::{Payload, Recording, INDEX_KEY};
use crate::table::{IndexTable, TableRow};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use simuran_common::{Error, ParameterMap, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

mod file_format;
mod metadata;

pub use file_format::{DataFormat, FileFormatLoader, DEFAULT_SOURCE_KEYS};
pub use metadata::MetadataLoader;

/// Data-source driver for recordings
pub trait Loader: Send + Sync + fmt::Debug {
    /// Registry name of this loader
    fn name(&self) -> &str;

    /// Name plus options; enough to rebuild the loader through the registry
    fn descriptor(&self) -> LoaderDescriptor {
        LoaderDescriptor::new(self.name())
    }

    /// Derive `source_file`, `available_data` and friends from `attrs`
    ///
    /// Must be idempotent. Fails with a configuration error when required
    /// keys are missing.
    fn parse_metadata(&self, recording: &mut Recording) -> Result<()>;

    /// Read the recording's source into a new payload
    ///
    /// Called only after `parse_metadata`.
    fn load_recording(&self, recording: &Recording) -> Result<Payload>;

    /// Merge an index-table row into `attrs` and parse the metadata
    fn parse_row(&self, row: &TableRow, recording: &mut Recording) -> Result<()> {
        for (column, value) in &row.fields {
            recording.attrs.insert(column.clone(), value.clone());
        }
        recording.attrs.insert(INDEX_KEY, row.index.to_value());
        self.parse_metadata(recording)
    }

    /// Release loader-owned resources inside `payload`; safe to repeat
    fn unload(&self, payload: &mut Payload) {
        payload.release_handle();
    }

    /// Scan `root` for sources and return an index table
    fn index_files(&self, root: &Path) -> Result<IndexTable> {
        Err(Error::Configuration(format!(
            "loader '{}' cannot index files (asked to scan {})",
            self.name(),
            root.display()
        )))
    }
}

/// Serializable identity of a loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderDescriptor {
    pub name: String,
    #[serde(default)]
    pub options: ParameterMap,
}

impl LoaderDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: ParameterMap::new(),
        }
    }

    pub fn with_options(mut self, options: ParameterMap) -> Self {
        self.options = options;
        self
    }
}

/// Builds a loader from its options
pub type LoaderFactory = Arc<dyn Fn(&ParameterMap) -> Result<Arc<dyn Loader>> + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<String, LoaderFactory>>> = Lazy::new(|| {
    let mut factories: HashMap<String, LoaderFactory> = HashMap::new();
    factories.insert(MetadataLoader::NAME.to_string(), Arc::new(metadata_factory));
    factories.insert(FileFormatLoader::NAME.to_string(), Arc::new(file_format_factory));
    factories.insert(DataFormat::Json.name().to_string(), Arc::new(json_factory));
    factories.insert(DataFormat::Csv.name().to_string(), Arc::new(csv_factory));
    RwLock::new(factories)
});

fn metadata_factory(_options: &ParameterMap) -> Result<Arc<dyn Loader>> {
    Ok(Arc::new(MetadataLoader::new()))
}

fn file_format_factory(options: &ParameterMap) -> Result<Arc<dyn Loader>> {
    Ok(Arc::new(FileFormatLoader::from_options(options)?))
}

fn json_factory(options: &ParameterMap) -> Result<Arc<dyn Loader>> {
    Ok(Arc::new(FileFormatLoader::with_options(DataFormat::Json, options)))
}

fn csv_factory(options: &ParameterMap) -> Result<Arc<dyn Loader>> {
    Ok(Arc::new(FileFormatLoader::with_options(DataFormat::Csv, options)))
}

/// Register (or replace) a loader factory under `name`
pub fn register_loader<F>(name: impl Into<String>, factory: F)
where
    F: Fn(&ParameterMap) -> Result<Arc<dyn Loader>> + Send + Sync + 'static,
{
    let name = name.into();
    tracing::debug!("Registering loader '{}'", name);
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name, Arc::new(factory));
}

/// Build the loader registered under `name`
pub fn create_loader(name: &str, options: &ParameterMap) -> Result<Arc<dyn Loader>> {
    let factory = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned();
    match factory {
        Some(factory) => factory(options),
        None => Err(Error::Configuration(format!(
            "unknown loader '{}' (registered: {})",
            name,
            registered_loaders().join(", ")
        ))),
    }
}

pub fn create_from_descriptor(descriptor: &LoaderDescriptor) -> Result<Arc<dyn Loader>> {
    create_loader(&descriptor.name, &descriptor.options)
}

/// Registered loader names, sorted
pub fn registered_loaders() -> Vec<String> {
    let mut names: Vec<String> = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct EchoLoader;

    impl Loader for EchoLoader {
        fn name(&self) -> &str {
            "echo"
        }

        fn parse_metadata(&self, recording: &mut Recording) -> Result<()> {
            recording.source_file = Some("echo".to_string());
            Ok(())
        }

        fn load_recording(&self, _recording: &Recording) -> Result<Payload> {
            Ok(Payload::new())
        }
    }

    #[test]
    fn test_builtin_loaders_registered() {
        let names = registered_loaders();
        for name in ["metadata", "file_format", "json", "csv"] {
            assert!(names.iter().any(|n| n == name), "missing {}", name);
        }
    }

    #[test]
    fn test_unknown_loader_is_configuration_error() {
        let err = create_loader("axona", &ParameterMap::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("axona"));
    }

    #[test]
    fn test_register_custom_loader() {
        register_loader("echo_test", |_| Ok(Arc::new(EchoLoader) as Arc<dyn Loader>));
        let loader = create_loader("echo_test", &ParameterMap::new()).unwrap();
        assert_eq!(loader.name(), "echo");
    }

    #[test]
    fn test_default_parse_row_sets_index() {
        let loader = EchoLoader;
        let row = TableRow::new("s7").with("rat", json!("r1"));
        let mut rec = Recording::new();
        loader.parse_row(&row, &mut rec).unwrap();
        assert_eq!(rec.attrs.get(INDEX_KEY), Some(&json!("s7")));
        assert_eq!(rec.attrs.get("rat"), Some(&json!("r1")));
        assert_eq!(rec.source_file.as_deref(), Some("echo"));
    }

    #[test]
    fn test_default_index_files_unsupported() {
        let err = EchoLoader.index_files(Path::new("/data")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_descriptor_round_trip() {
        let mut options = ParameterMap::new();
        options.insert("sample_rate", json!(250.0));
        let loader = create_loader("csv", &options).unwrap();
        let descriptor = loader.descriptor();
        assert_eq!(descriptor.name, "csv");

        let rebuilt = create_from_descriptor(&descriptor).unwrap();
        assert_eq!(rebuilt.descriptor(), descriptor);
    }
}
