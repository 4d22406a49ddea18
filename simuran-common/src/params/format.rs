//! ParameterMap file formats
//!
//! The extension picks the parser:
//! - `.toml` - the Rust-native config literal
//! - `.yaml` / `.yml`
//! - `.json`

use super::type_name;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Supported parameter file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamFormat {
    Toml,
    Yaml,
    Json,
}

impl ParamFormat {
    /// Select a format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "toml" => Ok(ParamFormat::Toml),
            "yaml" | "yml" => Ok(ParamFormat::Yaml),
            "json" => Ok(ParamFormat::Json),
            _ => Err(Error::Configuration(format!(
                "unsupported parameter file extension '{}' for {} (expected toml, yaml, yml or json)",
                ext,
                path.display()
            ))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ParamFormat::Toml => "toml",
            ParamFormat::Yaml => "yaml",
            ParamFormat::Json => "json",
        }
    }

    /// Parse file content into an ordered mapping
    pub(crate) fn parse(self, content: &str, source_name: &str) -> Result<Map<String, Value>> {
        let value: Value = match self {
            ParamFormat::Toml => {
                toml::from_str(content).map_err(|e| Error::format(source_name, e))?
            }
            ParamFormat::Yaml => {
                if content.trim().is_empty() {
                    return Ok(Map::new());
                }
                serde_yaml::from_str(content).map_err(|e| Error::format(source_name, e))?
            }
            ParamFormat::Json => {
                serde_json::from_str(content).map_err(|e| Error::format(source_name, e))?
            }
        };

        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(Error::format(
                source_name,
                format!("top level must be a mapping, found {}", type_name(&other)),
            )),
        }
    }

    /// Render a mapping in this format
    pub(crate) fn render(self, entries: &Map<String, Value>) -> Result<String> {
        match self {
            ParamFormat::Toml => {
                // TOML has no null; nested tables must follow plain keys
                let mut ordered = Map::new();
                for (key, value) in entries.iter().filter(|(_, v)| !v.is_object()) {
                    ordered.insert(key.clone(), value.clone());
                }
                for (key, value) in entries.iter().filter(|(_, v)| v.is_object()) {
                    ordered.insert(key.clone(), value.clone());
                }
                if let Some(key) = find_null(&ordered) {
                    return Err(Error::InvalidInput(format!(
                        "TOML cannot represent null (key '{}')",
                        key
                    )));
                }
                toml::to_string_pretty(&ordered)
                    .map_err(|e| Error::InvalidInput(format!("TOML serialization failed: {}", e)))
            }
            ParamFormat::Yaml => serde_yaml::to_string(entries)
                .map_err(|e| Error::InvalidInput(format!("YAML serialization failed: {}", e))),
            ParamFormat::Json => serde_json::to_string_pretty(entries)
                .map_err(|e| Error::InvalidInput(format!("JSON serialization failed: {}", e))),
        }
    }
}

fn find_null(map: &Map<String, Value>) -> Option<String> {
    for (key, value) in map {
        match value {
            Value::Null => return Some(key.clone()),
            Value::Object(inner) => {
                if let Some(inner_key) = find_null(inner) {
                    return Some(format!("{}.{}", key, inner_key));
                }
            }
            Value::Array(items) if items.iter().any(Value::is_null) => return Some(key.clone()),
            _ => {}
        }
    }
    None
}
