//! # SIMURAN Common Library
//!
//! Shared code for the SIMURAN analysis harness:
//! - Error taxonomy (`Error`, `ErrorKind`)
//! - `ParameterMap` and its TOML / YAML / JSON file formats
//! - Configuration path resolution (log and output directories)
//! - Logging initialisation
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod params;
pub mod time;

pub use error::{Error, ErrorKind, Result};
pub use params::{ParamFormat, ParameterMap, DIRNAME_PLACEHOLDER};

/// Dynamic value type used for metadata, arguments and results
pub use serde_json::Value;
