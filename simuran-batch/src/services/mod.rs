//! Filesystem services used by loaders

pub mod file_scanner;

pub use file_scanner::{FileScanner, ScanError};
