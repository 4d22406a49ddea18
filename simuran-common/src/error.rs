//! Common error types for SIMURAN

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Common result type for SIMURAN operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by loaders, containers and the batch runner
#[derive(Error, Debug)]
pub enum Error {
    /// Missing required key, or a loader cannot resolve a source from metadata
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The source handle resolves to nothing (missing file, dead URL)
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source exists but its contents are malformed
    #[error("Format error in {source_name}: {message}")]
    Format {
        source_name: String,
        message: String,
    },

    /// Transient underlying failure (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An analysis function failed
    #[error("Analysis error in {function}{}: {message}", .index.map(|i| format!(" (recording {})", i)).unwrap_or_default())]
    Analysis {
        function: String,
        index: Option<usize>,
        message: String,
    },

    /// Invalid argument from calling code (e.g. index out of range)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Build a format error for a named source
    pub fn format(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Format {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            Error::Format { .. } => ErrorKind::Format,
            Error::Io(_) => ErrorKind::Io,
            Error::Analysis { .. } => ErrorKind::Analysis,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Whether a batch may record this failure against one recording and continue
    ///
    /// Configuration and input errors are programmer errors and always abort.
    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

/// Copyable error category, stored in result sentinels and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    SourceUnavailable,
    Format,
    Io,
    Analysis,
    InvalidInput,
}

impl ErrorKind {
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            ErrorKind::SourceUnavailable | ErrorKind::Format | ErrorKind::Io
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::SourceUnavailable => "SourceUnavailableError",
            ErrorKind::Format => "FormatError",
            ErrorKind::Io => "IOError",
            ErrorKind::Analysis => "AnalysisError",
            ErrorKind::InvalidInput => "InvalidInput",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(Error::SourceUnavailable("x".into()).is_recoverable());
        assert!(Error::format("x", "bad").is_recoverable());
        assert!(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")).is_recoverable());
        assert!(!Error::Configuration("missing key".into()).is_recoverable());
        assert!(!Error::InvalidInput("index".into()).is_recoverable());
    }

    #[test]
    fn test_analysis_error_display_includes_index() {
        let err = Error::Analysis {
            function: "rate_map".to_string(),
            index: Some(3),
            message: "empty spikes".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Analysis error in rate_map (recording 3): empty spikes"
        );

        let err = Error::Analysis {
            function: "rate_map".to_string(),
            index: None,
            message: "empty spikes".to_string(),
        };
        assert_eq!(err.to_string(), "Analysis error in rate_map: empty spikes");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
