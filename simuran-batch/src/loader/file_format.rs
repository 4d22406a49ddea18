//! File-format loader
//!
//! Resolves a session file from metadata, reads it into a payload and keeps
//! the file open until the recording is unloaded.
//!
//! Supported formats:
//! - `json`: top-level object, each key becomes a payload section
//! - `csv`: numeric columns, each becomes a named signal
//!
//! Options (all optional):
//! - `format`: `json` or `csv` (required for the generic `file_format` name)
//! - `source_keys`: attribute keys tried in order for the source path
//! - `sample_rate`: sample rate for CSV signals (an attribute of the same
//!   name overrides it per recording)
//! - `max_depth`: directory depth limit for `index_files`
//! - `ignore`: extra name patterns `index_files` skips

use super::{Loader, LoaderDescriptor};
use crate::recording::{OpenFile, Payload, Recording, Signal};
use crate::services::FileScanner;
use crate::table::{csv_error, IndexTable, TableRow};
use serde_json::{json, Value};
use simuran_common::time::parse_session_datetime;
use simuran_common::{Error, ParameterMap, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Attribute keys tried for the source path when `source_keys` is not set
pub const DEFAULT_SOURCE_KEYS: [&str; 3] = ["source_file", "file_path", "path"];

/// On-disk session format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Csv,
}

impl DataFormat {
    pub fn name(self) -> &'static str {
        match self {
            DataFormat::Json => "json",
            DataFormat::Csv => "csv",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "json" => Ok(DataFormat::Json),
            "csv" => Ok(DataFormat::Csv),
            other => Err(Error::Configuration(format!(
                "unsupported data format '{}' (expected json or csv)",
                other
            ))),
        }
    }

    /// Data tag advertised for recordings of this format
    fn data_tag(self) -> &'static str {
        match self {
            DataFormat::Json => "sections",
            DataFormat::Csv => "signals",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileFormatLoader {
    format: DataFormat,
    options: ParameterMap,
    source_keys: Vec<String>,
}

impl FileFormatLoader {
    pub const NAME: &'static str = "file_format";

    pub fn new(format: DataFormat) -> Self {
        Self::with_options(format, &ParameterMap::new())
    }

    pub fn with_options(format: DataFormat, options: &ParameterMap) -> Self {
        let source_keys = options
            .get_string_list("source_keys")
            .filter(|keys| !keys.is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE_KEYS.iter().map(|k| k.to_string()).collect());
        let mut options = options.clone();
        options.pop("format");
        Self {
            format,
            options,
            source_keys,
        }
    }

    /// Build from options carrying a `format` key
    pub fn from_options(options: &ParameterMap) -> Result<Self> {
        let format = options
            .require("format")?
            .as_str()
            .ok_or_else(|| Error::Configuration("loader option 'format' must be a string".into()))?;
        Ok(Self::with_options(DataFormat::parse(format)?, options))
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }

    /// Source path from the first matching attribute key, else `directory` + `filename`
    fn resolve_source(&self, attrs: &ParameterMap) -> Option<String> {
        for key in &self.source_keys {
            if let Some(source) = attrs.get_str(key).filter(|s| !s.trim().is_empty()) {
                return Some(source.to_string());
            }
        }
        match (attrs.get_str("directory"), attrs.get_str("filename")) {
            (Some(dir), Some(name)) if !name.trim().is_empty() => {
                Some(Path::new(dir).join(name).to_string_lossy().into_owned())
            }
            _ => None,
        }
    }

    fn scanner(&self) -> FileScanner {
        let mut scanner = FileScanner::new([self.format.name()]);
        if let Some(depth) = self.options.get_i64("max_depth").filter(|d| *d >= 0) {
            scanner = scanner.with_max_depth(depth as usize);
        }
        for pattern in self.options.get_string_list("ignore").unwrap_or_default() {
            scanner = scanner.with_ignore_pattern(pattern);
        }
        scanner
    }

    fn sample_rate(&self, recording: &Recording) -> Option<f64> {
        recording
            .attrs
            .get_f64("sample_rate")
            .or_else(|| self.options.get_f64("sample_rate"))
    }

    fn read_json(&self, source: &str, content: &str) -> Result<Payload> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| Error::format(source, e))?;
        match value {
            Value::Object(sections) => {
                let mut payload = Payload::new();
                payload.sections = sections;
                Ok(payload)
            }
            _ => Err(Error::format(source, "top level must be an object")),
        }
    }

    fn read_csv(&self, source: &str, content: &str, sample_rate: Option<f64>) -> Result<Payload> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| csv_error(source, e))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() {
            return Err(Error::format(source, "no columns"));
        }

        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| csv_error(source, e))?;
            for (col, cell) in record.iter().enumerate() {
                let sample = cell.parse::<f64>().map_err(|_| {
                    Error::format(
                        source,
                        format!("row {} column '{}': '{}' is not numeric", row + 1, headers[col], cell),
                    )
                })?;
                columns[col].push(sample);
            }
        }

        let mut payload = Payload::new();
        for (name, samples) in headers.into_iter().zip(columns) {
            payload.signals.insert(name, Signal::new(samples, sample_rate));
        }
        payload.sections.insert(
            "sample_rate".to_string(),
            sample_rate.map(Value::from).unwrap_or(Value::Null),
        );
        Ok(payload)
    }
}

impl Loader for FileFormatLoader {
    fn name(&self) -> &str {
        self.format.name()
    }

    fn descriptor(&self) -> LoaderDescriptor {
        LoaderDescriptor::new(self.format.name()).with_options(self.options.clone())
    }

    fn parse_metadata(&self, recording: &mut Recording) -> Result<()> {
        if let Some(source) = self.resolve_source(&recording.attrs) {
            recording.source_file = Some(source);
        } else if recording.source_file.is_none() {
            return Err(Error::Configuration(format!(
                "cannot resolve a source file from attributes (tried {}, directory + filename)",
                self.source_keys.join(", ")
            )));
        }

        let stamp = recording
            .attrs
            .get_str("datetime")
            .or_else(|| recording.attrs.get_str("date"));
        if let Some(parsed) = stamp.and_then(parse_session_datetime) {
            recording.datetime = Some(parsed);
        }
        if let Some(tag) = recording.attrs.get_str("tag") {
            recording.tag = Some(tag.to_string());
        }
        if recording.available_data.is_empty() {
            recording.available_data.insert(self.format.data_tag().to_string());
        }
        Ok(())
    }

    fn load_recording(&self, recording: &Recording) -> Result<Payload> {
        let source = recording.source_file.as_deref().ok_or_else(|| {
            Error::Configuration("recording has no source file; parse metadata first".into())
        })?;
        let path = PathBuf::from(source);
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::SourceUnavailable(source.to_string()),
            _ => Error::Io(e),
        })?;
        let mut content = String::new();
        file.read_to_string(&mut content).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => Error::format(source, "not valid UTF-8 text"),
            _ => Error::Io(e),
        })?;

        let payload = match self.format {
            DataFormat::Json => self.read_json(source, &content)?,
            DataFormat::Csv => self.read_csv(source, &content, self.sample_rate(recording))?,
        };
        tracing::debug!(
            "Read {} ({} sections, {} signals)",
            source,
            payload.sections.len(),
            payload.signals.len()
        );
        Ok(payload.with_handle(Box::new(OpenFile::new(path, file))))
    }

    fn index_files(&self, root: &Path) -> Result<IndexTable> {
        let files = self.scanner().scan(root)?;
        let rows = files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let directory = file.parent().unwrap_or(root).to_string_lossy().into_owned();
                let filename = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                TableRow::new(i)
                    .with("directory", json!(directory))
                    .with("filename", json!(filename))
            })
            .collect();
        let table = IndexTable::from_rows(rows);
        tracing::info!("Indexed {} {} files under {}", table.len(), self.format.name(), root.display());
        Ok(table)
    }
}
