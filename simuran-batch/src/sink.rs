//! Result persistence
//!
//! Layout under the run's output directory:
//!
//! ```text
//! <output_dir>/
//!   <timestamp>--<config stem>.csv   summary, one row per recording
//!   plots/<figure filename>.<ext>    emitted figures
//! ```

use crate::container::Container;
use crate::figure::Figure;
use crate::recording::{Recording, ResultValue};
use crate::table::{render_value, write_delimited};
use serde_json::Value;
use simuran_common::{Error, ParameterMap, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Sub-directory of the output directory holding figures
pub const PLOTS_DIRNAME: &str = "plots";

/// Name of the summary file for a run
pub fn summary_file_name(config_stem: &str, timestamp: &str) -> String {
    format!("{}--{}.csv", timestamp, config_stem)
}

/// How recordings are projected onto summary rows
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    /// Result keys (dotted paths allowed); empty means every result key
    pub columns: Vec<String>,
    /// Header names aligned with `columns`; missing entries keep the column name
    pub friendly_names: Vec<String>,
    /// Round float cells to this many places
    pub decimals: Option<usize>,
    /// Text written for missing or null cells
    pub missing: String,
    /// Leading `index` and `source_file` columns
    pub include_identity: bool,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            friendly_names: Vec::new(),
            decimals: None,
            missing: String::new(),
            include_identity: true,
        }
    }
}

impl SummaryOptions {
    /// Read the `summary` section of a run config
    ///
    /// `friendly_names` may be a list aligned with `columns` or a mapping
    /// from column to header.
    pub fn from_params(summary: &ParameterMap) -> Result<Self> {
        let columns = summary.get_string_list("columns").unwrap_or_default();
        let friendly_names = match summary.get("friendly_names") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(names)) => columns
                .iter()
                .map(|c| {
                    names
                        .get(c)
                        .and_then(Value::as_str)
                        .unwrap_or(c)
                        .to_string()
                })
                .collect(),
            Some(_) => summary.get_string_list("friendly_names").unwrap_or_default(),
        };
        let decimals = match summary.get("decimals") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_u64().ok_or_else(|| {
                Error::Configuration(format!(
                    "summary.decimals must be a non-negative integer, got {}",
                    value
                ))
            })? as usize),
        };
        Ok(Self {
            columns,
            friendly_names,
            decimals,
            missing: summary.get_str("missing").unwrap_or_default().to_string(),
            include_identity: summary.get_bool("include_identity").unwrap_or(true),
        })
    }

    fn header_for(&self, position: usize, column: &str) -> String {
        self.friendly_names
            .get(position)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| column.to_string())
    }
}

/// Writes summaries and figures under one output directory
#[derive(Debug, Clone)]
pub struct ResultSink {
    output_dir: PathBuf,
}

impl ResultSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.output_dir.join(PLOTS_DIRNAME)
    }

    /// Write one summary row per recording, in container order
    ///
    /// A relative `output_path` is placed under the output directory. The
    /// delimiter follows the extension (`.tsv`/`.txt` tab, otherwise comma).
    pub fn write_summary(
        &self,
        container: &Container,
        output_path: impl AsRef<Path>,
        options: &SummaryOptions,
    ) -> Result<PathBuf> {
        let path = self.resolve(output_path.as_ref());
        let columns = if options.columns.is_empty() {
            container.save_results_to_table().columns
        } else {
            options.columns.clone()
        };

        let mut header = Vec::new();
        if options.include_identity {
            header.push("index".to_string());
            header.push("source_file".to_string());
        }
        header.extend(
            columns
                .iter()
                .enumerate()
                .map(|(position, column)| options.header_for(position, column)),
        );

        let rows = container.iter().enumerate().map(|(i, recording)| {
            let mut cells = Vec::with_capacity(header.len());
            if options.include_identity {
                cells.push(container.row_label(i));
                cells.push(recording.source_file.clone().unwrap_or_default());
            }
            cells.extend(
                columns
                    .iter()
                    .map(|column| summary_cell(recording, column, options)),
            );
            cells
        });
        write_delimited(&path, &header, rows)?;

        info!(
            "Wrote summary of {} recordings to {}",
            container.len(),
            path.display()
        );
        Ok(path)
    }

    /// Write every render of `figure` under `plots/`, then close it
    pub fn write_figure(&self, figure: &mut Figure) -> Result<Vec<PathBuf>> {
        let outcome = self.write_renders(figure);
        figure.close();
        outcome
    }

    fn write_renders(&self, figure: &Figure) -> Result<Vec<PathBuf>> {
        if figure.is_closed() {
            return Err(Error::InvalidInput(format!(
                "figure {} is already closed",
                figure.filename()
            )));
        }
        let stem = figure_stem(figure.filename())?;
        let mut written = Vec::new();
        for (format, bytes) in figure.renders() {
            let path = self
                .plots_dir()
                .join(format!("{}.{}", stem.display(), format.extension()));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, bytes)?;
            debug!("Wrote figure {}", path.display());
            written.push(path);
        }
        Ok(written)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }
}

/// Figure names are relative paths that stay under `plots/`
fn figure_stem(filename: &str) -> Result<&Path> {
    let stem = Path::new(filename);
    let contained = stem
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if filename.is_empty() || !contained {
        return Err(Error::InvalidInput(format!(
            "figure name {:?} must be a relative path below the plots directory",
            filename
        )));
    }
    Ok(stem)
}

/// Text for one summary cell
///
/// Exact result keys win over dotted paths; a column that names no result
/// falls back to the recording's attributes.
fn summary_cell(recording: &Recording, column: &str, options: &SummaryOptions) -> String {
    let value = match recording.results.get(column) {
        Some(result) => Some(result.to_cell()),
        None => dotted_result(recording, column)
            .or_else(|| recording.attrs.get(column).cloned()),
    };
    match value {
        None | Some(Value::Null) => options.missing.clone(),
        Some(value) => render_value(&value, options.decimals),
    }
}

fn dotted_result(recording: &Recording, column: &str) -> Option<Value> {
    let mut parts = column.split('.');
    let result = recording.results.get(parts.next()?)?;
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return Some(result.to_cell());
    }
    match result {
        ResultValue::Ok(_) => result.lookup(&rest).cloned(),
        ResultValue::Failed(_) => Some(result.to_cell()),
    }
}
