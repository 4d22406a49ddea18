//! Tabular index and result tables
//!
//! An [`IndexTable`] lists recording sessions, one row per session, each row
//! carrying a stable identity (`RowIndex`) and loader-specific columns.
//! A [`ResultTable`] is the flattened view of per-recording results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use simuran_common::{Error, ParameterMap, Result};
use std::fmt;
use std::path::Path;

/// Stable identity of an index row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowIndex {
    Int(i64),
    Str(String),
}

impl RowIndex {
    pub fn to_value(&self) -> Value {
        match self {
            RowIndex::Int(i) => Value::from(*i),
            RowIndex::Str(s) => Value::from(s.clone()),
        }
    }

    fn parse(text: &str) -> Self {
        match text.trim().parse::<i64>() {
            Ok(i) => RowIndex::Int(i),
            Err(_) => RowIndex::Str(text.trim().to_string()),
        }
    }
}

impl fmt::Display for RowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIndex::Int(i) => write!(f, "{}", i),
            RowIndex::Str(s) => f.write_str(s),
        }
    }
}

impl From<usize> for RowIndex {
    fn from(i: usize) -> Self {
        RowIndex::Int(i as i64)
    }
}

impl From<&str> for RowIndex {
    fn from(s: &str) -> Self {
        RowIndex::Str(s.to_string())
    }
}

/// One session row of an index table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub index: RowIndex,
    pub fields: Map<String, Value>,
}

impl TableRow {
    pub fn new(index: impl Into<RowIndex>) -> Self {
        Self {
            index: index.into(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.fields.insert(column.into(), value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

/// Tabular index of recording sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexTable {
    columns: Vec<String>,
    rows: Vec<TableRow>,
}

impl IndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from rows; columns are collected in first-seen order
    pub fn from_rows(rows: Vec<TableRow>) -> Self {
        let mut table = Self::new();
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Append a row, registering any new columns
    pub fn push_row(&mut self, row: TableRow) {
        for column in row.fields.keys() {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.clone());
            }
        }
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> Option<&TableRow> {
        self.rows.get(i)
    }

    /// Keep the rows at `indices` (ascending), preserving order
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Keep rows for which `predicate` holds, preserving order
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&TableRow) -> bool,
    {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    /// Keep rows matching every `column -> allowed value(s)` entry of `criteria`
    ///
    /// A list value means "any of these"; comparison is on rendered text so
    /// `1` in a YAML filter matches `"1"` parsed from a CSV cell.
    pub fn select(&self, criteria: &ParameterMap) -> Self {
        self.filter(|row| {
            criteria.iter().all(|(column, allowed)| {
                let cell = row.fields.get(column).map(cell_text).unwrap_or_default();
                match allowed {
                    Value::Array(options) => options.iter().any(|o| cell_text(o) == cell),
                    other => cell_text(other) == cell,
                }
            })
        })
    }

    /// Parse a filter expression `col=value[|alt][,col2=value]` into criteria
    pub fn parse_filter_expr(expr: &str) -> Result<ParameterMap> {
        let mut criteria = ParameterMap::new();
        for clause in expr.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let (column, values) = clause.split_once('=').ok_or_else(|| {
                Error::Configuration(format!(
                    "filter clause '{}' is not of the form column=value",
                    clause
                ))
            })?;
            let options: Vec<Value> = values.split('|').map(parse_cell).collect();
            let value = if options.len() == 1 {
                options.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(options)
            };
            criteria.insert(column.trim(), value);
        }
        Ok(criteria)
    }

    /// Read a CSV index table
    ///
    /// A first column named `index` (or with an empty header) supplies row
    /// identities; otherwise rows are numbered from zero.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source_name = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .flexible(false)
            .from_path(path)
            .map_err(|e| csv_error(&source_name, e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| csv_error(&source_name, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let has_index = headers
            .first()
            .map(|h| h.is_empty() || h == "index")
            .unwrap_or(false);
        let data_columns = if has_index { &headers[1..] } else { &headers[..] };

        let mut table = Self::with_columns(data_columns.iter().cloned());
        for (position, record) in reader.records().enumerate() {
            let record = record.map_err(|e| csv_error(&source_name, e))?;
            let mut cells = record.iter();
            let index = if has_index {
                RowIndex::parse(cells.next().unwrap_or_default())
            } else {
                RowIndex::from(position)
            };
            let mut row = TableRow::new(index);
            for (column, cell) in data_columns.iter().zip(cells) {
                row.fields.insert(column.clone(), parse_cell(cell));
            }
            table.rows.push(row);
        }

        tracing::debug!("Read index table {} ({} rows)", path.display(), table.len());
        Ok(table)
    }

    /// Write the table as CSV/TSV with a leading `index` column
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut header = vec!["index".to_string()];
        header.extend(self.columns.iter().cloned());
        let rows = self.rows.iter().map(|row| {
            let mut cells = vec![row.index.to_string()];
            cells.extend(self.columns.iter().map(|c| {
                row.fields
                    .get(c)
                    .map(|v| render_value(v, None))
                    .unwrap_or_default()
            }));
            cells
        });
        write_delimited(path.as_ref(), &header, rows)
    }
}

/// Flattened per-recording results: one row per recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub row_index: Vec<Value>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl ResultTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell for `row` / `column`, if present
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col)?.as_ref()
    }

    pub fn write_csv(&self, path: impl AsRef<Path>, decimals: Option<usize>) -> Result<()> {
        let mut header = vec!["index".to_string()];
        header.extend(self.columns.iter().cloned());
        let rows = self.rows.iter().zip(&self.row_index).map(|(row, index)| {
            let mut cells = vec![render_value(index, None)];
            cells.extend(
                row.iter()
                    .map(|c| c.as_ref().map(|v| render_value(v, decimals)).unwrap_or_default()),
            );
            cells
        });
        write_delimited(path.as_ref(), &header, rows)
    }
}

/// Parse a CSV cell: empty → null, then integer, float, bool, string
pub fn parse_cell(text: &str) -> Value {
    let text = text.trim();
    if text.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match text {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

/// Render a value as a table cell
///
/// Floats are rounded to `decimals` places when given; strings are written
/// verbatim; null is empty; sequences and mappings become compact JSON.
pub fn render_value(value: &Value, decimals: Option<usize>) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.is_f64(), decimals, n.as_f64()) {
            (true, Some(places), Some(f)) => format!("{:.*}", places.min(15), f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn cell_text(value: &Value) -> String {
    render_value(value, None)
}

/// Delimiter chosen by extension: `.tsv`/`.txt` use tabs, everything else commas
pub(crate) fn delimiter_for(path: &Path) -> u8 {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("tsv") | Some("txt") => b'\t',
        _ => b',',
    }
}

/// Write a header plus rows to a delimited text file, creating parent directories
pub(crate) fn write_delimited<I>(path: &Path, header: &[String], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let source_name = path.display().to_string();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)
        .map_err(|e| csv_error(&source_name, e))?;
    writer
        .write_record(header)
        .map_err(|e| csv_error(&source_name, e))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| csv_error(&source_name, e))?;
    }
    writer.flush()?;
    Ok(())
}

pub(crate) fn csv_error(source_name: &str, err: csv::Error) -> Error {
    if err.is_io_error() {
        match err.into_kind() {
            csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Error::SourceUnavailable(source_name.to_string())
            }
            csv::ErrorKind::Io(io) => Error::Io(io),
            other => Error::format(source_name, format!("{:?}", other)),
        }
    } else {
        Error::format(source_name, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_cell_types() {
        assert_eq!(parse_cell(""), Value::Null);
        assert_eq!(parse_cell("12"), json!(12));
        assert_eq!(parse_cell("1.5"), json!(1.5));
        assert_eq!(parse_cell("True"), json!(true));
        assert_eq!(parse_cell("CA1"), json!("CA1"));
        assert_eq!(parse_cell("nan"), json!("nan"));
    }

    #[test]
    fn test_render_value_rounding() {
        assert_eq!(render_value(&json!(1.23456), Some(2)), "1.23");
        assert_eq!(render_value(&json!(2.0), Some(2)), "2.00");
        assert_eq!(render_value(&json!(1.23456), None), "1.23456");
        assert_eq!(render_value(&json!(7), Some(2)), "7");
        assert_eq!(render_value(&json!("hi1.0"), Some(2)), "hi1.0");
        assert_eq!(render_value(&Value::Null, Some(2)), "");
        assert_eq!(render_value(&json!([1, 2]), None), "[1,2]");
    }

    #[test]
    fn test_read_csv_with_index_column() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.csv");
        std::fs::write(
            &path,
            ",directory,filename,rat\n3,/data/r1,s1.json,r1\n7,/data/r2,s2.json,r2\n",
        )
        .unwrap();

        let table = IndexTable::read_csv(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns(), ["directory", "filename", "rat"]);
        assert_eq!(table.row(0).unwrap().index, RowIndex::Int(3));
        assert_eq!(table.row(1).unwrap().get("rat"), Some(&json!("r2")));
    }

    #[test]
    fn test_read_csv_without_index_column_numbers_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.csv");
        std::fs::write(&path, "session,depth\na,1.5\nb,2\n").unwrap();

        let table = IndexTable::read_csv(&path).unwrap();
        assert_eq!(table.row(0).unwrap().index, RowIndex::Int(0));
        assert_eq!(table.row(1).unwrap().index, RowIndex::Int(1));
        assert_eq!(table.row(0).unwrap().get("depth"), Some(&json!(1.5)));
    }

    #[test]
    fn test_missing_csv_is_source_unavailable() {
        let err = IndexTable::read_csv("/nonexistent/simuran/index.csv").unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[test]
    fn test_write_then_read_preserves_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        let table = IndexTable::from_rows(vec![
            TableRow::new("s1").with("rat", json!("r1")).with("day", json!(1)),
            TableRow::new("s2").with("rat", json!("r2")).with("day", json!(2)),
        ]);
        table.write_csv(&path).unwrap();

        let loaded = IndexTable::read_csv(&path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_select_with_lists_and_scalars() {
        let table = IndexTable::from_rows(vec![
            TableRow::new(0usize).with("rat", json!("r1")).with("day", json!(1)),
            TableRow::new(1usize).with("rat", json!("r2")).with("day", json!(1)),
            TableRow::new(2usize).with("rat", json!("r3")).with("day", json!(2)),
        ]);

        let criteria = IndexTable::parse_filter_expr("rat=r1|r3").unwrap();
        let selected = table.select(&criteria);
        let ids: Vec<String> = selected.rows().iter().map(|r| r.index.to_string()).collect();
        assert_eq!(ids, ["0", "2"]);

        let criteria = IndexTable::parse_filter_expr("rat=r1|r2, day=1").unwrap();
        assert_eq!(table.select(&criteria).len(), 2);
    }

    #[test]
    fn test_bad_filter_expr_is_configuration_error() {
        let err = IndexTable::parse_filter_expr("rat").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_tsv_delimiter() {
        assert_eq!(delimiter_for(Path::new("a.tsv")), b'\t');
        assert_eq!(delimiter_for(Path::new("a.csv")), b',');
        assert_eq!(delimiter_for(Path::new("a")), b',');
    }
}
