//! Analysis functions and the per-recording handler
//!
//! An [`AnalysisFn`] is a named callable run against one recording. The
//! [`AnalysisHandler`] queues `(function, arguments)` bindings and runs them
//! in insertion order, storing each outcome under a collision-free key:
//! `name`, then `name_2`, `name_3`, ...
//!
//! With `handle_errors` set, a failing (or panicking) call is logged at
//! ERROR and its slot receives an [`ErrorResult`]; the remaining calls still
//! run. Without it the first failure is returned as [`Error::Analysis`].

use crate::figure::Figure;
use crate::recording::{unique_key, ErrorResult, Recording, ResultValue};
use crate::table::ResultTable;
use indexmap::IndexMap;
use serde_json::Value;
use simuran_common::{Error, ErrorKind, ParameterMap, Result};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A named analysis callable
pub trait AnalysisFn: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self, ctx: &mut AnalysisContext<'_>, args: &CallArgs) -> anyhow::Result<Value>;
}

impl fmt::Debug for dyn AnalysisFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnalysisFn({})", self.name())
    }
}

struct ClosureAnalysis<F> {
    name: String,
    f: F,
}

impl<F> AnalysisFn for ClosureAnalysis<F>
where
    F: Fn(&mut AnalysisContext<'_>, &CallArgs) -> anyhow::Result<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, ctx: &mut AnalysisContext<'_>, args: &CallArgs) -> anyhow::Result<Value> {
        (self.f)(ctx, args)
    }
}

/// Wrap a closure as a named analysis function
pub fn analysis_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn AnalysisFn>
where
    F: Fn(&mut AnalysisContext<'_>, &CallArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(ClosureAnalysis {
        name: name.into(),
        f,
    })
}

/// Positional and keyword arguments of one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: ParameterMap,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keyword: ParameterMap::new(),
        }
    }

    pub fn keyword(keyword: ParameterMap) -> Self {
        Self {
            positional: Vec::new(),
            keyword,
        }
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.keyword.insert(name, value);
        self
    }

    /// Argument by keyword, falling back to position
    pub fn arg(&self, position: usize, name: &str) -> Option<&Value> {
        self.keyword.get(name).or_else(|| self.positional.get(position))
    }

    pub fn require(&self, position: usize, name: &str) -> anyhow::Result<&Value> {
        self.arg(position, name)
            .ok_or_else(|| anyhow::anyhow!("missing argument '{}' (position {})", name, position))
    }

    /// Arguments for a single call
    ///
    /// A mapping gives keyword arguments, a sequence positional ones, a
    /// scalar one positional argument and null no arguments.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::new(),
            Value::Object(map) => Self::keyword(ParameterMap::from_map(map.clone())),
            Value::Array(items) => Self::positional(items.clone()),
            scalar => Self::positional(vec![scalar.clone()]),
        }
    }

    /// Expand a call spec into one or more calls
    ///
    /// Absent or null means one call without arguments. A non-empty sequence
    /// whose every element is a sequence or mapping means one call per
    /// element; anything else is a single call.
    pub fn calls_from_value(spec: Option<&Value>) -> Vec<CallArgs> {
        match spec {
            None | Some(Value::Null) => vec![CallArgs::new()],
            Some(Value::Array(items))
                if !items.is_empty()
                    && items
                        .iter()
                        .all(|item| matches!(item, Value::Array(_) | Value::Object(_))) =>
            {
                items.iter().map(CallArgs::from_value).collect()
            }
            Some(other) => vec![CallArgs::from_value(other)],
        }
    }
}

/// What an analysis function sees while it runs
pub struct AnalysisContext<'a> {
    recording: Option<&'a mut Recording>,
    index: Option<usize>,
    figures: Vec<Figure>,
}

impl<'a> AnalysisContext<'a> {
    /// Context for recording `index` of a container
    pub fn new(recording: &'a mut Recording, index: usize) -> Self {
        Self {
            recording: Some(recording),
            index: Some(index),
            figures: Vec::new(),
        }
    }

    /// Context without a recording, for container-level analyses
    pub fn detached() -> Self {
        Self {
            recording: None,
            index: None,
            figures: Vec::new(),
        }
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn recording(&self) -> Option<&Recording> {
        self.recording.as_deref()
    }

    pub fn recording_mut(&mut self) -> Option<&mut Recording> {
        self.recording.as_deref_mut()
    }

    /// The recording, or an error naming what the function needed it for
    pub fn require_recording(&self) -> anyhow::Result<&Recording> {
        self.recording()
            .ok_or_else(|| anyhow::anyhow!("analysis needs a recording but none was given"))
    }

    /// Queue a figure for the sink
    pub fn emit_figure(&mut self, figure: Figure) {
        self.figures.push(figure);
    }

    pub fn take_figures(&mut self) -> Vec<Figure> {
        std::mem::take(&mut self.figures)
    }
}

struct QueuedCall {
    function: Arc<dyn AnalysisFn>,
    args: CallArgs,
}

/// Queue of analysis bindings plus their ordered results
pub struct AnalysisHandler {
    queue: Vec<QueuedCall>,
    results: IndexMap<String, ResultValue>,
    pub handle_errors: bool,
    pub verbose: bool,
    pub show_progress: bool,
    error_count: usize,
}

impl Default for AnalysisHandler {
    fn default() -> Self {
        Self::new(false)
    }
}

impl AnalysisHandler {
    pub fn new(handle_errors: bool) -> Self {
        Self {
            queue: Vec::new(),
            results: IndexMap::new(),
            handle_errors,
            verbose: false,
            show_progress: false,
            error_count: 0,
        }
    }

    /// Queue one call of `function` per argument set
    pub fn add_analysis<I>(&mut self, function: Arc<dyn AnalysisFn>, arg_tuples: I)
    where
        I: IntoIterator<Item = CallArgs>,
    {
        for args in arg_tuples {
            self.queue.push(QueuedCall {
                function: function.clone(),
                args,
            });
        }
    }

    /// Queue a single call of `function` without arguments
    pub fn add_fn(&mut self, function: Arc<dyn AnalysisFn>) {
        self.add_analysis(function, [CallArgs::new()]);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn results(&self) -> &IndexMap<String, ResultValue> {
        &self.results
    }

    pub fn take_results(&mut self) -> IndexMap<String, ResultValue> {
        std::mem::take(&mut self.results)
    }

    /// Calls that failed under `handle_errors` since the last reset
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Run every queued call in insertion order
    pub fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> Result<()> {
        let total = self.queue.len();
        for (call_index, call) in self.queue.iter().enumerate() {
            let name = call.function.name();
            if self.show_progress {
                info!("[{}/{}] running {}", call_index + 1, total, name);
            }

            let outcome = if self.handle_errors {
                catch_unwind(AssertUnwindSafe(|| call.function.call(ctx, &call.args)))
                    .unwrap_or_else(|panic| {
                        Err(anyhow::anyhow!("panicked: {}", panic_message(panic.as_ref())))
                    })
            } else {
                call.function.call(ctx, &call.args)
            };

            // keys follow call order; a failed call keeps its slot as an ErrorResult
            let key = unique_key(&self.results, name);
            match outcome {
                Ok(value) => {
                    if self.verbose {
                        info!("{} -> {}", key, value);
                    } else {
                        debug!("{} -> {}", key, value);
                    }
                    self.results.insert(key, ResultValue::Ok(value));
                }
                Err(err) if self.handle_errors => {
                    error!(
                        function = name,
                        call = call_index,
                        recording = ?ctx.index(),
                        "Analysis {} failed: {:#}",
                        name,
                        err
                    );
                    self.error_count += 1;
                    let failure = ErrorResult::new(failure_kind(&err), format!("{:#}", err));
                    self.results.insert(key, ResultValue::Failed(failure));
                }
                Err(err) => {
                    return Err(Error::Analysis {
                        function: name.to_string(),
                        index: ctx.index(),
                        message: format!("{:#}", err),
                    });
                }
            }
        }
        Ok(())
    }

    /// Write the results as a table, one row per result key
    ///
    /// Mapping results contribute one column per field; other results go to
    /// a `value` column.
    pub fn save_results_to_table(&self, filename: impl AsRef<Path>) -> Result<()> {
        let mut columns: Vec<String> = Vec::new();
        for result in self.results.values() {
            match result.value() {
                Some(Value::Object(fields)) => {
                    for field in fields.keys() {
                        if !columns.contains(field) {
                            columns.push(field.clone());
                        }
                    }
                }
                _ => {
                    if !columns.iter().any(|c| c == "value") {
                        columns.push("value".to_string());
                    }
                }
            }
        }

        let rows = self
            .results
            .values()
            .map(|result| {
                columns
                    .iter()
                    .map(|column| match result {
                        ResultValue::Ok(Value::Object(fields)) => fields.get(column).cloned(),
                        other if column == "value" => Some(other.to_cell()),
                        _ => None,
                    })
                    .collect()
            })
            .collect();
        let table = ResultTable {
            columns,
            row_index: self.results.keys().cloned().map(Value::String).collect(),
            rows,
        };
        table.write_csv(filename, None)
    }

    /// Clear queue, results and the error count
    pub fn reset(&mut self) {
        self.queue.clear();
        self.results.clear();
        self.error_count = 0;
    }
}

/// Kind carried into the sentinel: a wrapped framework error keeps its own
fn failure_kind(err: &anyhow::Error) -> ErrorKind {
    err.downcast_ref::<Error>()
        .map(Error::kind)
        .unwrap_or(ErrorKind::Analysis)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
