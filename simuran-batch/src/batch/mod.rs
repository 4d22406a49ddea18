//! Batch execution over a container
//!
//! [`BatchRunner::run_all`] walks a container, acquires each recording,
//! runs the analysis function list against it and commits the results back
//! in container order. Figures marked done are written through the
//! [`ResultSink`] and the summary table is written once at the end.
//!
//! # Error policy
//!
//! - Recoverable acquisition failures (missing source, malformed content,
//!   I/O) mark the recording invalid and the batch moves on when
//!   `handle_errors` is set; otherwise they abort the batch.
//! - Configuration errors always abort.
//! - Analysis failures are isolated per call under `handle_errors` (see
//!   [`AnalysisHandler`]); otherwise they abort the batch.
//! - Figure write failures are logged and never abort.
//!
//! # Workers
//!
//! With `num_workers > 1` each worker thread receives a disjoint share of
//! owned, payload-free recording copies and reloads them through their
//! loaders. Outcomes are buffered by index and committed in ascending order,
//! so the result table is identical to a single-worker run.

use crate::analysis::{AnalysisContext, AnalysisFn, AnalysisHandler, CallArgs};
use crate::container::{Container, InvalidSource};
use crate::figure::Figure;
use crate::recording::{Recording, ResultValue};
use crate::sink::{summary_file_name, ResultSink, SummaryOptions};
use indexmap::IndexMap;
use simuran_common::{Error, ParameterMap, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

mod worker;

/// Per-recording argument hook: returns `function name -> call spec`
pub type ArgsFn<'a> = &'a dyn Fn(&Container, usize) -> ParameterMap;

/// What a batch run did
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Recordings whose analyses ran
    pub processed: usize,
    pub invalid_sources: Vec<InvalidSource>,
    /// Analysis calls that failed under `handle_errors`
    pub analysis_errors: usize,
    pub figures_written: Vec<PathBuf>,
    pub figure_failures: usize,
    pub summary_path: Option<PathBuf>,
    /// The stop flag ended the run before every recording was visited
    pub stopped_early: bool,
}

/// Outcome of analysing one recording
pub(crate) struct Analysed {
    pub results: IndexMap<String, ResultValue>,
    pub figures: Vec<Figure>,
    pub errors: usize,
}

/// Drives a container through a function list
#[derive(Debug, Clone)]
pub struct BatchRunner {
    /// Data tags to request; non-empty means every recording is loaded
    pub to_load: Vec<String>,
    pub num_workers: usize,
    pub handle_errors: bool,
    /// Where summary and figures go; `None` writes nothing
    pub output_dir: Option<PathBuf>,
    /// Summary file name; defaults to `<timestamp>--run.csv`
    pub summary_name: Option<String>,
    pub summary: SummaryOptions,
    /// Release payloads the runner loaded once their analyses finish
    pub unload_after: bool,
    stop_flag: Arc<AtomicBool>,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self {
            to_load: Vec::new(),
            num_workers: 1,
            handle_errors: false,
            output_dir: None,
            summary_name: None,
            summary: SummaryOptions::default(),
            unload_after: true,
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl BatchRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    pub fn with_handle_errors(mut self, handle_errors: bool) -> Self {
        self.handle_errors = handle_errors;
        self
    }

    pub fn with_to_load<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to_load = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    pub fn with_summary(mut self, name: impl Into<String>, options: SummaryOptions) -> Self {
        self.summary_name = Some(name.into());
        self.summary = options;
        self
    }

    /// Share a flag that stops the run between recordings
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = flag;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    fn sink(&self) -> Option<ResultSink> {
        self.output_dir.as_ref().map(ResultSink::new)
    }

    /// `config` overlaid with the per-recording arguments (per-recording wins)
    fn call_specs(
        &self,
        container: &Container,
        i: usize,
        args_fn: Option<ArgsFn<'_>>,
        config: &ParameterMap,
    ) -> ParameterMap {
        let mut specs = config.clone();
        if let Some(args_fn) = args_fn {
            specs.update(&args_fn(container, i));
        }
        specs
    }

    /// Run every function against every recording
    pub fn run_all(
        &self,
        container: &mut Container,
        functions: &[Arc<dyn AnalysisFn>],
        args_fn: Option<ArgsFn<'_>>,
        config: &ParameterMap,
    ) -> Result<BatchReport> {
        info!(
            "Running {} function(s) over {} recording(s) with {} worker(s)",
            functions.len(),
            container.len(),
            self.num_workers
        );
        let mut report = BatchReport::default();
        let sink = self.sink();

        if self.num_workers > 1 && container.len() > 1 {
            self.run_parallel(container, functions, args_fn, config, sink.as_ref(), &mut report)?;
        } else {
            self.run_sequential(container, functions, args_fn, config, sink.as_ref(), &mut report)?;
        }

        if let Some(sink) = &sink {
            let name = self
                .summary_name
                .clone()
                .unwrap_or_else(|| summary_file_name("run", &simuran_common::time::run_timestamp()));
            report.summary_path = Some(sink.write_summary(container, name, &self.summary)?);
        }

        report.invalid_sources = container.invalid_sources().to_vec();
        log_termination(&report);
        Ok(report)
    }

    fn run_sequential(
        &self,
        container: &mut Container,
        functions: &[Arc<dyn AnalysisFn>],
        args_fn: Option<ArgsFn<'_>>,
        config: &ParameterMap,
        sink: Option<&ResultSink>,
        report: &mut BatchReport,
    ) -> Result<()> {
        for i in 0..container.len() {
            if self.stop_requested() {
                info!("Stop requested; ending batch before recording {}", i);
                report.stopped_early = true;
                break;
            }
            if container.is_invalid(i) {
                debug!("Skipping invalid recording {}", i);
                continue;
            }

            let specs = self.call_specs(container, i, args_fn, config);
            // the on-the-fly cache releases its own copy
            let release = self.unload_after && !self.to_load.is_empty() && !container.load_on_fly();
            let outcome = match self.acquire(container, i) {
                Ok(recording) => {
                    let analysed = analyse(recording, i, functions, &specs, self.handle_errors);
                    if release {
                        recording.unload();
                    }
                    Ok(analysed?)
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(analysed) => self.commit(container, i, analysed, sink, report)?,
                Err(err) => self.record_acquisition_failure(container, i, err)?,
            }
        }
        Ok(())
    }

    fn run_parallel(
        &self,
        container: &mut Container,
        functions: &[Arc<dyn AnalysisFn>],
        args_fn: Option<ArgsFn<'_>>,
        config: &ParameterMap,
        sink: Option<&ResultSink>,
        report: &mut BatchReport,
    ) -> Result<()> {
        let run_loads = self.loads_recordings(container);
        let to_load: BTreeSet<String> = self.to_load.iter().cloned().collect();
        let jobs: Vec<worker::Job> = (0..container.len())
            .filter(|&i| !container.is_invalid(i))
            .map(|i| {
                let mut recording = container[i].metadata_copy();
                if !to_load.is_empty() {
                    recording.available_data = to_load.clone();
                }
                worker::Job {
                    index: i,
                    // a pre-loaded source is reloaded on the worker
                    load: run_loads || container[i].is_loaded(),
                    recording,
                    specs: self.call_specs(container, i, args_fn, config),
                }
            })
            .collect();

        let settings = worker::WorkerSettings {
            num_workers: self.num_workers,
            handle_errors: self.handle_errors,
            stop_flag: self.stop_flag.clone(),
        };
        let outcomes = worker::run_jobs(jobs, functions, &settings)?;
        let expected = (0..container.len()).filter(|&i| !container.is_invalid(i)).count();
        if outcomes.len() < expected {
            report.stopped_early = true;
        }

        for (i, outcome) in outcomes {
            match outcome {
                worker::JobOutcome::Done(analysed) => {
                    self.commit(container, i, analysed, sink, report)?
                }
                worker::JobOutcome::LoadFailed(err) => {
                    self.record_acquisition_failure(container, i, err)?
                }
                worker::JobOutcome::Aborted(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Whether this run materializes payloads
    fn loads_recordings(&self, container: &Container) -> bool {
        !self.to_load.is_empty() || container.load_on_fly()
    }

    fn acquire<'c>(&self, container: &'c mut Container, i: usize) -> Result<&'c mut Recording> {
        if self.to_load.is_empty() {
            return container.get(i);
        }
        if let Some(recording) = container.recording_mut(i) {
            recording.available_data = self.to_load.iter().cloned().collect();
        }
        let recording = container.get(i)?;
        recording.load()?;
        Ok(recording)
    }

    fn record_acquisition_failure(&self, container: &mut Container, i: usize, err: Error) -> Result<()> {
        if !(self.handle_errors && err.is_recoverable()) {
            return Err(err);
        }
        error!(
            recording = i,
            "Could not load recording {} ({}): {}",
            i,
            container.row_label(i),
            err
        );
        container.mark_invalid(i, &err);
        Ok(())
    }

    fn commit(
        &self,
        container: &mut Container,
        i: usize,
        analysed: Analysed,
        sink: Option<&ResultSink>,
        report: &mut BatchReport,
    ) -> Result<()> {
        container.commit_results(i, analysed.results)?;
        report.processed += 1;
        report.analysis_errors += analysed.errors;
        flush_figures(analysed.figures, sink, report);
        Ok(())
    }
}

/// Queue every function with its call specs and run them on one recording
pub(crate) fn analyse(
    recording: &mut Recording,
    i: usize,
    functions: &[Arc<dyn AnalysisFn>],
    specs: &ParameterMap,
    handle_errors: bool,
) -> Result<Analysed> {
    let mut handler = AnalysisHandler::new(handle_errors);
    for function in functions {
        handler.add_analysis(
            function.clone(),
            CallArgs::calls_from_value(specs.get(function.name())),
        );
    }
    let mut ctx = AnalysisContext::new(recording, i);
    handler.run(&mut ctx)?;
    Ok(Analysed {
        results: handler.take_results(),
        figures: ctx.take_figures(),
        errors: handler.error_count(),
    })
}

/// Write figures marked done and close the rest
fn flush_figures(figures: Vec<Figure>, sink: Option<&ResultSink>, report: &mut BatchReport) {
    for mut figure in figures {
        match sink {
            Some(sink) if figure.is_done() => match sink.write_figure(&mut figure) {
                Ok(paths) => report.figures_written.extend(paths),
                Err(err) => {
                    warn!("Could not write figure {}: {}", figure.filename(), err);
                    report.figure_failures += 1;
                }
            },
            _ => {
                debug!("Discarding figure {}", figure.filename());
                figure.close();
            }
        }
    }
}

fn log_termination(report: &BatchReport) {
    if report.invalid_sources.is_empty() && report.analysis_errors == 0 {
        info!(
            "Batch finished: {} recording(s) processed",
            report.processed
        );
        return;
    }
    let invalid: Vec<String> = report
        .invalid_sources
        .iter()
        .map(|invalid| format!("row {}: {} ({})", invalid.index, invalid.handle, invalid.kind))
        .collect();
    warn!(
        "Batch finished with {} invalid source(s) [{}] and {} analysis error(s)",
        invalid.len(),
        invalid.join("; "),
        report.analysis_errors
    );
}
