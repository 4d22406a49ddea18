//! # simuran-batch
//!
//! Batch analysis core: recordings and their loaders, containers of
//! recordings, the analysis handler, the batch runner and the result sink.
//!
//! A typical run:
//!
//! 1. Build an [`IndexTable`] (from CSV or [`Loader::index_files`]).
//! 2. [`Container::from_table`] with a loader from the registry.
//! 3. [`BatchRunner::run_all`] with a list of [`AnalysisFn`]s.
//! 4. Read the summary written by the [`ResultSink`].

pub mod analysis;
pub mod batch;
pub mod container;
pub mod figure;
pub mod functions;
pub mod loader;
pub mod recording;
pub mod services;
pub mod sink;
pub mod table;

pub use analysis::{analysis_fn, AnalysisContext, AnalysisFn, AnalysisHandler, CallArgs};
pub use batch::{BatchReport, BatchRunner};
pub use container::{Container, InvalidSource, LoaderSet};
pub use figure::{Figure, FigureFormat};
pub use loader::{create_loader, register_loader, Loader, LoaderDescriptor};
pub use recording::{ErrorResult, Payload, Recording, ResultValue};
pub use sink::{ResultSink, SummaryOptions};
pub use table::{IndexTable, ResultTable, TableRow};

pub use simuran_common::{Error, ErrorKind, ParameterMap, Result, Value};
