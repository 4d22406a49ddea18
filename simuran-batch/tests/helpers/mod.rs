//! Test Helper Utilities
//!
//! Shared fixtures for the simuran-batch integration tests

#![allow(dead_code)]

pub mod log_capture;

pub use log_capture::{init_test_logging, LogCapture};

use serde_json::json;
use simuran_batch::loader::MetadataLoader;
use simuran_batch::recording::SourceResource;
use simuran_batch::{
    analysis_fn, AnalysisFn, Container, IndexTable, Loader, ParameterMap, Payload, Recording,
    TableRow,
};
use simuran_common::Result;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Arguments of the `add` calls, one tuple per recording
pub const ADD_ARGS: [(f64, &str); 3] = [(1.0, "hi"), (2.0, "bye"), (3.0, "hey")];

/// Index table of `n` metadata-only rows
pub fn metadata_table(n: usize) -> IndexTable {
    IndexTable::from_rows(
        (0..n)
            .map(|i| TableRow::new(i).with("rat", json!(format!("r{}", i))))
            .collect(),
    )
}

pub fn metadata_container(n: usize) -> Container {
    let loader: Arc<dyn Loader> = Arc::new(MetadataLoader::new());
    Container::from_table(metadata_table(n), loader).expect("metadata container")
}

fn add_value(args: &simuran_batch::CallArgs) -> anyhow::Result<serde_json::Value> {
    let a = args
        .require(0, "a")?
        .as_f64()
        .ok_or_else(|| anyhow::anyhow!("a must be a number"))?;
    let b = args
        .require(1, "b")?
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("b must be a string"))?;
    Ok(json!(format!("{}{:?}", b, a)))
}

/// `add(a, b)`: the string `b` followed by the float `a`
pub fn add_function() -> Arc<dyn AnalysisFn> {
    analysis_fn("add", |_ctx, args| add_value(args))
}

/// `add` that sleeps longer for earlier recordings
pub fn slow_add_function() -> Arc<dyn AnalysisFn> {
    analysis_fn("add", |ctx, args| {
        let i = ctx.index().unwrap_or_default();
        std::thread::sleep(Duration::from_millis(30 * (3 - (i % 3) as u64)));
        add_value(args)
    })
}

/// Per-recording `{"add": [a, b]}` built from [`ADD_ARGS`]
pub fn add_args(_container: &Container, i: usize) -> ParameterMap {
    let (a, b) = ADD_ARGS[i % ADD_ARGS.len()];
    let mut args = ParameterMap::new();
    args.insert("add", json!([a, b]));
    args
}

/// Loader that counts how many payloads it opened and closed
#[derive(Debug, Default)]
pub struct CountingLoader {
    pub opens: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct CountedHandle {
    open: bool,
    closes: Arc<AtomicUsize>,
}

impl SourceResource for CountedHandle {
    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Loader for CountingLoader {
    fn name(&self) -> &str {
        "counting"
    }

    fn parse_metadata(&self, recording: &mut Recording) -> Result<()> {
        let index = recording.attrs.get_i64("_index").unwrap_or_default();
        recording.source_file = Some(format!("session-{}", index));
        recording.available_data.insert("signals".to_string());
        Ok(())
    }

    fn load_recording(&self, _recording: &Recording) -> Result<Payload> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Payload::new().with_handle(Box::new(CountedHandle {
            open: true,
            closes: self.closes.clone(),
        })))
    }
}

/// Lines of a summary file
pub fn summary_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("summary readable")
        .lines()
        .map(str::to_string)
        .collect()
}
