//! simuran-batch - batch analysis front end
//!
//! ```bash
//! simuran-batch <INDEX> <CONFIG> <FUNCTIONS> [--dry-run] [--handle-errors]
//!     [--num-workers N] [--filter EXPR|FILE] [--output DIR]
//! ```
//!
//! `INDEX` is a CSV index table or a directory to scan with the configured
//! loader. `CONFIG` and `FUNCTIONS` are parameter files (TOML, YAML or JSON).

use anyhow::{Context, Result};
use clap::Parser;
use simuran_batch::functions::lookup_analysis;
use simuran_batch::{
    create_loader, AnalysisFn, BatchRunner, Container, IndexTable, Loader, SummaryOptions,
};
use simuran_common::config::{config_stem, ensure_directory, resolve_output_dir};
use simuran_common::logging::{init_logging, LoggingConfig};
use simuran_common::time::run_timestamp;
use simuran_common::ParameterMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Command-line arguments for simuran-batch
#[derive(Parser, Debug)]
#[command(name = "simuran-batch")]
#[command(about = "Run analysis functions over a table of recordings")]
#[command(version)]
struct Args {
    /// Index table (CSV) or directory of recordings
    index: PathBuf,

    /// Run configuration (loader, summary options)
    config: PathBuf,

    /// Function list (`functions`, `function_args`)
    functions: PathBuf,

    /// Print what would run and exit
    #[arg(long)]
    dry_run: bool,

    /// Record failures and keep going instead of aborting
    #[arg(long)]
    handle_errors: bool,

    /// Worker threads
    #[arg(long, default_value = "1", env = "SIMURAN_NUM_WORKERS")]
    num_workers: usize,

    /// Row filter: `col=value[|alt][,col2=value]` or a parameter file
    #[arg(long, value_name = "EXPR|FILE")]
    filter: Option<String>,

    /// Output directory (default: sim_results next to the index)
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let timestamp = run_timestamp();
    let output_root = resolve_output_dir(args.output.as_deref(), &args.index);
    let run_dir = output_root.join(&timestamp);

    let _log_guard = init_logging(&LoggingConfig {
        run_log: (!args.dry_run).then(|| run_dir.join("run.log")),
        ..LoggingConfig::default()
    })?;

    info!("Starting simuran-batch {}", env!("CARGO_PKG_VERSION"));
    info!("Index: {}", args.index.display());

    let config = ParameterMap::read(&args.config)
        .with_context(|| format!("Failed to read config {}", args.config.display()))?;
    let function_list = ParameterMap::read(&args.functions)
        .with_context(|| format!("Failed to read function list {}", args.functions.display()))?;

    let loader_name = config.get_str("loader").unwrap_or("metadata");
    let loader_options = config.get_map("loader_options").unwrap_or_default();
    let loader = create_loader(loader_name, &loader_options)?;

    let mut table = if args.index.is_dir() {
        loader.index_files(&args.index)?
    } else {
        IndexTable::read_csv(&args.index)?
    };
    if let Some(filter) = &args.filter {
        table = table.select(&read_filter(filter)?);
    }

    let functions = resolve_functions(&function_list)?;
    let function_args = function_list.get_map("function_args").unwrap_or_default();

    let mut container = Container::from_table(table, loader)?;
    container.set_load_on_fly(config.get_bool("load_on_fly").unwrap_or(false));

    if args.dry_run {
        print_plan(&container, &functions, &run_dir);
        return Ok(());
    }

    ensure_directory(&run_dir)?;
    let summary_options = SummaryOptions::from_params(&config.get_map("summary").unwrap_or_default())?;
    let summary_name = simuran_batch::sink::summary_file_name(&config_stem(&args.config), &timestamp);

    let runner = BatchRunner::new()
        .with_workers(args.num_workers)
        .with_handle_errors(args.handle_errors)
        .with_to_load(config.get_string_list("to_load").unwrap_or_default())
        .with_output_dir(&run_dir)
        .with_summary(summary_name, summary_options);

    let report = runner.run_all(&mut container, &functions, None, &function_args)?;

    info!(
        "Processed {} of {} recordings; summary at {}",
        report.processed,
        container.len(),
        report
            .summary_path
            .as_deref()
            .map(Path::display)
            .map(|d| d.to_string())
            .unwrap_or_default()
    );
    Ok(())
}

/// A filter is a parameter file when the path exists, else an expression
fn read_filter(filter: &str) -> Result<ParameterMap> {
    let path = Path::new(filter);
    if path.is_file() {
        return ParameterMap::read(path)
            .with_context(|| format!("Failed to read filter file {}", path.display()));
    }
    Ok(IndexTable::parse_filter_expr(filter)?)
}

fn resolve_functions(function_list: &ParameterMap) -> Result<Vec<Arc<dyn AnalysisFn>>> {
    let names = function_list
        .get_string_list("functions")
        .context("Function list has no `functions` entry")?;
    names
        .iter()
        .map(|name| lookup_analysis(name).map_err(Into::into))
        .collect()
}

fn print_plan(container: &Container, functions: &[Arc<dyn AnalysisFn>], run_dir: &Path) {
    println!("Would run {} function(s):", functions.len());
    for function in functions {
        println!("  {}", function.name());
    }
    println!("over {} recording(s):", container.len());
    for (i, recording) in container.iter().enumerate() {
        let marker = if container.is_invalid(i) { " (invalid)" } else { "" };
        println!("  [{}] {}{}", container.row_label(i), recording.display_name(), marker);
    }
    println!("writing to {}", run_dir.display());
}
