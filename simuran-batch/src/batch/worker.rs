//! Multi-worker execution
//!
//! Jobs are dealt round-robin into `num_workers` disjoint queues. Each queue
//! runs on its own thread of a dedicated rayon pool and processes its jobs
//! one at a time, sending outcomes back over a channel. The caller receives
//! them keyed by container index.

use super::{analyse, Analysed};
use crate::analysis::AnalysisFn;
use crate::recording::Recording;
use simuran_common::{Error, ParameterMap, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tracing::debug;

/// One recording to analyse on a worker
pub(crate) struct Job {
    pub index: usize,
    /// Load the recording before its analyses run
    pub load: bool,
    /// Owned, payload-free copy; the worker loads it itself
    pub recording: Recording,
    pub specs: ParameterMap,
}

pub(crate) enum JobOutcome {
    Done(Analysed),
    LoadFailed(Error),
    /// An analysis failed without `handle_errors`
    Aborted(Error),
}

pub(crate) struct WorkerSettings {
    pub num_workers: usize,
    pub handle_errors: bool,
    pub stop_flag: Arc<AtomicBool>,
}

/// Run `jobs` across the pool; jobs skipped after a stop or abort are absent
pub(crate) fn run_jobs(
    jobs: Vec<Job>,
    functions: &[Arc<dyn AnalysisFn>],
    settings: &WorkerSettings,
) -> Result<BTreeMap<usize, JobOutcome>> {
    let workers = settings.num_workers.clamp(1, jobs.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("simuran-worker-{}", i))
        .build()
        .map_err(|e| Error::Configuration(format!("cannot start {} workers: {}", workers, e)))?;

    let mut queues: Vec<Vec<Job>> = (0..workers).map(|_| Vec::new()).collect();
    for (position, job) in jobs.into_iter().enumerate() {
        queues[position % workers].push(job);
    }

    let aborted = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<(usize, JobOutcome)>();
    pool.scope(|scope| {
        for (worker, queue) in queues.into_iter().enumerate() {
            let tx = tx.clone();
            let aborted = &aborted;
            scope.spawn(move |_| {
                debug!("Worker {} starting with {} recording(s)", worker, queue.len());
                for job in queue {
                    if aborted.load(Ordering::SeqCst) || settings.stop_flag.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = job.index;
                    let outcome = run_job(job, functions, settings);
                    if matches!(outcome, JobOutcome::Aborted(_)) {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    Ok(rx.into_iter().collect())
}

fn run_job(job: Job, functions: &[Arc<dyn AnalysisFn>], settings: &WorkerSettings) -> JobOutcome {
    let Job {
        index,
        load,
        mut recording,
        specs,
    } = job;
    if load {
        if let Err(err) = recording.load() {
            return JobOutcome::LoadFailed(err);
        }
    }
    let outcome = match analyse(&mut recording, index, functions, &specs, settings.handle_errors) {
        Ok(analysed) => JobOutcome::Done(analysed),
        Err(err) => JobOutcome::Aborted(err),
    };
    recording.unload();
    outcome
}
