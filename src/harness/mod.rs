//! Concurrent multi-worker write harness.
//!
//! The coordinator spawns one OS thread per worker so that every worker is a
//! truly parallel client of the target. Each worker hands its result back on
//! its own oneshot channel and publishes progress on its own watch channel;
//! workers share nothing but the `Target` they open independently.

pub mod report;
pub mod worker;
pub mod writer;

pub use writer::{ChunkedWriter, PartialWrite, QuotaMode, WriteProgress};

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{ConfigError, HarnessConfig};
use crate::target::Target;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to open {locator} for writing: {source}")]
    Open {
        locator: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Write(#[from] PartialWrite),

    #[error("timed out after {after_secs}s")]
    TimedOut { after_secs: u64 },

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("worker thread exited without a result: {0}")]
    Lost(String),
}

impl WorkerError {
    /// Progress made before the failure, where the error carries it.
    pub fn progress(&self) -> WriteProgress {
        match self {
            WorkerError::Write(partial) => partial.progress,
            _ => WriteProgress::default(),
        }
    }
}

/// Immutable input to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub index: usize,
    pub quota: u64,
    pub chunk_size: usize,
    pub mode: QuotaMode,
}

impl WorkerSpec {
    /// The worker's tag: its index in decimal, repeated to fill each chunk.
    pub fn pattern(&self) -> Vec<u8> {
        self.index.to_string().into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerStatus {
    Success,
    Failed { error: String },
}

/// Outcome of one worker. Produced once, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerResult {
    pub index: usize,
    pub bytes_written: u64,
    pub calls: u64,
    pub elapsed_secs: f64,
    pub status: WorkerStatus,
}

impl WorkerResult {
    pub(super) fn failed(index: usize, progress: WriteProgress, elapsed_secs: f64, err: WorkerError) -> Self {
        Self {
            index,
            bytes_written: progress.bytes_written,
            calls: progress.calls,
            elapsed_secs,
            status: WorkerStatus::Failed {
                error: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkerStatus::Success
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            WorkerStatus::Success => None,
            WorkerStatus::Failed { error } => Some(error),
        }
    }

    pub fn throughput_mib_s(&self) -> f64 {
        report::mib_per_sec(self.bytes_written, self.elapsed_secs)
    }
}

/// All worker results of one run, ordered by worker index.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub run_id: Uuid,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub bytes_per_worker: u64,
    pub chunk_size: usize,
    pub quota_mode: QuotaMode,
    pub results: Vec<WorkerResult>,
}

impl HarnessReport {
    pub fn total_bytes(&self) -> u64 {
        self.results.iter().map(|r| r.bytes_written).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(WorkerResult::is_success)
    }

    /// Aggregate rate over the wall-clock duration of the whole run.
    pub fn throughput_mib_s(&self) -> f64 {
        report::mib_per_sec(self.total_bytes(), self.elapsed_secs)
    }
}

struct RunningWorker {
    index: usize,
    result_rx: oneshot::Receiver<WorkerResult>,
    progress_rx: watch::Receiver<WriteProgress>,
}

/// Run `config.workers` concurrent writers against `target` and wait for all
/// of them.
///
/// Individual worker failures never fail the run; they are recorded in the
/// report. The only error is an invalid configuration, detected before any
/// worker starts.
pub async fn run_harness<T: Target>(
    target: Arc<T>,
    config: &HarnessConfig,
) -> Result<HarnessReport, ConfigError> {
    config.validate()?;

    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let start = Instant::now();

    info!(
        %run_id,
        device = target.locator(),
        workers = config.workers,
        bytes_per_worker = config.bytes_per_worker,
        chunk_size = config.chunk_size,
        quota_mode = %config.quota_mode,
        "starting stress run"
    );

    let running: Vec<RunningWorker> = (0..config.workers)
        .map(|index| {
            let spec = WorkerSpec {
                index,
                quota: config.bytes_per_worker,
                chunk_size: config.chunk_size,
                mode: config.quota_mode,
            };
            spawn_worker(spec, Arc::clone(&target))
        })
        .collect();

    let deadline = config
        .timeout()
        .map(|limit| (tokio::time::Instant::now() + limit, limit.as_secs()));

    let collected = running.into_iter().map(|w| collect(w, deadline, start));
    let mut results = futures::future::join_all(collected).await;
    results.sort_by_key(|r| r.index);

    let report = HarnessReport {
        run_id,
        target: target.locator().to_string(),
        started_at,
        elapsed_secs: start.elapsed().as_secs_f64(),
        bytes_per_worker: config.bytes_per_worker,
        chunk_size: config.chunk_size,
        quota_mode: config.quota_mode,
        results,
    };

    info!(
        %run_id,
        succeeded = report.succeeded(),
        failed = report.failed(),
        total_bytes = report.total_bytes(),
        elapsed_secs = report.elapsed_secs,
        "stress run complete"
    );

    Ok(report)
}

fn spawn_worker<T: Target>(spec: WorkerSpec, target: Arc<T>) -> RunningWorker {
    let index = spec.index;
    let (result_tx, result_rx) = oneshot::channel();
    let (progress_tx, progress_rx) = watch::channel(WriteProgress::default());

    let spawned = std::thread::Builder::new()
        .name(format!("devstress-worker-{index}"))
        .spawn(move || {
            let start = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                worker::run_worker(&spec, target.as_ref(), &progress_tx)
            }));
            let result = outcome.unwrap_or_else(|payload| {
                let progress = *progress_tx.borrow();
                let message = panic_message(payload.as_ref());
                error!(worker = index, bytes = progress.bytes_written, %message, "worker panicked");
                WorkerResult::failed(
                    index,
                    progress,
                    start.elapsed().as_secs_f64(),
                    WorkerError::Panicked(message),
                )
            });
            // The coordinator may have stopped waiting after a timeout.
            let _ = result_tx.send(result);
        });

    if let Err(e) = spawned {
        // The closure (and its sender) was dropped, so `collect` will report
        // this worker as having exited without a result.
        error!(worker = index, error = %e, "failed to spawn worker thread");
    }

    RunningWorker {
        index,
        result_rx,
        progress_rx,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn collect(
    worker: RunningWorker,
    deadline: Option<(tokio::time::Instant, u64)>,
    start: Instant,
) -> WorkerResult {
    let RunningWorker {
        index,
        mut result_rx,
        progress_rx,
    } = worker;

    let received = match deadline {
        Some((at, after_secs)) => match tokio::time::timeout_at(at, &mut result_rx).await {
            Ok(received) => received,
            Err(_) => {
                let progress = *progress_rx.borrow();
                error!(worker = index, bytes = progress.bytes_written, "worker timed out");
                return WorkerResult::failed(
                    index,
                    progress,
                    start.elapsed().as_secs_f64(),
                    WorkerError::TimedOut { after_secs },
                );
            }
        },
        None => result_rx.await,
    };

    match received {
        Ok(result) => result,
        Err(e) => {
            let progress = *progress_rx.borrow();
            error!(worker = index, "worker exited without a result");
            WorkerResult::failed(
                index,
                progress,
                start.elapsed().as_secs_f64(),
                WorkerError::Lost(e.to_string()),
            )
        }
    }
}
