//! One independent client of the shared target.

use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::writer::{ChunkedWriter, WriteProgress};
use super::{WorkerError, WorkerResult, WorkerSpec, WorkerStatus};
use crate::target::Target;

/// Open a private handle, write the worker's quota, and report the outcome.
///
/// Never fails: open and write errors become a `Failed` result so that
/// siblings and the coordinator carry on. Progress after every accepted
/// call is published on `progress_tx`.
pub fn run_worker<T: Target + ?Sized>(
    spec: &WorkerSpec,
    target: &T,
    progress_tx: &watch::Sender<WriteProgress>,
) -> WorkerResult {
    let start = Instant::now();
    let outcome = drive(spec, target, progress_tx);
    let elapsed_secs = start.elapsed().as_secs_f64();

    match outcome {
        Ok(progress) => {
            info!(
                worker = spec.index,
                bytes = progress.bytes_written,
                calls = progress.calls,
                elapsed_secs,
                "worker finished"
            );
            WorkerResult {
                index: spec.index,
                bytes_written: progress.bytes_written,
                calls: progress.calls,
                elapsed_secs,
                status: WorkerStatus::Success,
            }
        }
        Err(e) => {
            let progress = e.progress();
            warn!(
                worker = spec.index,
                bytes = progress.bytes_written,
                error = %e,
                "worker failed"
            );
            WorkerResult::failed(spec.index, progress, elapsed_secs, e)
        }
    }
}

// The handle lives only inside this function, so it is closed on every
// return path, including `?`.
fn drive<T: Target + ?Sized>(
    spec: &WorkerSpec,
    target: &T,
    progress_tx: &watch::Sender<WriteProgress>,
) -> Result<WriteProgress, WorkerError> {
    let mut handle = target.open_write().map_err(|source| WorkerError::Open {
        locator: target.locator().to_string(),
        source,
    })?;
    debug!(worker = spec.index, device = target.locator(), "opened target for writing");

    let writer = ChunkedWriter::new(&spec.pattern(), spec.chunk_size, spec.quota, spec.mode);
    let progress = writer.write_all(&mut handle, |p| {
        progress_tx.send_replace(*p);
    })?;

    Ok(progress)
}
