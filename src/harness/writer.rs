//! Chunked writer: turns one large logical write into bounded write calls.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// How the final chunk relates to the remaining quota.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaMode {
    /// Every call carries a full chunk; the total may overshoot the quota by
    /// up to `chunk_size - 1` bytes.
    #[default]
    Permissive,
    /// The last call is truncated to the bytes still owed.
    Exact,
}

impl std::fmt::Display for QuotaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaMode::Permissive => write!(f, "permissive"),
            QuotaMode::Exact => write!(f, "exact"),
        }
    }
}

/// Running totals for one worker's write loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteProgress {
    /// Sum of the accepted counts returned by the target.
    pub bytes_written: u64,
    /// Write calls that returned an accepted count.
    pub calls: u64,
}

/// A write call failed; the progress made before it is preserved.
#[derive(Debug, Error)]
#[error("write failed after {} bytes ({} calls): {source}", .progress.bytes_written, .progress.calls)]
pub struct PartialWrite {
    pub progress: WriteProgress,
    #[source]
    pub source: io::Error,
}

/// Writes `quota` bytes of a repeating pattern in chunks of a fixed size.
#[derive(Debug, Clone)]
pub struct ChunkedWriter {
    chunk: Vec<u8>,
    quota: u64,
    mode: QuotaMode,
}

impl ChunkedWriter {
    /// Build the chunk buffer once: `chunk_size` bytes of `pattern` repeated.
    pub fn new(pattern: &[u8], chunk_size: usize, quota: u64, mode: QuotaMode) -> Self {
        let chunk = pattern.iter().copied().cycle().take(chunk_size).collect();
        Self { chunk, quota, mode }
    }

    pub fn chunk(&self) -> &[u8] {
        &self.chunk
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Issue write calls until the accepted total reaches the quota.
    ///
    /// The loop advances on the count each call reports, not on the number
    /// of calls, so a target that accepts short writes simply gets more
    /// calls. The first failing call aborts the loop; nothing is retried
    /// except `Interrupted`, which carries no information about the target.
    /// `on_chunk` sees the progress after every accepted call.
    pub fn write_all<W, F>(&self, handle: &mut W, mut on_chunk: F) -> Result<WriteProgress, PartialWrite>
    where
        W: Write + ?Sized,
        F: FnMut(&WriteProgress),
    {
        let mut progress = WriteProgress::default();

        if self.quota > 0 && self.chunk.is_empty() {
            return Err(PartialWrite {
                progress,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty chunk for a non-zero quota"),
            });
        }

        while progress.bytes_written < self.quota {
            let buf = match self.mode {
                QuotaMode::Permissive => &self.chunk[..],
                QuotaMode::Exact => {
                    let owed = self.quota - progress.bytes_written;
                    let len = usize::try_from(owed).map_or(self.chunk.len(), |o| o.min(self.chunk.len()));
                    &self.chunk[..len]
                }
            };

            match handle.write(buf) {
                Ok(0) => {
                    return Err(PartialWrite {
                        progress,
                        source: io::Error::new(io::ErrorKind::WriteZero, "target accepted zero bytes"),
                    });
                }
                Ok(n) => {
                    progress.bytes_written += n as u64;
                    progress.calls += 1;
                    trace!(
                        requested = buf.len(),
                        accepted = n,
                        total = progress.bytes_written,
                        "chunk written"
                    );
                    on_chunk(&progress);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(PartialWrite { progress, source }),
            }
        }

        Ok(progress)
    }
}
