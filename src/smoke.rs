//! Single-shot smoke checks against a target.
//!
//! Unlike the harness these never fail the caller: every outcome, including
//! an I/O error, is folded into a [`SmokeResult`] for printing.

use std::io::{Read, Write};
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use crate::target::Target;

/// Bytes of `A` written by the write check.
pub const DEFAULT_WRITE_BYTES: usize = 7000;

/// Upper bound on bytes read by the read check.
pub const DEFAULT_READ_BYTES: u64 = 5000;

const PREVIEW_CHARS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmokeMode {
    Write,
    Read,
    Both,
}

impl FromStr for SmokeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write" => Ok(SmokeMode::Write),
            "read" => Ok(SmokeMode::Read),
            "both" => Ok(SmokeMode::Both),
            other => Err(format!("unknown mode '{other}' (expected write, read or both)")),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum TestStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Result of a single smoke check.
#[derive(Debug, Serialize, Clone)]
pub struct SmokeResult {
    pub check: String,
    pub status: TestStatus,
    pub details: String,
    /// Byte count returned by the call under test, when it got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned: Option<u64>,
}

impl SmokeResult {
    fn pass(check: &str, details: String, returned: Option<u64>) -> Self {
        Self {
            check: check.to_string(),
            status: TestStatus::Pass,
            details,
            returned,
        }
    }

    fn fail(check: &str, details: String) -> Self {
        Self {
            check: check.to_string(),
            status: TestStatus::Fail,
            details,
            returned: None,
        }
    }
}

/// Run the checks selected by `mode`: write, then read for `Both`.
pub fn run<T: Target + ?Sized>(target: &T, mode: SmokeMode) -> Vec<SmokeResult> {
    info!(device = target.locator(), ?mode, "running smoke checks");

    let mut results = Vec::new();
    if matches!(mode, SmokeMode::Write | SmokeMode::Both) {
        results.push(check_write(target, DEFAULT_WRITE_BYTES));
    }
    if matches!(mode, SmokeMode::Read | SmokeMode::Both) {
        results.push(check_read(target, DEFAULT_READ_BYTES));
    }
    results
}

/// Open for writing and close again without writing anything.
pub fn check_open<T: Target + ?Sized>(target: &T) -> SmokeResult {
    match target.open_write() {
        Ok(_handle) => SmokeResult::pass("open", format!("opened {} for writing", target.locator()), None),
        Err(e) => SmokeResult::fail("open", format!("failed to open {}: {}", target.locator(), e)),
    }
}

/// Issue one write call of `len` bytes of `A` and report what it returned.
pub fn check_write<T: Target + ?Sized>(target: &T, len: usize) -> SmokeResult {
    let data = vec![b'A'; len];
    let mut handle = match target.open_write() {
        Ok(h) => h,
        Err(e) => return SmokeResult::fail("write", format!("failed to open {}: {}", target.locator(), e)),
    };

    match handle.write(&data) {
        Ok(n) => SmokeResult::pass(
            "write",
            format!("write of {} bytes returned with {}", len, n),
            Some(n as u64),
        ),
        Err(e) => SmokeResult::fail("write", format!("write of {} bytes failed: {}", len, e)),
    }
}

/// Read up to `max_bytes` and report how many came back.
pub fn check_read<T: Target + ?Sized>(target: &T, max_bytes: u64) -> SmokeResult {
    let handle = match target.open_read() {
        Ok(h) => h,
        Err(e) => return SmokeResult::fail("read", format!("failed to open {}: {}", target.locator(), e)),
    };

    let mut data = Vec::new();
    match handle.take(max_bytes).read_to_end(&mut data) {
        Ok(n) => {
            let preview: String = String::from_utf8_lossy(&data).chars().take(PREVIEW_CHARS).collect();
            SmokeResult::pass(
                "read",
                format!("read returned with {} bytes: {:?}", n, preview),
                Some(n as u64),
            )
        }
        Err(e) => SmokeResult::fail("read", format!("read of up to {} bytes failed: {}", max_bytes, e)),
    }
}
