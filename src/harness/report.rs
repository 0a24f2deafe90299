//! Human-readable rendering of harness results.

use super::{HarnessReport, WorkerResult, WorkerStatus};

const MIB: f64 = 1024.0 * 1024.0;

pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / MIB
}

/// MiB/s, or zero when nothing measurable elapsed.
pub fn mib_per_sec(bytes: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        bytes_to_mib(bytes) / secs
    } else {
        0.0
    }
}

fn format_rate(mib_s: f64) -> String {
    if mib_s >= 1024.0 {
        format!("{:.2} GiB/s", mib_s / 1024.0)
    } else {
        format!("{:.1} MiB/s", mib_s)
    }
}

/// One line per worker, e.g. `Worker 3: wrote 512.0 MB to /dev/scull0 (812.4 MiB/s)`.
pub fn format_worker_line(result: &WorkerResult, target: &str) -> String {
    match &result.status {
        WorkerStatus::Success => format!(
            "Worker {}: wrote {:.1} MB to {} ({})",
            result.index,
            bytes_to_mib(result.bytes_written),
            target,
            format_rate(result.throughput_mib_s()),
        ),
        WorkerStatus::Failed { error } => format!(
            "Worker {}: FAILED after {:.1} MB to {}: {}",
            result.index,
            bytes_to_mib(result.bytes_written),
            target,
            error,
        ),
    }
}

pub fn format_summary(report: &HarnessReport) -> String {
    let workers = report.results.len();
    format!(
        "{} worker{} ({} ok, {} failed), {:.1} MB total in {:.2}s, {} aggregate, {} quota",
        workers,
        if workers == 1 { "" } else { "s" },
        report.succeeded(),
        report.failed(),
        bytes_to_mib(report.total_bytes()),
        report.elapsed_secs,
        format_rate(report.throughput_mib_s()),
        report.quota_mode,
    )
}

/// Full text report: worker lines in index order, then the summary.
pub fn render_text(report: &HarnessReport) -> String {
    let mut out = String::new();
    for result in &report.results {
        out.push_str(&format_worker_line(result, &report.target));
        out.push('\n');
    }
    out.push_str(&format_summary(report));
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::QuotaMode;

    fn result(index: usize, bytes: u64, secs: f64, status: WorkerStatus) -> WorkerResult {
        WorkerResult {
            index,
            bytes_written: bytes,
            calls: 1,
            elapsed_secs: secs,
            status,
        }
    }

    #[test]
    fn test_format_worker_line_success() {
        let r = result(2, 512 * 1024 * 1024, 0.25, WorkerStatus::Success);
        let line = format_worker_line(&r, "/dev/scull0");
        assert!(line.starts_with("Worker 2: wrote 512.0 MB to /dev/scull0"));
        assert!(line.contains("2.00 GiB/s"));
    }

    #[test]
    fn test_format_worker_line_failure() {
        let r = result(
            0,
            3 * 1024 * 1024,
            1.0,
            WorkerStatus::Failed {
                error: "No such device".to_string(),
            },
        );
        let line = format_worker_line(&r, "/dev/scull0");
        assert_eq!(line, "Worker 0: FAILED after 3.0 MB to /dev/scull0: No such device");
    }

    #[test]
    fn test_rate_is_zero_without_elapsed_time() {
        assert_eq!(mib_per_sec(1024, 0.0), 0.0);
        assert_eq!(format_rate(0.0), "0.0 MiB/s");
    }

    #[test]
    fn test_render_text_lists_workers_then_summary() {
        let report = HarnessReport {
            run_id: uuid::Uuid::new_v4(),
            target: "/dev/scull0".to_string(),
            started_at: chrono::Utc::now(),
            elapsed_secs: 1.0,
            bytes_per_worker: 1024 * 1024,
            chunk_size: 1024,
            quota_mode: QuotaMode::Permissive,
            results: vec![
                result(0, 1024 * 1024, 1.0, WorkerStatus::Success),
                result(1, 1024 * 1024, 1.0, WorkerStatus::Success),
            ],
        };

        let text = render_text(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Worker 0:"));
        assert!(lines[1].starts_with("Worker 1:"));
        assert!(lines[2].starts_with("2 workers (2 ok, 0 failed), 2.0 MB total"));
        assert!(lines[2].ends_with("permissive quota"));
    }
}
