//! The shared byte sink under test.
//!
//! A [`Target`] hands out independent handles; the harness never shares a
//! handle between workers. Handles are plain `std::io` readers/writers and are
//! closed when dropped, so every exit path of a worker releases its handle.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// An endpoint that can be opened concurrently by many workers.
///
/// Implementations must support several write handles being open at the
/// same time. Whether the endpoint behaves correctly under that load is the
/// property the harness exists to exercise, so implementations should not
/// serialize access on the harness's behalf.
pub trait Target: Send + Sync + 'static {
    type Writer: Write + Send;
    type Reader: Read + Send;

    /// Human-readable locator, used in logs and reports.
    fn locator(&self) -> &str;

    fn open_write(&self) -> io::Result<Self::Writer>;

    fn open_read(&self) -> io::Result<Self::Reader>;
}

/// A character device (or any path) opened through the filesystem.
#[derive(Debug, Clone)]
pub struct DeviceTarget {
    path: PathBuf,
    locator: String,
}

impl DeviceTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let locator = path.display().to_string();
        Self { path, locator }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Target for DeviceTarget {
    type Writer = File;
    type Reader = File;

    fn locator(&self) -> &str {
        &self.locator
    }

    /// Open for writing with truncation. The path is never created: a missing
    /// device is an open failure, not a new regular file.
    fn open_write(&self) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
    }

    fn open_read(&self) -> io::Result<File> {
        File::open(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_fails() {
        let target = DeviceTarget::new("/nonexistent/devstress0");
        let err = target.open_write().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!target.path().exists());
    }

    #[test]
    fn test_write_then_read_regular_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dev0");
        std::fs::write(&path, b"stale contents").unwrap();

        let target = DeviceTarget::new(&path);
        assert_eq!(target.locator(), path.display().to_string());

        {
            let mut w = target.open_write().unwrap();
            w.write_all(b"fresh").unwrap();
        }

        let mut buf = String::new();
        target.open_read().unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "fresh");
    }
}
