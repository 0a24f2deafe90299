//! TOML configuration for devstress.
//!
//! Layered model: compiled-in defaults, then a config file (from
//! `DEVSTRESS_CONFIG` or the system location), then command-line overrides
//! applied by the binary.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::harness::QuotaMode;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DEVSTRESS_CONFIG";

/// Config file consulted when `DEVSTRESS_CONFIG` is unset.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/devstress/devstress.toml";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("target locator cannot be empty")]
    EmptyTarget,
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a devstress process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StressConfig {
    #[serde(default)]
    pub harness: HarnessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StressConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded devstress configuration");
        Ok(config)
    }

    /// Try, in order: `$DEVSTRESS_CONFIG`, the system config file, defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "DEVSTRESS_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Parameters of one stress run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Path of the shared device every worker opens.
    pub target: String,
    /// Number of concurrent writers.
    pub workers: usize,
    /// Bytes each worker must get accepted.
    pub bytes_per_worker: u64,
    /// Size of every write call.
    pub chunk_size: usize,
    /// Whether the final call may overshoot the quota.
    pub quota_mode: QuotaMode,
    /// Stop waiting for workers after this many seconds. Unset means wait
    /// for every worker however long it takes.
    pub timeout_secs: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target: "/dev/scull0".to_string(),
            workers: 5,
            bytes_per_worker: 512 * 1024 * 1024,
            chunk_size: 1024 * 1024,
            quota_mode: QuotaMode::Permissive,
            timeout_secs: None,
        }
    }
}

impl HarnessConfig {
    /// Checks the harness itself relies on. The `target` string is only
    /// consulted when a device is opened by path, see [`Self::validate_device`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }

    pub fn validate_device(&self) -> Result<(), ConfigError> {
        if self.target.is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        self.validate()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Parse a byte count with an optional binary suffix: `4096`, `64K`, `512M`, `2G`.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, shift) = match s.char_indices().last() {
        Some((i, 'k' | 'K')) => (&s[..i], 10),
        Some((i, 'm' | 'M')) => (&s[..i], 20),
        Some((i, 'g' | 'G')) => (&s[..i], 30),
        _ => (s, 0),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{s}' (expected e.g. 4096, 64K, 512M)"))?;
    value
        .checked_mul(1 << shift)
        .ok_or_else(|| format!("size '{s}' overflows"))
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable logs.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_legacy_stress_run() {
        let cfg = StressConfig::default();

        assert_eq!(cfg.harness.target, "/dev/scull0");
        assert_eq!(cfg.harness.workers, 5);
        assert_eq!(cfg.harness.bytes_per_worker, 536_870_912);
        assert_eq!(cfg.harness.chunk_size, 1_048_576);
        assert_eq!(cfg.harness.quota_mode, QuotaMode::Permissive);
        assert!(cfg.harness.timeout().is_none());

        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[harness]
target = "/dev/scull1"
workers = 8
bytes_per_worker = 1048576
chunk_size = 4096
quota_mode = "exact"
timeout_secs = 30

[logging]
level = "debug"
json = true
"#;

        let cfg: StressConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.harness.target, "/dev/scull1");
        assert_eq!(cfg.harness.workers, 8);
        assert_eq!(cfg.harness.bytes_per_worker, 1_048_576);
        assert_eq!(cfg.harness.chunk_size, 4096);
        assert_eq!(cfg.harness.quota_mode, QuotaMode::Exact);
        assert_eq!(cfg.harness.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[harness]
workers = 2
"#;

        let cfg: StressConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.harness.workers, 2);
        assert_eq!(cfg.harness.target, "/dev/scull0");
        assert_eq!(cfg.harness.chunk_size, 1024 * 1024);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: StressConfig = toml::from_str("").unwrap();
        let defaults = StressConfig::default();

        assert_eq!(cfg.harness.target, defaults.harness.target);
        assert_eq!(cfg.harness.bytes_per_worker, defaults.harness.bytes_per_worker);
    }

    #[test]
    fn test_unknown_quota_mode_is_rejected() {
        let result: Result<StressConfig, _> = toml::from_str("[harness]\nquota_mode = \"strict\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        let mut cfg = HarnessConfig::default();
        assert_eq!(cfg.validate(), Ok(()));

        cfg.chunk_size = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroChunkSize));

        cfg.chunk_size = 1;
        cfg.target.clear();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.validate_device(), Err(ConfigError::EmptyTarget));

        cfg.target = "/dev/scull0".to_string();
        cfg.chunk_size = 0;
        assert_eq!(cfg.validate_device(), Err(ConfigError::ZeroChunkSize));

        let zero_work = HarnessConfig {
            workers: 0,
            bytes_per_worker: 0,
            ..Default::default()
        };
        assert_eq!(zero_work.validate(), Ok(()));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("64K"), Ok(64 * 1024));
        assert_eq!(parse_size("512M"), Ok(512 * 1024 * 1024));
        assert_eq!(parse_size("2g"), Ok(2 * 1024 * 1024 * 1024));
        assert!(parse_size("").is_err());
        assert!(parse_size("M").is_err());
        assert!(parse_size("12Q").is_err());
        assert!(parse_size("99999999999999999G").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("devstress.toml");
        std::fs::write(&path, "[harness]\ntarget = \"/dev/scull2\"\n").unwrap();

        let cfg = StressConfig::load(&path).unwrap();
        assert_eq!(cfg.harness.target, "/dev/scull2");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = StressConfig::load(Path::new("/nonexistent/path/devstress.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut cfg = StressConfig::default();
        cfg.harness.timeout_secs = Some(90);
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let roundtripped: StressConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(cfg.harness.target, roundtripped.harness.target);
        assert_eq!(cfg.harness.timeout_secs, roundtripped.harness.timeout_secs);
        assert_eq!(cfg.harness.quota_mode, roundtripped.harness.quota_mode);
    }
}
