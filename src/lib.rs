//! devstress -- concurrent write stress harness for character devices.
//!
//! Spawns independent writers against one shared device, drives each through
//! bounded, pattern-tagged write calls, and reports what every writer got
//! accepted, in worker order.

pub mod config;
pub mod harness;
pub mod smoke;
pub mod target;

use std::sync::Arc;

use anyhow::Result;

use crate::config::HarnessConfig;
use crate::harness::HarnessReport;
use crate::target::DeviceTarget;

/// Run the stress harness against the device path named in `config`.
pub async fn run_stress(config: &HarnessConfig) -> Result<HarnessReport> {
    config.validate_device()?;
    tracing::info!(device = %config.target, "Preparing device stress run");
    let target = Arc::new(DeviceTarget::new(&config.target));
    let report = harness::run_harness(target, config).await?;
    Ok(report)
}
