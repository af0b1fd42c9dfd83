//! Server configuration, loaded from a JSON file at startup.

use std::path::Path;

use anyhow::{Context, bail};
use serde::Deserialize;

use crate::prioritizer::Policy;

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// License pools served by this instance.
    pub licenses: Vec<LicenseConfig>,

    /// How long a queued invocation may go without polling before its spot
    /// is forfeited.
    #[serde(default = "default_queue_refresh_secs")]
    pub queue_refresh_secs: u64,

    /// How long an allocation may go without a refresh before its seat is
    /// reclaimed.
    #[serde(default = "default_allocation_refresh_secs")]
    pub allocation_refresh_secs: u64,

    /// Interval between expiry sweeps.
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,

    /// How long after startup the server keeps adopting unknown ids before
    /// it starts treating them as errors.
    #[serde(default = "default_adoption_grace_secs")]
    pub adoption_grace_secs: u64,
}

fn default_queue_refresh_secs() -> u64 {
    5
}

fn default_allocation_refresh_secs() -> u64 {
    5
}

fn default_janitor_interval_secs() -> u64 {
    1
}

fn default_adoption_grace_secs() -> u64 {
    10
}

/// One license pool definition.
#[derive(Debug, Clone, Deserialize)]
pub struct LicenseConfig {
    pub vendor: String,
    pub feature: String,
    /// Number of seats available for this license type.
    pub quantity: usize,
    /// Queue fairness policy; FIFO when omitted.
    #[serde(default)]
    pub policy: Policy,
}

impl LicenseConfig {
    /// Key under which the pool is registered and addressed by clients.
    pub fn type_name(&self) -> String {
        format!("{}::{}", self.vendor, self.feature)
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.janitor_interval_secs == 0 {
            bail!("janitor_interval_secs must be at least 1");
        }
        if self.queue_refresh_secs == 0 {
            bail!("queue_refresh_secs must be at least 1");
        }
        if self.allocation_refresh_secs == 0 {
            bail!("allocation_refresh_secs must be at least 1");
        }
        Ok(())
    }
}
