//! Run configuration.
//!
//! The batch trigger supplies a [`RunConfig`] — the company universe, the
//! reporting-period range, per-provider quotas, and concurrency — as a JSON
//! document; nothing is read from the environment here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use ingest_core::{IngestError, Period, Result, Ticker};

use crate::quota::QuotaTracker;

/// One company in the ingestion universe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseEntry {
    /// Exchange ticker.
    pub ticker: Ticker,
    /// Company name.
    pub name: String,
    /// Business sector, if known.
    #[serde(default)]
    pub sector: Option<String>,
    /// Subsector/category, if known.
    #[serde(default)]
    pub category: Option<String>,
}

/// A provider's quota, as configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Calls allowed per window.
    pub max_calls: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

/// Configuration for one ingestion run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// The fixed company universe to ingest.
    pub universe: Vec<UniverseEntry>,
    /// First reporting period, e.g. "2023Q1".
    pub start: Period,
    /// Last reporting period (inclusive).
    pub end: Period,
    /// Per-provider quotas, keyed by provider id ("fmp", "finnhub", ...).
    #[serde(default)]
    pub quotas: HashMap<String, QuotaConfig>,
    /// Companies processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

const fn default_concurrency() -> usize {
    1
}

impl RunConfig {
    /// Loads and validates a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| IngestError::Config(format!("{}: {e}", path.as_ref().display())))?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| IngestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the period range and concurrency are usable.
    pub fn validate(&self) -> Result<()> {
        if self.end < self.start {
            return Err(IngestError::Config(format!(
                "period range is empty: {} through {}",
                self.start, self.end
            )));
        }
        if self.concurrency == 0 {
            return Err(IngestError::Config("concurrency must be at least 1".into()));
        }
        Ok(())
    }

    /// Builds the quota tracker this configuration describes.
    #[must_use]
    pub fn quota_tracker(&self) -> QuotaTracker {
        self.quotas.iter().fold(
            QuotaTracker::new(),
            |tracker, (provider, quota)| {
                tracker.with_limit(
                    provider.clone(),
                    quota.max_calls,
                    Duration::from_secs(quota.window_secs),
                )
            },
        )
    }

    /// The reporting periods this run covers, in order.
    #[must_use]
    pub fn periods(&self) -> Vec<Period> {
        self.start.through(self.end).collect()
    }
}
