//! Metric vocabulary and reporting period types.
//!
//! This module defines [`MetricType`] for the fixed set of tracked metrics,
//! [`MetricUnit`] for their units, and [`PeriodType`] for reporting periods.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;

/// The fixed set of metrics this system ingests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Total revenue for the period.
    Revenue,
    /// Gross profit over revenue.
    GrossMargin,
    /// Operating income over revenue.
    OperatingMargin,
    /// Net income growth against the same period a year earlier.
    EarningsGrowth,
    /// Price-to-earnings ratio.
    PeRatio,
    /// Diluted earnings per share.
    Eps,
    /// Return on equity.
    Roe,
}

impl MetricType {
    /// Returns the stable string form used in the store and in summaries.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::GrossMargin => "gross_margin",
            Self::OperatingMargin => "operating_margin",
            Self::EarningsGrowth => "earnings_growth",
            Self::PeRatio => "pe_ratio",
            Self::Eps => "eps",
            Self::Roe => "roe",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revenue" => Ok(Self::Revenue),
            "gross_margin" => Ok(Self::GrossMargin),
            "operating_margin" => Ok(Self::OperatingMargin),
            "earnings_growth" => Ok(Self::EarningsGrowth),
            "pe_ratio" => Ok(Self::PeRatio),
            "eps" => Ok(Self::Eps),
            "roe" => Ok(Self::Roe),
            other => Err(IngestError::Parse(format!("unknown metric type: {other}"))),
        }
    }
}

/// Unit of a metric value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    /// US dollars.
    Usd,
    /// US dollars per share.
    UsdPerShare,
    /// Dimensionless ratio.
    Ratio,
    /// Percentage (already scaled by 100).
    Percent,
}

impl MetricUnit {
    /// Returns the stable string form used in the store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::UsdPerShare => "usd_per_share",
            Self::Ratio => "ratio",
            Self::Percent => "percent",
        }
    }
}

impl fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricUnit {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usd" => Ok(Self::Usd),
            "usd_per_share" => Ok(Self::UsdPerShare),
            "ratio" => Ok(Self::Ratio),
            "percent" => Ok(Self::Percent),
            other => Err(IngestError::Parse(format!("unknown metric unit: {other}"))),
        }
    }
}

/// Reporting period type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    /// Quarterly reporting period.
    #[default]
    Quarterly,
    /// Annual reporting period.
    Annual,
}

impl PeriodType {
    /// Returns the stable string form used in the store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarterly" => Ok(Self::Quarterly),
            "annual" => Ok(Self::Annual),
            other => Err(IngestError::Parse(format!("unknown period type: {other}"))),
        }
    }
}
