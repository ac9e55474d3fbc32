//! Core identifier and record types.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Ticker`] - Exchange ticker symbol
//! - [`Cik`] - SEC Central Index Key (regulatory filer identifier)
//! - [`CompanyId`] - Surrogate key for a stored company row
//! - [`CompanyRef`] - How the orchestrator addresses a company
//! - [`MetricObservation`] - One canonical metric observation
//! - [`RawFiling`] - One regulatory filing as reported by a filings source

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::metric::{MetricType, MetricUnit, PeriodType};

/// An exchange ticker symbol.
///
/// Tickers are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    /// Creates a new ticker from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    /// Returns the ticker as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ticker {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// An SEC Central Index Key.
///
/// CIKs are normalized to the zero-padded 10-digit form the SEC uses in its
/// JSON APIs, regardless of how the input was padded. A company can be
/// associated with more than one historical CIK across corporate actions;
/// equality is on the padded form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cik(String);

impl Cik {
    /// Creates a new CIK, zero-padding to 10 digits.
    #[must_use]
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(format!("{:0>10}", s.as_ref().trim()))
    }

    /// Returns the zero-padded CIK as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cik {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Cik {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<u64> for Cik {
    fn from(n: u64) -> Self {
        Self(format!("{n:0>10}"))
    }
}

/// Surrogate key of a stored company row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub i64);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the orchestrator addresses a company when driving connectors.
///
/// Either identifier may be absent: a company discovered by ticker-keyed
/// ingestion may not have a confirmed CIK yet, and a placeholder created
/// from a filing has a CIK but no ticker. A connector that cannot map the
/// available identifiers to its own addressing scheme reports no-data
/// rather than failing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRef {
    /// Stored company row this reference points at.
    pub id: CompanyId,
    /// Exchange ticker, if known.
    pub ticker: Option<Ticker>,
    /// Regulatory filer identifier, if confirmed.
    pub cik: Option<Cik>,
    /// Company name.
    pub name: String,
}

impl CompanyRef {
    /// Creates a reference for a ticker-keyed company.
    #[must_use]
    pub fn from_ticker(id: CompanyId, ticker: Ticker, name: impl Into<String>) -> Self {
        Self {
            id,
            ticker: Some(ticker),
            cik: None,
            name: name.into(),
        }
    }

    /// Sets the confirmed CIK.
    #[must_use]
    pub fn with_cik(mut self, cik: Cik) -> Self {
        self.cik = Some(cik);
        self
    }
}

/// One canonical metric observation, as produced by a connector.
///
/// Values are signed: growth and margin metrics are legitimately negative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricObservation {
    /// Which metric this observes.
    pub metric_type: MetricType,
    /// End date of the reporting period.
    pub metric_date: NaiveDate,
    /// Quarterly or annual.
    pub period_type: PeriodType,
    /// Observed value.
    pub value: f64,
    /// Unit of the value.
    pub unit: MetricUnit,
}

impl MetricObservation {
    /// Creates a new observation.
    #[must_use]
    pub const fn new(
        metric_type: MetricType,
        metric_date: NaiveDate,
        period_type: PeriodType,
        value: f64,
        unit: MetricUnit,
    ) -> Self {
        Self {
            metric_type,
            metric_date,
            period_type,
            value,
            unit,
        }
    }
}

/// One regulatory filing as reported by a filings source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFiling {
    /// Form type, e.g. "10-K" or "10-Q".
    pub filing_type: String,
    /// Date the filing was made.
    pub filing_date: NaiveDate,
    /// The SEC accession number, globally unique per filing.
    pub accession_no: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_uppercases() {
        assert_eq!(Ticker::new("aapl").as_str(), "AAPL");
        assert_eq!(Ticker::from("msft"), Ticker::new("MSFT"));
    }

    #[test]
    fn cik_zero_pads_to_ten_digits() {
        assert_eq!(Cik::new("320193").as_str(), "0000320193");
        assert_eq!(Cik::from(320193u64).as_str(), "0000320193");
        // Already-padded input is untouched
        assert_eq!(Cik::new("0000320193").as_str(), "0000320193");
    }

    #[test]
    fn cik_equality_is_on_padded_form() {
        assert_eq!(Cik::new("320193"), Cik::new("0000320193"));
    }
}
