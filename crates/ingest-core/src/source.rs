//! Connector traits for external data providers.
//!
//! This module defines the traits every provider connector implements:
//!
//! - [`Connector`] - Base trait: provider identity and covered metrics
//! - [`MetricSource`] - Fetches metric observations for a company/period
//! - [`FilingSource`] - Fetches regulatory filings for a company
//!
//! Connectors are side-effect-free beyond the network call itself. A
//! company or period the provider simply has no data for is an *expected*
//! outcome, modelled as [`FetchOutcome::NoData`] / [`FilingFetch::NoData`],
//! never as an error.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::Result,
    metric::MetricType,
    period::Period,
    types::{Cik, CompanyRef, MetricObservation, RawFiling},
};

/// Outcome of a metric fetch.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// Observations mapped into the canonical shape.
    Observations(Vec<MetricObservation>),
    /// The provider has no data for this company/period; an expected gap.
    NoData,
}

/// Outcome of a filings fetch.
#[derive(Clone, Debug, PartialEq)]
pub enum FilingFetch {
    /// Filings for the filer, together with the CIK the provider keys on.
    ///
    /// The CIK travels with the filings because the store may not know it
    /// yet — this is exactly the path that creates placeholder companies.
    Filings {
        /// The regulatory filer identifier.
        cik: Cik,
        /// The filings reported for it.
        filings: Vec<RawFiling>,
    },
    /// The provider cannot address this company; an expected gap.
    NoData,
}

/// Base trait for all provider connectors.
pub trait Connector: Send + Sync + Debug {
    /// Human-readable provider name (e.g. "Financial Modeling Prep").
    fn name(&self) -> &str;

    /// Stable provider identifier used for quota tracking and as the
    /// `source` column of stored metrics (e.g. "fmp").
    fn provider_id(&self) -> &str;
}

/// Connector that produces metric observations.
#[async_trait]
pub trait MetricSource: Connector {
    /// The metric types this connector can produce.
    fn metric_types(&self) -> &[MetricType];

    /// Fetches observations for one company and reporting period.
    ///
    /// Returns [`FetchOutcome::NoData`] when the provider cannot address
    /// the company (e.g. no ticker, symbol not listed) or has nothing for
    /// the period. Errors are reserved for genuine failures.
    async fn fetch_metrics(&self, company: &CompanyRef, period: Period) -> Result<FetchOutcome>;
}

/// Connector that produces regulatory filings.
#[async_trait]
pub trait FilingSource: Connector {
    /// Fetches the filings the provider holds for one company.
    async fn fetch_filings(&self, company: &CompanyRef) -> Result<FilingFetch>;
}
