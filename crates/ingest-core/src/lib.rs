#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quartzrow/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core types and connector traits for fundamentals ingestion.
//!
//! This crate provides the foundational abstractions shared by the
//! connectors, the store, and the orchestrator:
//!
//! - [`Ticker`](types::Ticker) / [`Cik`](types::Cik) - Company identifiers
//! - [`MetricObservation`](types::MetricObservation) - Canonical observation shape
//! - [`Period`](period::Period) - Calendar-quarter reporting periods
//! - [`MetricSource`](source::MetricSource) / [`FilingSource`](source::FilingSource) - Connector traits
//! - [`IngestError`](error::IngestError) - The shared error taxonomy

/// Error taxonomy for ingestion and reconciliation.
pub mod error;
/// Metric vocabulary and reporting period types.
pub mod metric;
/// Calendar-quarter reporting periods.
pub mod period;
/// Connector traits for external data providers.
pub mod source;
/// Core identifier and record types.
pub mod types;

// Re-export commonly used items at crate root
pub use error::{IngestError, Result};
pub use metric::{MetricType, MetricUnit, PeriodType};
pub use period::Period;
pub use source::{Connector, FetchOutcome, FilingFetch, FilingSource, MetricSource};
pub use types::{Cik, CompanyId, CompanyRef, MetricObservation, RawFiling, Ticker};
