#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quartzrow/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Batch ingestion orchestrator for quarterly company fundamentals.
//!
//! # Features
//!
//! - `fmp` - Financial Modeling Prep connector (fundamentals)
//! - `finnhub` - Finnhub connector (valuation metrics)
//! - `edgar` - SEC EDGAR connector (regulatory filings)
//!
//! # Example
//!
//! ```rust,ignore
//! use ingest::{IngestRunner, MetricStore, RunConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ingest::Result<()> {
//!     let config = RunConfig::from_json_file("run.json")?;
//!     let store = Arc::new(MetricStore::new("fundamentals.db")?);
//!
//!     let runner = IngestRunner::new(Arc::clone(&store), config.quota_tracker())
//!         .with_fmp("api-key")
//!         .with_finnhub("token")
//!         .with_edgar("MyApp/1.0 (contact@example.com)");
//!
//!     let summary = runner.run(&config).await?;
//!     println!("{} completed, {} failed", summary.completed, summary.failures.len());
//!
//!     // Collapse duplicate companies accumulated across providers
//!     let report = store.merge_duplicates(&[])?;
//!     println!("{} filings re-parented", report.reparented_filings);
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use ingest_core::*;

// The target store and merge engine
pub use ingest_store::{
    CompanyLookup, FilingRecorded, MergeOverride, MergeReport, MetricStore, StoredCompany,
    StoredMetric, UpsertOutcome,
};

// Connectors
#[cfg(feature = "edgar")]
pub use ingest_edgar::EdgarConnector;
#[cfg(feature = "finnhub")]
pub use ingest_finnhub::FinnhubConnector;
#[cfg(feature = "fmp")]
pub use ingest_fmp::FmpConnector;

mod config;
mod quota;
mod retry;
mod runner;
mod summary;

pub use config::{QuotaConfig, RunConfig, UniverseEntry};
pub use quota::{QuotaLimit, QuotaTracker};
pub use retry::RetryPolicy;
pub use runner::{IngestRunner, StopHandle};
pub use summary::{
    CompanyOutcome, CompanyStatus, DeferralDetail, FailureDetail, GapDetail, ItemDisposition,
    ItemOutcome, RunSummary,
};
