//! Error taxonomy for ingestion and reconciliation.
//!
//! This module defines [`IngestError`], which covers every failure class the
//! system distinguishes:
//!
//! - **transient** errors (network, timeout, 5xx, provider rate limits) are
//!   retried by the retry executor — see [`IngestError::is_transient`];
//! - **permanent** errors fail immediately and surface in the run summary;
//! - [`IngestError::RetriesExhausted`] marks a transient error that outlived
//!   its retry budget, distinguishable from a permanent "no data" outcome
//!   (which is not an error at all — connectors signal it as a fetch-outcome
//!   variant);
//! - [`IngestError::QuotaExhausted`] marks work deferred by the quota
//!   tracker, to be re-run in a later window rather than investigated;
//! - [`IngestError::MergeInvariant`] is fatal to a merge transaction only
//!   and carries the offending identifier pairs for manual review.

use thiserror::Error;

use crate::types::{Cik, CompanyId};

/// Errors that can occur during ingestion or entity reconciliation.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Network-level failure (connection refused, timeout, DNS, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status from a provider.
    #[error("HTTP {status} from {provider}")]
    Http {
        /// Provider that returned the status.
        provider: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Rate limit exceeded at the provider side (HTTP 429).
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// Error parsing a provider response or a stored value.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error interacting with the target store.
    #[error("Store error: {0}")]
    Store(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested connector is not configured.
    #[error("Connector not configured: {0}")]
    ConnectorNotConfigured(String),

    /// Error loading or validating the run configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// The local quota window for a provider is exhausted; defer, don't retry.
    #[error("Quota exhausted for {provider} in the current window")]
    QuotaExhausted {
        /// Provider whose window is spent.
        provider: String,
    },

    /// A transient error survived the full retry budget.
    #[error("{provider}: retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Provider the operation targeted.
        provider: String,
        /// Attempts made, including the first.
        attempts: u32,
        /// The final transient error.
        #[source]
        source: Box<IngestError>,
    },

    /// A merge-run invariant failed; the whole transaction was rolled back.
    #[error("Merge invariant violated: {reason} ({} offending pair(s))", pairs.len())]
    MergeInvariant {
        /// What check failed.
        reason: String,
        /// The (cik, company) pairs that need manual review.
        pairs: Vec<(Cik, CompanyId)>,
    },

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl IngestError {
    /// Whether the retry executor should retry this error.
    ///
    /// Network failures, server-side (5xx) statuses, and provider rate
    /// limits are transient. Client-side statuses, parse failures, quota
    /// exhaustion, and merge violations are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias using [`IngestError`].
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(IngestError::Network("reset".into()).is_transient());
        assert!(
            IngestError::RateLimited {
                provider: "fmp".into(),
                retry_after: None,
            }
            .is_transient()
        );
        assert!(
            IngestError::Http {
                provider: "fmp".into(),
                status: 503,
            }
            .is_transient()
        );
        assert!(
            !IngestError::Http {
                provider: "fmp".into(),
                status: 404,
            }
            .is_transient()
        );
        assert!(!IngestError::Parse("bad json".into()).is_transient());
        assert!(
            !IngestError::QuotaExhausted {
                provider: "fmp".into(),
            }
            .is_transient()
        );
    }

    #[test]
    fn retries_exhausted_is_terminal() {
        let err = IngestError::RetriesExhausted {
            provider: "fmp".into(),
            attempts: 3,
            source: Box::new(IngestError::Network("timeout".into())),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("3 attempts"));
    }
}
