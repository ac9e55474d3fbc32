//! The run summary: the orchestrator's output contract.
//!
//! Every unit of work — one (company, provider, period) fetch or one
//! filings pass — produces an [`ItemOutcome`]; a company's items fold into
//! a [`CompanyOutcome`]; the run's outcomes fold into a [`RunSummary`].
//! The summary is a set of outcomes, not a sequence: its counts and detail
//! lists are independent of the order companies finished in, and the
//! failure list carries enough context to drive a retry-only-the-failures
//! pass without re-touching successes.

use serde::Serialize;
use tracing::info;

use ingest_core::{Period, Ticker};

/// How one unit of work ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ItemDisposition {
    /// Observations were written.
    Upserted {
        /// Rows newly inserted.
        inserted: u64,
        /// Rows updated in place.
        updated: u64,
        /// Rows already identical.
        unchanged: u64,
    },
    /// The provider has nothing for this company/period; an expected gap.
    NoData,
    /// The provider's quota window is spent; re-run later.
    QuotaDeferred,
    /// The run was stopped before this work started.
    Stopped,
    /// A terminal failure (retries exhausted or a permanent error).
    Failed {
        /// Human-readable reason, for the failure list.
        reason: String,
    },
}

/// Outcome of one unit of work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    /// Provider the work targeted.
    pub provider: String,
    /// Reporting period, when the work was period-scoped (metrics);
    /// `None` for the filings pass.
    pub period: Option<Period>,
    /// How it ended.
    pub disposition: ItemDisposition,
}

/// Terminal state of one company's ingestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    /// Every unit of work succeeded or was an expected gap alongside data.
    Completed,
    /// At least one unit failed; the rest proceeded normally.
    PartiallyFailed,
    /// No provider had any data for this company.
    Skipped,
    /// Work was deferred by quota exhaustion or a stop request.
    Deferred,
}

/// All outcomes for one company.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompanyOutcome {
    /// The company, by universe ticker.
    pub ticker: Ticker,
    /// Per-unit outcomes.
    pub items: Vec<ItemOutcome>,
}

impl CompanyOutcome {
    /// Folds the item dispositions into the company's terminal status.
    #[must_use]
    pub fn status(&self) -> CompanyStatus {
        let mut any_failed = false;
        let mut any_deferred = false;
        let mut any_written = false;
        for item in &self.items {
            match item.disposition {
                ItemDisposition::Failed { .. } => any_failed = true,
                ItemDisposition::QuotaDeferred | ItemDisposition::Stopped => any_deferred = true,
                ItemDisposition::Upserted { .. } => any_written = true,
                ItemDisposition::NoData => {}
            }
        }
        if any_failed {
            CompanyStatus::PartiallyFailed
        } else if any_deferred {
            CompanyStatus::Deferred
        } else if any_written {
            CompanyStatus::Completed
        } else {
            CompanyStatus::Skipped
        }
    }
}

/// One entry in the summary's failure list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    /// Company the failure belongs to.
    pub ticker: Ticker,
    /// Provider that failed.
    pub provider: String,
    /// Period, when period-scoped.
    pub period: Option<Period>,
    /// Why it failed.
    pub reason: String,
}

/// One expected gap (provider had no data).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GapDetail {
    /// Company with the gap.
    pub ticker: Ticker,
    /// Provider without data.
    pub provider: String,
    /// Period, when period-scoped.
    pub period: Option<Period>,
}

/// One deferred unit of work (quota window spent, or run stopped).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeferralDetail {
    /// Company the deferral belongs to.
    pub ticker: Ticker,
    /// Provider the work targeted.
    pub provider: String,
    /// Period, when period-scoped.
    pub period: Option<Period>,
}

/// The structured report a run always ends with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Companies fully completed.
    pub completed: usize,
    /// Companies with at least one failure.
    pub partially_failed: usize,
    /// Companies with no data anywhere.
    pub skipped: usize,
    /// Companies with deferred work.
    pub deferred: usize,
    /// Metric rows inserted across the run.
    pub inserted: u64,
    /// Metric rows updated across the run.
    pub updated: u64,
    /// Metric rows already identical.
    pub unchanged: u64,
    /// Every terminal failure, for a retry-only-failures pass.
    pub failures: Vec<FailureDetail>,
    /// Every expected gap.
    pub gaps: Vec<GapDetail>,
    /// Every deferral; re-run once the quota window rolls over.
    pub deferrals: Vec<DeferralDetail>,
}

impl RunSummary {
    /// Folds company outcomes into the run summary.
    #[must_use]
    pub fn from_outcomes(outcomes: &[CompanyOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            match outcome.status() {
                CompanyStatus::Completed => summary.completed += 1,
                CompanyStatus::PartiallyFailed => summary.partially_failed += 1,
                CompanyStatus::Skipped => summary.skipped += 1,
                CompanyStatus::Deferred => summary.deferred += 1,
            }
            for item in &outcome.items {
                match &item.disposition {
                    ItemDisposition::Upserted {
                        inserted,
                        updated,
                        unchanged,
                    } => {
                        summary.inserted += inserted;
                        summary.updated += updated;
                        summary.unchanged += unchanged;
                    }
                    ItemDisposition::NoData => summary.gaps.push(GapDetail {
                        ticker: outcome.ticker.clone(),
                        provider: item.provider.clone(),
                        period: item.period,
                    }),
                    ItemDisposition::QuotaDeferred | ItemDisposition::Stopped => {
                        summary.deferrals.push(DeferralDetail {
                            ticker: outcome.ticker.clone(),
                            provider: item.provider.clone(),
                            period: item.period,
                        });
                    }
                    ItemDisposition::Failed { reason } => summary.failures.push(FailureDetail {
                        ticker: outcome.ticker.clone(),
                        provider: item.provider.clone(),
                        period: item.period,
                        reason: reason.clone(),
                    }),
                }
            }
            summary
        })
    }

    /// Logs the one-line overview callers watch for.
    pub fn log_overview(&self) {
        info!(
            completed = self.completed,
            partially_failed = self.partially_failed,
            skipped = self.skipped,
            deferred = self.deferred,
            inserted = self.inserted,
            updated = self.updated,
            unchanged = self.unchanged,
            failures = self.failures.len(),
            "ingestion run finished"
        );
    }
}
