//! The ingestion orchestrator.
//!
//! [`IngestRunner`] drives the company universe × connector × period grid:
//! every provider attempt passes the quota gate, runs under the retry
//! executor, and lands in the store through the idempotent upsert. Each
//! company moves through fetch → write → a terminal item disposition; one
//! company's failure never aborts the run, and the run always ends with a
//! [`RunSummary`].
//!
//! Companies are independent units of work and may run concurrently
//! (`buffer_unordered`); the quota tracker and the store are the only
//! shared mutable state, and both are lock-protected. A [`StopHandle`]
//! requests a graceful stop: in-flight companies finish (so no natural key
//! is left half-written and the summary stays consistent), and unstarted
//! companies surface as deferred.

use futures::{StreamExt, stream};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument};

use ingest_core::{
    CompanyRef, FetchOutcome, FilingFetch, FilingSource, IngestError, MetricSource, Period, Result,
};
use ingest_store::{MetricStore, UpsertOutcome};

use crate::config::{RunConfig, UniverseEntry};
use crate::quota::QuotaTracker;
use crate::retry::RetryPolicy;
use crate::summary::{CompanyOutcome, ItemDisposition, ItemOutcome, RunSummary};

/// Pseudo-provider recorded on items deferred by a stop request.
const STOP_PROVIDER: &str = "run";

/// Requests a graceful stop of a running ingestion.
#[derive(Clone, Debug)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Asks the runner to stop after the companies currently in flight.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Batch ingestion orchestrator.
pub struct IngestRunner {
    store: Arc<MetricStore>,
    quota: QuotaTracker,
    retry: RetryPolicy,
    metric_sources: Vec<Arc<dyn MetricSource>>,
    filing_sources: Vec<Arc<dyn FilingSource>>,
    stop: Arc<AtomicBool>,
}

impl fmt::Debug for IngestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestRunner")
            .field(
                "metric_sources",
                &self
                    .metric_sources
                    .iter()
                    .map(|s| s.provider_id())
                    .collect::<Vec<_>>(),
            )
            .field(
                "filing_sources",
                &self
                    .filing_sources
                    .iter()
                    .map(|s| s.provider_id())
                    .collect::<Vec<_>>(),
            )
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl IngestRunner {
    /// Creates a runner over a store with an injected quota tracker.
    #[must_use]
    pub fn new(store: Arc<MetricStore>, quota: QuotaTracker) -> Self {
        Self {
            store,
            quota,
            retry: RetryPolicy::default(),
            metric_sources: Vec::new(),
            filing_sources: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Overrides the default retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Registers a metric connector.
    pub fn register_metric_source(&mut self, source: Arc<dyn MetricSource>) {
        debug!(provider = source.provider_id(), "registering metric source");
        self.metric_sources.push(source);
    }

    /// Registers a filings connector.
    pub fn register_filing_source(&mut self, source: Arc<dyn FilingSource>) {
        debug!(provider = source.provider_id(), "registering filing source");
        self.filing_sources.push(source);
    }

    /// Adds the Financial Modeling Prep connector.
    #[cfg(feature = "fmp")]
    #[must_use]
    pub fn with_fmp(mut self, api_key: &str) -> Self {
        self.register_metric_source(Arc::new(ingest_fmp::FmpConnector::new(api_key)));
        self
    }

    /// Adds the Finnhub connector.
    #[cfg(feature = "finnhub")]
    #[must_use]
    pub fn with_finnhub(mut self, token: &str) -> Self {
        self.register_metric_source(Arc::new(ingest_finnhub::FinnhubConnector::new(token)));
        self
    }

    /// Adds the SEC EDGAR connector.
    #[cfg(feature = "edgar")]
    #[must_use]
    pub fn with_edgar(mut self, user_agent: &str) -> Self {
        self.register_filing_source(Arc::new(ingest_edgar::EdgarConnector::new(user_agent)));
        self
    }

    /// A handle the caller can use to request a graceful stop.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Runs one ingestion pass over the configured universe.
    ///
    /// Always produces a summary, even when every company failed; the only
    /// errors returned here are configuration errors detected before any
    /// work starts.
    #[instrument(skip(self, config), fields(companies = config.universe.len()))]
    pub async fn run(&self, config: &RunConfig) -> Result<RunSummary> {
        config.validate()?;
        let periods = config.periods();
        info!(
            companies = config.universe.len(),
            periods = periods.len(),
            metric_sources = self.metric_sources.len(),
            filing_sources = self.filing_sources.len(),
            "starting ingestion run"
        );

        let outcomes: Vec<CompanyOutcome> = stream::iter(
            config
                .universe
                .iter()
                .map(|entry| self.ingest_company(entry, &periods)),
        )
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

        let summary = RunSummary::from_outcomes(&outcomes);
        summary.log_overview();
        Ok(summary)
    }

    /// Ingests one company: every (metric source × period), then filings.
    async fn ingest_company(&self, entry: &UniverseEntry, periods: &[Period]) -> CompanyOutcome {
        // Graceful stop: companies not yet started are deferred, never
        // half-processed.
        if self.stop.load(Ordering::Relaxed) {
            return CompanyOutcome {
                ticker: entry.ticker.clone(),
                items: vec![ItemOutcome {
                    provider: STOP_PROVIDER.to_string(),
                    period: None,
                    disposition: ItemDisposition::Stopped,
                }],
            };
        }

        let company = match self.store.ensure_company(
            &entry.ticker,
            &entry.name,
            entry.sector.as_deref(),
            entry.category.as_deref(),
        ) {
            Ok(company) => company,
            Err(e) => {
                return CompanyOutcome {
                    ticker: entry.ticker.clone(),
                    items: vec![ItemOutcome {
                        provider: "store".to_string(),
                        period: None,
                        disposition: ItemDisposition::Failed {
                            reason: e.to_string(),
                        },
                    }],
                };
            }
        };
        let company_ref = company.to_ref();

        let mut items = Vec::new();
        for source in &self.metric_sources {
            for &period in periods {
                items.push(
                    self.metrics_item(source.as_ref(), &company_ref, period)
                        .await,
                );
            }
        }
        for source in &self.filing_sources {
            items.push(self.filings_item(source.as_ref(), &company_ref).await);
        }

        CompanyOutcome {
            ticker: entry.ticker.clone(),
            items,
        }
    }

    /// One (company, provider, period) fetch-and-write.
    async fn metrics_item(
        &self,
        source: &dyn MetricSource,
        company: &CompanyRef,
        period: Period,
    ) -> ItemOutcome {
        let provider = source.provider_id();
        let result = self
            .retry
            .execute(provider, || async {
                // Every attempt, retries included, spends quota
                if !self.quota.reserve(provider) {
                    return Err(IngestError::QuotaExhausted {
                        provider: provider.to_string(),
                    });
                }
                source.fetch_metrics(company, period).await
            })
            .await;

        let disposition = match result {
            Ok(FetchOutcome::NoData) => ItemDisposition::NoData,
            Ok(FetchOutcome::Observations(observations)) => {
                self.write_observations(company, provider, &observations)
            }
            Err(IngestError::QuotaExhausted { .. }) => ItemDisposition::QuotaDeferred,
            Err(e) => ItemDisposition::Failed {
                reason: e.to_string(),
            },
        };

        ItemOutcome {
            provider: provider.to_string(),
            period: Some(period),
            disposition,
        }
    }

    fn write_observations(
        &self,
        company: &CompanyRef,
        provider: &str,
        observations: &[ingest_core::MetricObservation],
    ) -> ItemDisposition {
        let (mut inserted, mut updated, mut unchanged) = (0, 0, 0);
        for observation in observations {
            match self.store.upsert_metric(company.id, observation, provider) {
                Ok(UpsertOutcome::Inserted) => inserted += 1,
                Ok(UpsertOutcome::Updated) => updated += 1,
                Ok(UpsertOutcome::Unchanged) => unchanged += 1,
                Err(e) => {
                    return ItemDisposition::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }
        ItemDisposition::Upserted {
            inserted,
            updated,
            unchanged,
        }
    }

    /// One (company, filings provider) pass.
    async fn filings_item(&self, source: &dyn FilingSource, company: &CompanyRef) -> ItemOutcome {
        let provider = source.provider_id();
        let result = self
            .retry
            .execute(provider, || async {
                if !self.quota.reserve(provider) {
                    return Err(IngestError::QuotaExhausted {
                        provider: provider.to_string(),
                    });
                }
                source.fetch_filings(company).await
            })
            .await;

        let disposition = match result {
            Ok(FilingFetch::NoData) => ItemDisposition::NoData,
            Ok(FilingFetch::Filings { cik, filings }) => {
                // A successful resolution for a ticker-keyed company
                // confirms the ticker↔CIK association the merge engine
                // builds its identifier map from.
                if company.ticker.is_some()
                    && let Err(e) = self.store.confirm_cik(company.id, &cik)
                {
                    return ItemOutcome {
                        provider: provider.to_string(),
                        period: None,
                        disposition: ItemDisposition::Failed {
                            reason: e.to_string(),
                        },
                    };
                }

                let (mut inserted, mut unchanged) = (0, 0);
                let mut failed = None;
                for filing in &filings {
                    match self.store.record_filing(&cik, filing) {
                        Ok(recorded) if recorded.inserted => inserted += 1,
                        Ok(_) => unchanged += 1,
                        Err(e) => {
                            failed = Some(e.to_string());
                            break;
                        }
                    }
                }
                match failed {
                    Some(reason) => ItemDisposition::Failed { reason },
                    None => ItemDisposition::Upserted {
                        inserted,
                        updated: 0,
                        unchanged,
                    },
                }
            }
            Err(IngestError::QuotaExhausted { .. }) => ItemDisposition::QuotaDeferred,
            Err(e) => ItemDisposition::Failed {
                reason: e.to_string(),
            },
        };

        ItemOutcome {
            provider: provider.to_string(),
            period: None,
            disposition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ingest_core::{
        Cik, Connector, MetricObservation, MetricType, MetricUnit, PeriodType, RawFiling, Ticker,
    };
    use ingest_store::{CompanyLookup, MergeOverride};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    fn config(tickers: &[&str]) -> RunConfig {
        RunConfig {
            universe: tickers
                .iter()
                .map(|t| UniverseEntry {
                    ticker: Ticker::new(*t),
                    name: format!("{t} Inc."),
                    sector: None,
                    category: None,
                })
                .collect(),
            start: "2024Q1".parse().unwrap(),
            end: "2024Q1".parse().unwrap(),
            quotas: Default::default(),
            concurrency: 1,
        }
    }

    /// Metric source with scripted behavior per ticker.
    #[derive(Debug)]
    struct ScriptedSource {
        provider: &'static str,
        calls: AtomicU32,
        fail_ticker: Option<&'static str>,
        no_data: bool,
    }

    impl ScriptedSource {
        fn ok(provider: &'static str) -> Self {
            Self {
                provider,
                calls: AtomicU32::new(0),
                fail_ticker: None,
                no_data: false,
            }
        }

        fn failing_for(provider: &'static str, ticker: &'static str) -> Self {
            Self {
                fail_ticker: Some(ticker),
                ..Self::ok(provider)
            }
        }

        fn empty(provider: &'static str) -> Self {
            Self {
                no_data: true,
                ..Self::ok(provider)
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    impl Connector for ScriptedSource {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn provider_id(&self) -> &str {
            self.provider
        }
    }

    #[async_trait]
    impl MetricSource for ScriptedSource {
        fn metric_types(&self) -> &[MetricType] {
            &[MetricType::Revenue]
        }

        async fn fetch_metrics(
            &self,
            company: &CompanyRef,
            period: Period,
        ) -> ingest_core::Result<FetchOutcome> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if let (Some(bad), Some(ticker)) = (self.fail_ticker, &company.ticker)
                && ticker.as_str() == bad
            {
                return Err(IngestError::Network("connection reset".into()));
            }
            if self.no_data {
                return Ok(FetchOutcome::NoData);
            }
            Ok(FetchOutcome::Observations(vec![MetricObservation::new(
                MetricType::Revenue,
                period.end_date(),
                PeriodType::Quarterly,
                100_000.0,
                MetricUnit::Usd,
            )]))
        }
    }

    /// Filing source that always reports the same CIK and accessions.
    #[derive(Debug)]
    struct ScriptedFilingSource {
        cik: &'static str,
        accessions: Vec<&'static str>,
    }

    impl Connector for ScriptedFilingSource {
        fn name(&self) -> &str {
            "Scripted filings"
        }

        fn provider_id(&self) -> &str {
            "filings"
        }
    }

    #[async_trait]
    impl FilingSource for ScriptedFilingSource {
        async fn fetch_filings(&self, _company: &CompanyRef) -> ingest_core::Result<FilingFetch> {
            Ok(FilingFetch::Filings {
                cik: Cik::new(self.cik),
                filings: self
                    .accessions
                    .iter()
                    .map(|acc| RawFiling {
                        filing_type: "10-Q".into(),
                        filing_date: chrono::NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                        accession_no: (*acc).to_string(),
                    })
                    .collect(),
            })
        }
    }

    /// Source that requests a stop as a side effect of its first fetch.
    #[derive(Debug)]
    struct StoppingSource {
        inner: ScriptedSource,
        handle: StopHandle,
    }

    impl Connector for StoppingSource {
        fn name(&self) -> &str {
            "Stopping"
        }

        fn provider_id(&self) -> &str {
            self.inner.provider
        }
    }

    #[async_trait]
    impl MetricSource for StoppingSource {
        fn metric_types(&self) -> &[MetricType] {
            self.inner.metric_types()
        }

        async fn fetch_metrics(
            &self,
            company: &CompanyRef,
            period: Period,
        ) -> ingest_core::Result<FetchOutcome> {
            self.handle.stop();
            self.inner.fetch_metrics(company, period).await
        }
    }

    #[tokio::test]
    async fn one_failing_company_never_affects_the_others() {
        let store = Arc::new(MetricStore::in_memory().unwrap());
        let source = Arc::new(ScriptedSource::failing_for("scripted", "MSFT"));
        let mut runner =
            IngestRunner::new(Arc::clone(&store), QuotaTracker::new()).with_retry_policy(fast_retry());
        runner.register_metric_source(source);

        let summary = runner.run(&config(&["AAPL", "MSFT", "ORCL"])).await.unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.partially_failed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].ticker, Ticker::new("MSFT"));
        assert_eq!(summary.failures[0].provider, "scripted");
        assert_eq!(summary.inserted, 2);

        // The failing company's neighbours are fully stored
        for ticker in ["AAPL", "ORCL"] {
            let company = match store.lookup_by_ticker(&Ticker::new(ticker)).unwrap() {
                CompanyLookup::Found(c) => c,
                other => panic!("expected company, got {other:?}"),
            };
            assert_eq!(store.metric_count(company.id).unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn transient_failures_surface_as_retries_exhausted() {
        let store = Arc::new(MetricStore::in_memory().unwrap());
        let source = Arc::new(ScriptedSource::failing_for("scripted", "MSFT"));
        let mut runner = IngestRunner::new(store, QuotaTracker::new()).with_retry_policy(fast_retry());
        runner.register_metric_source(source.clone());

        let summary = runner.run(&config(&["MSFT"])).await.unwrap();

        // 3 attempts for the one failing (company, period)
        assert_eq!(source.call_count(), 3);
        assert!(summary.failures[0].reason.contains("retries exhausted"));
    }

    #[tokio::test]
    async fn rerunning_the_same_input_changes_nothing() {
        let store = Arc::new(MetricStore::in_memory().unwrap());
        let mut runner =
            IngestRunner::new(Arc::clone(&store), QuotaTracker::new()).with_retry_policy(fast_retry());
        runner.register_metric_source(Arc::new(ScriptedSource::ok("scripted")));

        let first = runner.run(&config(&["AAPL", "MSFT"])).await.unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.unchanged, 0);

        let second = runner.run(&config(&["AAPL", "MSFT"])).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.completed, 2);
    }

    #[tokio::test]
    async fn quota_caps_provider_calls_regardless_of_universe_size() {
        let store = Arc::new(MetricStore::in_memory().unwrap());
        let quota = QuotaTracker::new().with_limit("scripted", 3, Duration::from_secs(60));
        let source = Arc::new(ScriptedSource::ok("scripted"));
        let mut runner = IngestRunner::new(store, quota).with_retry_policy(fast_retry());
        runner.register_metric_source(source.clone());

        let summary = runner
            .run(&config(&["AAPL", "MSFT", "ORCL", "NVDA", "AMZN"]))
            .await
            .unwrap();

        assert_eq!(source.call_count(), 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.deferred, 2);
        assert_eq!(summary.deferrals.len(), 2);
        // Deferrals are distinguishable from failures
        assert!(summary.failures.is_empty());
    }

    #[tokio::test]
    async fn companies_without_data_are_skipped_not_failed() {
        let store = Arc::new(MetricStore::in_memory().unwrap());
        let mut runner = IngestRunner::new(store, QuotaTracker::new()).with_retry_policy(fast_retry());
        runner.register_metric_source(Arc::new(ScriptedSource::empty("scripted")));

        let summary = runner.run(&config(&["AAPL", "MSFT"])).await.unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.gaps.len(), 2);
        assert!(summary.failures.is_empty());
    }

    #[tokio::test]
    async fn filings_confirm_the_cik_and_attach_idempotently() {
        let store = Arc::new(MetricStore::in_memory().unwrap());
        let mut runner =
            IngestRunner::new(Arc::clone(&store), QuotaTracker::new()).with_retry_policy(fast_retry());
        runner.register_filing_source(Arc::new(ScriptedFilingSource {
            cik: "320193",
            accessions: vec!["acc-1", "acc-2"],
        }));

        let cfg = config(&["AAPL"]);
        runner.run(&cfg).await.unwrap();

        let company = match store.lookup_by_ticker(&Ticker::new("AAPL")).unwrap() {
            CompanyLookup::Found(c) => c,
            other => panic!("expected company, got {other:?}"),
        };
        assert_eq!(company.cik, Some(Cik::new("320193")));
        assert_eq!(store.filing_count(company.id).unwrap(), 2);

        // Re-ingesting the same filings adds nothing
        let second = runner.run(&cfg).await.unwrap();
        assert_eq!(store.filing_count(company.id).unwrap(), 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.unchanged, 2);
    }

    /// The full duplicate lifecycle: a historical CIK shows up in filings,
    /// creates a placeholder, and a merge with an operator override hands
    /// everything back to the canonical company.
    #[tokio::test]
    async fn historical_cik_round_trips_through_placeholder_and_merge() {
        let store = Arc::new(MetricStore::in_memory().unwrap());
        let mut runner =
            IngestRunner::new(Arc::clone(&store), QuotaTracker::new()).with_retry_policy(fast_retry());
        runner.register_filing_source(Arc::new(ScriptedFilingSource {
            cik: "1400897",
            accessions: vec!["acc-current"],
        }));

        let cfg = config(&["TPC"]);
        runner.run(&cfg).await.unwrap();
        let company = match store.lookup_by_ticker(&Ticker::new("TPC")).unwrap() {
            CompanyLookup::Found(c) => c,
            other => panic!("expected company, got {other:?}"),
        };
        assert_eq!(company.cik, Some(Cik::new("1400897")));

        // A filing under the issuer's pre-merger CIK arrives; the store
        // knows nothing about it, so a placeholder appears.
        let old_cik = Cik::new("77543");
        store
            .record_filing(
                &old_cik,
                &RawFiling {
                    filing_type: "10-K".into(),
                    filing_date: chrono::NaiveDate::from_ymd_opt(2007, 3, 1).unwrap(),
                    accession_no: "acc-historical".into(),
                },
            )
            .unwrap();
        assert!(matches!(
            store.lookup_by_cik(&old_cik).unwrap(),
            CompanyLookup::FoundPlaceholder(_)
        ));

        let report = store
            .merge_duplicates(&[MergeOverride {
                ticker: Ticker::new("TPC"),
                cik: old_cik.clone(),
            }])
            .unwrap();

        assert_eq!(report.reparented_filings, 1);
        assert_eq!(report.deleted_placeholders, 1);
        assert_eq!(store.filing_count(company.id).unwrap(), 2);
        assert_eq!(store.lookup_by_cik(&old_cik).unwrap(), CompanyLookup::NotFound);
    }

    #[tokio::test]
    async fn stop_defers_companies_that_have_not_started() {
        let store = Arc::new(MetricStore::in_memory().unwrap());
        let mut runner =
            IngestRunner::new(Arc::clone(&store), QuotaTracker::new()).with_retry_policy(fast_retry());
        let handle = runner.stop_handle();
        runner.register_metric_source(Arc::new(StoppingSource {
            inner: ScriptedSource::ok("scripted"),
            handle: handle.clone(),
        }));

        // Sequential run: the first company triggers the stop mid-fetch but
        // still finishes; the second never starts.
        let summary = runner.run(&config(&["AAPL", "MSFT"])).await.unwrap();

        assert!(handle.is_stopped());
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.deferred, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(
            store.lookup_by_ticker(&Ticker::new("MSFT")).unwrap(),
            CompanyLookup::NotFound
        );
    }

    #[tokio::test]
    async fn a_stopped_run_still_summarizes_everything() {
        let store = Arc::new(MetricStore::in_memory().unwrap());
        let runner = IngestRunner::new(store, QuotaTracker::new());
        runner.stop_handle().stop();

        let summary = runner.run(&config(&["AAPL", "MSFT", "ORCL"])).await.unwrap();
        assert_eq!(summary.deferred, 3);
        assert_eq!(summary.deferrals.len(), 3);
        assert_eq!(summary.completed, 0);
    }
}
