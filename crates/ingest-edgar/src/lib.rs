#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quartzrow/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR connector for regulatory filings.
//!
//! Implements [`FilingSource`] over two SEC endpoints:
//!
//! - `company_tickers.json` for ticker → CIK resolution
//! - `submissions/CIK{n}.json` for the filings index
//!
//! The filer CIK always travels back with the filings, because the store
//! may not have confirmed the association yet — that path is what creates
//! placeholder companies for the merge engine to collapse later.
//!
//! # Example
//!
//! ```no_run
//! use ingest_edgar::EdgarConnector;
//! use ingest_core::{CompanyRef, CompanyId, FilingFetch, FilingSource, Ticker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = EdgarConnector::new("MyApp/1.0 (contact@example.com)");
//!     let company = CompanyRef::from_ticker(CompanyId(1), Ticker::new("AAPL"), "Apple Inc.");
//!
//!     if let FilingFetch::Filings { cik, filings } = connector.fetch_filings(&company).await? {
//!         println!("{} filings for CIK {cik}", filings.len());
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

use ingest_core::{
    Cik, CompanyRef, Connector, FilingFetch, FilingSource, IngestError, RawFiling, Result,
};

/// SEC EDGAR API base URL
const EDGAR_BASE_URL: &str = "https://data.sec.gov";

/// SEC company tickers URL
const COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// Default rate limit: 10 requests per second (SEC requirement)
const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(100);

/// Interval limiter so we never exceed the SEC's courtesy rate.
///
/// This pacing is internal provider politeness; the orchestrator's quota
/// tracker budgets calls per window independently.
#[derive(Debug)]
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// SEC EDGAR connector.
///
/// The SEC requires an identifying user agent of the form
/// "AppName/Version (contact@email.com)".
#[derive(Debug)]
pub struct EdgarConnector {
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl EdgarConnector {
    /// Creates a new EDGAR connector with the specified user agent.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be constructed, which only happens
    /// with an invalid TLS/runtime setup.
    #[must_use]
    pub fn new(user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self::with_client(client)
    }

    /// Creates a new EDGAR connector with a custom HTTP client.
    ///
    /// The client must already carry the SEC-required user agent.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(DEFAULT_RATE_LIMIT))),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.rate_limiter.lock().await.wait().await;

        debug!("EDGAR request: {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(IngestError::RateLimited {
                provider: "edgar".to_string(),
                retry_after: None,
            });
        }

        if !response.status().is_success() {
            return Err(IngestError::Http {
                provider: "edgar".to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| IngestError::Parse(e.to_string()))
    }

    /// Looks up a company's CIK from its ticker symbol.
    ///
    /// Returns `None` when the ticker is not in the SEC index.
    pub async fn resolve_cik(&self, ticker: &str) -> Result<Option<Cik>> {
        if ticker.is_empty() {
            return Err(IngestError::InvalidParameter("Empty ticker".to_string()));
        }
        let ticker_upper = ticker.to_uppercase();

        let data: HashMap<String, CompanyTickerInfo> = self.get(COMPANY_TICKERS_URL).await?;

        for company in data.values() {
            if company.ticker.to_uppercase() == ticker_upper {
                let cik = Cik::from(company.cik_str);
                debug!("Resolved CIK {cik} for ticker {ticker}");
                return Ok(Some(cik));
            }
        }
        Ok(None)
    }

    async fn fetch_submissions(&self, cik: &Cik) -> Result<CompanySubmissions> {
        let url = format!("{EDGAR_BASE_URL}/submissions/CIK{}.json", cik.as_str());
        self.get(&url).await
    }
}

impl Connector for EdgarConnector {
    fn name(&self) -> &str {
        "SEC EDGAR"
    }

    fn provider_id(&self) -> &str {
        "edgar"
    }
}

#[async_trait]
impl FilingSource for EdgarConnector {
    async fn fetch_filings(&self, company: &CompanyRef) -> Result<FilingFetch> {
        // Prefer a confirmed CIK; fall back to resolving the ticker.
        let cik = match &company.cik {
            Some(cik) => cik.clone(),
            None => {
                let Some(ticker) = &company.ticker else {
                    return Ok(FilingFetch::NoData);
                };
                match self.resolve_cik(ticker.as_str()).await? {
                    Some(cik) => cik,
                    None => return Ok(FilingFetch::NoData),
                }
            }
        };

        let submissions = match self.fetch_submissions(&cik).await {
            Ok(s) => s,
            Err(IngestError::Http { status: 404, .. }) => return Ok(FilingFetch::NoData),
            Err(e) => return Err(e),
        };

        let filings = submissions.filings.recent.into_filings();
        debug!(count = filings.len(), "EDGAR filings for CIK {cik}");
        Ok(FilingFetch::Filings { cik, filings })
    }
}

// =============================================================================
// SEC API Response Types
// =============================================================================

/// Company ticker information from SEC JSON.
#[derive(Debug, Deserialize)]
struct CompanyTickerInfo {
    /// CIK as a number (SEC returns this as an integer)
    cik_str: u64,
    /// Ticker symbol
    ticker: String,
    /// Company name
    #[allow(dead_code)]
    title: String,
}

/// Company submissions/filings metadata.
#[derive(Debug, Deserialize)]
struct CompanySubmissions {
    filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

/// The filings index is column-oriented: parallel arrays indexed together.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    filing_date: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
}

impl RecentFilings {
    /// Zips the parallel columns into filing records, skipping rows with
    /// unparseable dates.
    fn into_filings(self) -> Vec<RawFiling> {
        self.accession_number
            .into_iter()
            .zip(self.filing_date)
            .zip(self.form)
            .filter_map(|((accession_no, date), form)| {
                let filing_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()?;
                Some(RawFiling {
                    filing_type: form,
                    filing_date,
                    accession_no,
                })
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
