#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quartzrow/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Financial Modeling Prep (FMP) connector.
//!
//! Implements [`MetricSource`] over the
//! [Financial Modeling Prep](https://financialmodelingprep.com/) income
//! statement endpoint. One fetch covers a single company and reporting
//! period; earnings growth is computed against the same fiscal quarter a
//! year earlier, so each fetch requests enough trailing statements to find
//! both periods.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

use ingest_core::{
    CompanyRef, Connector, FetchOutcome, IngestError, MetricObservation, MetricSource, MetricType,
    MetricUnit, Period, PeriodType, Result,
};

/// Base URL for the FMP stable API.
const FMP_BASE_URL: &str = "https://financialmodelingprep.com/stable";

/// Metrics this connector produces.
const METRIC_TYPES: &[MetricType] = &[
    MetricType::Revenue,
    MetricType::GrossMargin,
    MetricType::OperatingMargin,
    MetricType::Eps,
    MetricType::EarningsGrowth,
];

/// Quarterly statements requested per fetch: the target quarter, the same
/// quarter a year earlier for the growth baseline, and slack for providers
/// that report late.
const STATEMENT_WINDOW: usize = 8;

/// Financial Modeling Prep connector.
#[derive(Clone)]
pub struct FmpConnector {
    client: Client,
    api_key: String,
}

impl fmt::Debug for FmpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmpConnector")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl FmpConnector {
    /// Creates a new FMP connector with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Creates a new FMP connector with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    /// Build a URL with the API key appended.
    fn url(&self, endpoint: &str) -> String {
        if endpoint.contains('?') {
            format!("{FMP_BASE_URL}/{endpoint}&apikey={}", self.api_key)
        } else {
            format!("{FMP_BASE_URL}/{endpoint}?apikey={}", self.api_key)
        }
    }

    /// Make a GET request and parse the JSON response.
    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);
        tracing::debug!("FMP request: {}", endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(IngestError::RateLimited {
                provider: "fmp".to_string(),
                retry_after: None,
            });
        }

        if !response.status().is_success() {
            return Err(IngestError::Http {
                provider: "fmp".to_string(),
                status: response.status().as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;

        // FMP reports some failures as a 200 with an error body
        if text.contains("\"Error Message\"") || text.contains("\"error\"") {
            return Err(IngestError::Network(text));
        }

        serde_json::from_str(&text).map_err(|e| IngestError::Parse(format!("{e}: {text}")))
    }

    async fn fetch_income_statements(&self, ticker: &str) -> Result<Vec<FmpIncomeStatement>> {
        let endpoint = format!(
            "income-statement?symbol={ticker}&period=quarter&limit={STATEMENT_WINDOW}"
        );
        self.get(&endpoint).await
    }
}

impl Connector for FmpConnector {
    fn name(&self) -> &str {
        "Financial Modeling Prep"
    }

    fn provider_id(&self) -> &str {
        "fmp"
    }
}

#[async_trait]
impl MetricSource for FmpConnector {
    fn metric_types(&self) -> &[MetricType] {
        METRIC_TYPES
    }

    async fn fetch_metrics(&self, company: &CompanyRef, period: Period) -> Result<FetchOutcome> {
        // FMP addresses companies by ticker only
        let Some(ticker) = &company.ticker else {
            return Ok(FetchOutcome::NoData);
        };

        let statements = match self.fetch_income_statements(ticker.as_str()).await {
            Ok(s) => s,
            Err(IngestError::Http { status: 404, .. }) => return Ok(FetchOutcome::NoData),
            Err(e) => return Err(e),
        };

        if statements.is_empty() {
            return Ok(FetchOutcome::NoData);
        }

        let observations = observations_for(period, &statements);
        if observations.is_empty() {
            return Ok(FetchOutcome::NoData);
        }
        Ok(FetchOutcome::Observations(observations))
    }
}

/// Maps the statements covering one reporting period (plus its
/// year-earlier baseline) into canonical observations.
///
/// Observations are dated by the canonical calendar-quarter end so every
/// provider lands on the same natural key, even when the issuer's fiscal
/// quarter ends a few days off the calendar boundary.
fn observations_for(period: Period, statements: &[FmpIncomeStatement]) -> Vec<MetricObservation> {
    let date = period.end_date();
    let mut out = Vec::new();

    let Some(current) = statement_for(period, statements) else {
        return out;
    };

    out.push(MetricObservation::new(
        MetricType::Revenue,
        date,
        PeriodType::Quarterly,
        current.revenue,
        MetricUnit::Usd,
    ));
    out.push(MetricObservation::new(
        MetricType::Eps,
        date,
        PeriodType::Quarterly,
        current.eps_diluted,
        MetricUnit::UsdPerShare,
    ));

    if current.revenue > 0.0 {
        out.push(MetricObservation::new(
            MetricType::GrossMargin,
            date,
            PeriodType::Quarterly,
            current.gross_profit / current.revenue,
            MetricUnit::Ratio,
        ));
        out.push(MetricObservation::new(
            MetricType::OperatingMargin,
            date,
            PeriodType::Quarterly,
            current.operating_income / current.revenue,
            MetricUnit::Ratio,
        ));
    }

    // Year-over-year earnings growth; the baseline quarter may be missing
    // or zero, in which case the metric is simply not produced.
    if let Some(baseline) = statement_for(period.year_earlier(), statements)
        && baseline.net_income != 0.0
    {
        out.push(MetricObservation::new(
            MetricType::EarningsGrowth,
            date,
            PeriodType::Quarterly,
            (current.net_income - baseline.net_income) / baseline.net_income.abs(),
            MetricUnit::Ratio,
        ));
    }

    out
}

fn statement_for(period: Period, statements: &[FmpIncomeStatement]) -> Option<&FmpIncomeStatement> {
    statements.iter().find(|s| {
        NaiveDate::parse_from_str(&s.date, "%Y-%m-%d")
            .map(|d| Period::from_date(d) == period)
            .unwrap_or(false)
    })
}

/// FMP Income Statement response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpIncomeStatement {
    date: String,
    #[allow(dead_code)]
    symbol: String,
    #[serde(default)]
    revenue: f64,
    #[serde(default)]
    gross_profit: f64,
    #[serde(default)]
    operating_income: f64,
    #[serde(default)]
    net_income: f64,
    #[serde(default)]
    eps_diluted: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(date: &str, revenue: f64, net_income: f64) -> FmpIncomeStatement {
        FmpIncomeStatement {
            date: date.into(),
            symbol: "AAPL".into(),
            revenue,
            gross_profit: revenue * 0.4,
            operating_income: revenue * 0.25,
            net_income,
            eps_diluted: 1.5,
        }
    }

    #[test]
    fn url_building_appends_the_key() {
        let connector = FmpConnector::new("test_key");
        assert_eq!(
            connector.url("income-statement?symbol=AAPL"),
            "https://financialmodelingprep.com/stable/income-statement?symbol=AAPL&apikey=test_key"
        );
        assert_eq!(
            connector.url("profile"),
            "https://financialmodelingprep.com/stable/profile?apikey=test_key"
        );
    }

    #[test]
    fn parses_the_fmp_income_statement_shape() {
        let json = r#"[{
            "date": "2024-03-30",
            "symbol": "AAPL",
            "revenue": 90753000000,
            "grossProfit": 42271000000,
            "operatingIncome": 27900000000,
            "netIncome": 23636000000,
            "epsDiluted": 1.53
        }]"#;
        let parsed: Vec<FmpIncomeStatement> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].revenue, 90_753_000_000.0);
        assert_eq!(parsed[0].eps_diluted, 1.53);
    }

    #[test]
    fn maps_one_period_to_canonical_observations() {
        let period = Period::new(2024, 1).unwrap();
        let statements = vec![
            statement("2024-03-30", 100_000.0, 20_000.0),
            statement("2023-04-01", 80_000.0, 16_000.0),
        ];

        let obs = observations_for(period, &statements);
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();

        let revenue = obs.iter().find(|o| o.metric_type == MetricType::Revenue).unwrap();
        assert_eq!(revenue.value, 100_000.0);
        assert_eq!(revenue.metric_date, date);

        let gm = obs.iter().find(|o| o.metric_type == MetricType::GrossMargin).unwrap();
        assert!((gm.value - 0.4).abs() < 1e-12);

        let growth = obs
            .iter()
            .find(|o| o.metric_type == MetricType::EarningsGrowth)
            .unwrap();
        assert!((growth.value - 0.25).abs() < 1e-12);
    }

    #[test]
    fn earnings_decline_yields_a_negative_growth_value() {
        let period = Period::new(2024, 1).unwrap();
        let statements = vec![
            statement("2024-03-30", 100_000.0, -5_000.0),
            statement("2023-04-01", 80_000.0, 10_000.0),
        ];

        let obs = observations_for(period, &statements);
        let growth = obs
            .iter()
            .find(|o| o.metric_type == MetricType::EarningsGrowth)
            .unwrap();
        assert!((growth.value - (-1.5)).abs() < 1e-12);
    }

    #[test]
    fn growth_is_omitted_without_a_baseline_quarter() {
        let period = Period::new(2024, 1).unwrap();
        let statements = vec![statement("2024-03-30", 100_000.0, 20_000.0)];

        let obs = observations_for(period, &statements);
        assert!(obs.iter().all(|o| o.metric_type != MetricType::EarningsGrowth));
        // The rest of the quarter's metrics still come through
        assert!(obs.iter().any(|o| o.metric_type == MetricType::Revenue));
    }

    #[test]
    fn margins_are_omitted_when_revenue_is_not_positive() {
        let period = Period::new(2024, 1).unwrap();
        let statements = vec![statement("2024-03-30", 0.0, 20_000.0)];

        let obs = observations_for(period, &statements);
        assert!(obs.iter().all(|o| o.metric_type != MetricType::GrossMargin));
        assert!(obs.iter().all(|o| o.metric_type != MetricType::OperatingMargin));
    }

    #[test]
    fn unmatched_period_maps_to_nothing() {
        let period = Period::new(2020, 1).unwrap();
        let statements = vec![statement("2024-03-30", 100_000.0, 20_000.0)];
        assert!(observations_for(period, &statements).is_empty());
    }
}
