#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quartzrow/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Finnhub connector for valuation metrics.
//!
//! Implements [`MetricSource`] over the
//! [Finnhub](https://finnhub.io/) basic-financials endpoint. The quarterly
//! series in the response carries one point per fiscal quarter; a fetch
//! selects the points whose date falls inside the requested period.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

use ingest_core::{
    CompanyRef, Connector, FetchOutcome, IngestError, MetricObservation, MetricSource, MetricType,
    MetricUnit, Period, PeriodType, Result,
};

/// Base URL for the Finnhub API.
const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Metrics this connector produces.
const METRIC_TYPES: &[MetricType] = &[MetricType::PeRatio, MetricType::Roe];

/// Which quarterly series keys map to which canonical metric.
const SERIES_KEYS: &[(&str, MetricType, MetricUnit)] = &[
    ("pe", MetricType::PeRatio, MetricUnit::Ratio),
    ("roe", MetricType::Roe, MetricUnit::Percent),
];

/// Finnhub connector.
#[derive(Clone)]
pub struct FinnhubConnector {
    client: Client,
    token: String,
}

impl fmt::Debug for FinnhubConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinnhubConnector")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl FinnhubConnector {
    /// Creates a new Finnhub connector with the given API token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
        }
    }

    /// Creates a new Finnhub connector with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, token: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
        }
    }

    async fn fetch_basic_financials(&self, ticker: &str) -> Result<FinnhubMetrics> {
        let url = format!(
            "{FINNHUB_BASE_URL}/stock/metric?symbol={ticker}&metric=all&token={}",
            self.token
        );
        tracing::debug!("Finnhub request: stock/metric symbol={ticker}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IngestError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(IngestError::RateLimited {
                provider: "finnhub".to_string(),
                retry_after: None,
            });
        }

        if !response.status().is_success() {
            return Err(IngestError::Http {
                provider: "finnhub".to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| IngestError::Parse(e.to_string()))
    }
}

impl Connector for FinnhubConnector {
    fn name(&self) -> &str {
        "Finnhub"
    }

    fn provider_id(&self) -> &str {
        "finnhub"
    }
}

#[async_trait]
impl MetricSource for FinnhubConnector {
    fn metric_types(&self) -> &[MetricType] {
        METRIC_TYPES
    }

    async fn fetch_metrics(&self, company: &CompanyRef, period: Period) -> Result<FetchOutcome> {
        // Finnhub addresses companies by ticker only
        let Some(ticker) = &company.ticker else {
            return Ok(FetchOutcome::NoData);
        };

        let metrics = match self.fetch_basic_financials(ticker.as_str()).await {
            Ok(m) => m,
            Err(IngestError::Http { status: 404, .. }) => return Ok(FetchOutcome::NoData),
            Err(e) => return Err(e),
        };

        // Finnhub answers unknown symbols with an empty payload
        let observations = observations_for(period, &metrics);
        if observations.is_empty() {
            return Ok(FetchOutcome::NoData);
        }
        Ok(FetchOutcome::Observations(observations))
    }
}

/// Selects the quarterly series points falling inside `period` and maps
/// them onto the canonical calendar-quarter end date.
fn observations_for(period: Period, metrics: &FinnhubMetrics) -> Vec<MetricObservation> {
    let date = period.end_date();
    let mut out = Vec::new();

    for (key, metric_type, unit) in SERIES_KEYS {
        let Some(points) = metrics.series.quarterly.get(*key) else {
            continue;
        };
        let value = points
            .iter()
            .find(|p| Period::from_date(p.period) == period)
            .and_then(|p| p.v);
        if let Some(value) = value {
            out.push(MetricObservation::new(
                *metric_type,
                date,
                PeriodType::Quarterly,
                value,
                *unit,
            ));
        }
    }

    out
}

/// Finnhub basic-financials response.
#[derive(Debug, Clone, Default, Deserialize)]
struct FinnhubMetrics {
    #[serde(default)]
    series: FinnhubSeries,
}

/// The `series` object: per-frequency maps of metric key to data points.
#[derive(Debug, Clone, Default, Deserialize)]
struct FinnhubSeries {
    #[serde(default)]
    quarterly: HashMap<String, Vec<FinnhubPoint>>,
}

/// One point in a metric series.
#[derive(Debug, Clone, Deserialize)]
struct FinnhubPoint {
    period: NaiveDate,
    /// Value; null when Finnhub has no figure for the quarter.
    v: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "metric": { "peTTM": 28.3 },
        "metricType": "all",
        "symbol": "AAPL",
        "series": {
            "quarterly": {
                "pe": [
                    { "period": "2024-03-30", "v": 26.4 },
                    { "period": "2023-12-30", "v": 29.1 }
                ],
                "roe": [
                    { "period": "2024-03-30", "v": 37.1 },
                    { "period": "2023-12-30", "v": null }
                ]
            }
        }
    }"#;

    #[test]
    fn parses_the_finnhub_series_shape() {
        let parsed: FinnhubMetrics = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(parsed.series.quarterly["pe"].len(), 2);
        assert_eq!(parsed.series.quarterly["roe"][1].v, None);
    }

    #[test]
    fn maps_series_points_onto_the_canonical_quarter_end() {
        let parsed: FinnhubMetrics = serde_json::from_str(SAMPLE).unwrap();
        let obs = observations_for(Period::new(2024, 1).unwrap(), &parsed);

        assert_eq!(obs.len(), 2);
        let pe = obs.iter().find(|o| o.metric_type == MetricType::PeRatio).unwrap();
        assert_eq!(pe.value, 26.4);
        assert_eq!(pe.metric_date, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        let roe = obs.iter().find(|o| o.metric_type == MetricType::Roe).unwrap();
        assert_eq!(roe.unit, MetricUnit::Percent);
    }

    #[test]
    fn null_points_are_skipped() {
        let parsed: FinnhubMetrics = serde_json::from_str(SAMPLE).unwrap();
        let obs = observations_for(Period::new(2023, 4).unwrap(), &parsed);

        // roe for 2023Q4 is null; only pe comes through
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].metric_type, MetricType::PeRatio);
    }

    #[test]
    fn empty_payload_maps_to_nothing() {
        let parsed: FinnhubMetrics = serde_json::from_str("{}").unwrap();
        assert!(observations_for(Period::new(2024, 1).unwrap(), &parsed).is_empty());
    }
}
