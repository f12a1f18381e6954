//! UN Comtrade API client
//!
//! Issues the fixed-shape queries the tariff pages use (reporter Japan,
//! imports, annual, HS classification) and validates the duck-shaped
//! response records into typed observations at the boundary. Malformed
//! rows are skipped with a warning instead of flowing into arithmetic.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, TradeDataError};
use crate::model::Observation;

/// Which partners a query covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerScope {
    All,
    Codes(Vec<u32>),
}

impl PartnerScope {
    fn param(&self) -> String {
        match self {
            PartnerScope::All => "all".to_string(),
            PartnerScope::Codes(codes) => codes
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Which periods a query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodScope {
    All,
    /// Most recent period only (`ps=now`)
    Latest,
}

impl PeriodScope {
    fn param(&self) -> &'static str {
        match self {
            PeriodScope::All => "all",
            PeriodScope::Latest => "now",
        }
    }
}

/// One remote request: a commodity code plus partner/period scopes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeQuery {
    pub hs6: String,
    pub partners: PartnerScope,
    pub periods: PeriodScope,
}

/// Async fetch seam so the loader can run against a scripted source in
/// tests. The HTTP request itself is never aborted; callers discard
/// stale results on arrival.
#[async_trait]
pub trait TradeFetcher: Send + Sync {
    async fn fetch(&self, query: &TradeQuery) -> Result<Vec<Observation>>;
}

/// `period` arrives as a number or a string depending on the endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PeriodField {
    Num(i64),
    Text(String),
}

impl PeriodField {
    fn into_string(self) -> String {
        match self {
            PeriodField::Num(n) => n.to_string(),
            PeriodField::Text(s) => s,
        }
    }
}

/// Raw record as returned by the API, all fields optional
#[derive(Debug, Clone, Deserialize)]
struct RawObservation {
    #[serde(rename = "ptCode")]
    pt_code: Option<i64>,
    #[serde(rename = "ptTitle")]
    pt_title: Option<String>,
    period: Option<PeriodField>,
    #[serde(rename = "TradeValue")]
    trade_value: Option<Decimal>,
}

impl RawObservation {
    fn validate(self) -> Result<Observation> {
        let code = self
            .pt_code
            .and_then(|c| u32::try_from(c).ok())
            .ok_or_else(|| TradeDataError::MalformedRecord("missing or invalid ptCode".into()))?;
        let name = match self.pt_title {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(TradeDataError::MalformedRecord("missing ptTitle".into())),
        };
        let period = match self.period.map(PeriodField::into_string) {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err(TradeDataError::MalformedRecord("missing period".into())),
        };
        let value = self
            .trade_value
            .filter(|v| *v >= Decimal::ZERO)
            .ok_or_else(|| {
                TradeDataError::MalformedRecord("missing or negative TradeValue".into())
            })?;

        Ok(Observation::new(code, name, period, value))
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    dataset: Vec<RawObservation>,
}

/// HTTP client for the Comtrade `get` endpoint
pub struct ComtradeClient {
    http: Client,
    endpoint: String,
    reporter: u32,
    flow: u32,
    frequency: String,
}

impl ComtradeClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.api_endpoint.clone(),
            reporter: config.reporter,
            flow: config.flow,
            frequency: config.frequency.clone(),
        }
    }

    /// Query-string pairs for one request, fixed parameters included
    fn query_params(&self, query: &TradeQuery) -> Vec<(&'static str, String)> {
        vec![
            ("r", self.reporter.to_string()),
            ("rg", self.flow.to_string()),
            ("p", query.partners.param()),
            ("freq", self.frequency.clone()),
            ("ps", query.periods.param().to_string()),
            ("px", "HS".to_string()),
            ("cc", query.hs6.clone()),
        ]
    }
}

#[async_trait]
impl TradeFetcher for ComtradeClient {
    async fn fetch(&self, query: &TradeQuery) -> Result<Vec<Observation>> {
        let response: ApiResponse = self
            .http
            .get(&self.endpoint)
            .query(&self.query_params(query))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let total = response.dataset.len();
        let mut observations = Vec::with_capacity(total);
        for raw in response.dataset {
            match raw.validate() {
                Ok(obs) => observations.push(obs),
                Err(e) => warn!(hs6 = %query.hs6, error = %e, "dropping malformed record"),
            }
        }
        debug!(
            hs6 = %query.hs6,
            received = total,
            kept = observations.len(),
            "trade API response"
        );

        Ok(observations)
    }
}
