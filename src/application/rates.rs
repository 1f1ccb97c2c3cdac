use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("Unknown currency symbol: {0}")]
    UnknownSymbol(String),

    #[error("Rate service unreachable: {0}")]
    Unreachable(String),
}

/// Source of currency conversion rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Multiplier converting an amount in `base` into `target`.
    async fn rate(&self, base: &str, target: &str) -> Result<f64, RateError>;
}

/// Rate lookup against an exchangerate.host-style `latest` endpoint:
/// `GET {url}?base=RUB&symbols=USD` answering `{"rates": {"USD": 0.0135}}`.
pub struct HttpRateProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpRateProvider {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("balance-ledger/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    rates: Option<HashMap<String, f64>>,
}

fn pick_rate(body: LatestRates, target: &str) -> Result<f64, RateError> {
    let rates = body
        .rates
        .ok_or_else(|| RateError::Unreachable("response carries no rates".to_string()))?;
    rates
        .get(target)
        .copied()
        .ok_or_else(|| RateError::UnknownSymbol(target.to_string()))
}

fn unreachable(err: reqwest::Error) -> RateError {
    RateError::Unreachable(err.to_string())
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn rate(&self, base: &str, target: &str) -> Result<f64, RateError> {
        debug!(base, target, "fetching currency rate");
        let body: LatestRates = self
            .client
            .get(&self.url)
            .query(&[("base", base), ("symbols", target)])
            .send()
            .await
            .map_err(unreachable)?
            .error_for_status()
            .map_err(unreachable)?
            .json()
            .await
            .map_err(unreachable)?;

        pick_rate(body, target)
    }
}

/// Fixed rate table, keyed by target code, relative to one base currency.
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    base: String,
    rates: HashMap<String, f64>,
}

impl StaticRates {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, target: impl Into<String>, rate: f64) -> Self {
        self.rates.insert(target.into(), rate);
        self
    }
}

#[async_trait]
impl RateProvider for StaticRates {
    async fn rate(&self, base: &str, target: &str) -> Result<f64, RateError> {
        if base != self.base {
            return Err(RateError::UnknownSymbol(base.to_string()));
        }
        self.rates
            .get(target)
            .copied()
            .ok_or_else(|| RateError::UnknownSymbol(target.to_string()))
    }
}
