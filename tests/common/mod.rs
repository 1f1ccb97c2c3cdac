// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use balance_ledger::application::{
    AccountService, LedgerConfig, RateError, RateProvider, StaticRates,
};
use tempfile::TempDir;

pub const PAGE_SIZE: u32 = 2;

/// Rate source that counts how often it is asked.
pub struct CountingRates {
    inner: StaticRates,
    calls: AtomicUsize,
}

impl CountingRates {
    pub fn new(inner: StaticRates) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateProvider for CountingRates {
    async fn rate(&self, base: &str, target: &str) -> Result<f64, RateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.rate(base, target).await
    }
}

/// Rate source whose network is always down.
pub struct UnreachableRates;

#[async_trait]
impl RateProvider for UnreachableRates {
    async fn rate(&self, _base: &str, _target: &str) -> Result<f64, RateError> {
        Err(RateError::Unreachable("connection refused".to_string()))
    }
}

pub fn test_config() -> LedgerConfig {
    LedgerConfig::default()
        .with_page_size(PAGE_SIZE)
        .with_base_currency("RUB")
        .with_lock_timeout(Duration::from_secs(10))
}

/// Default rates: 1 RUB = 0.5 USD, nothing else known.
pub fn test_rates() -> Arc<CountingRates> {
    Arc::new(CountingRates::new(
        StaticRates::new("RUB").with_rate("USD", 0.5),
    ))
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(AccountService, TempDir)> {
    test_service_with(test_config(), test_rates()).await
}

pub async fn test_service_with(
    config: LedgerConfig,
    rates: Arc<dyn RateProvider>,
) -> Result<(AccountService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = AccountService::init(db_path.to_str().unwrap(), config)
        .await?
        .with_rates(rates);
    Ok((service, temp_dir))
}

/// Sum of every entry in the ledger, read in one statement.
pub async fn ledger_total(service: &AccountService) -> Result<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(sum), 0) FROM transactions")
        .fetch_one(service.repository().pool())
        .await?;
    Ok(total)
}

/// Number of rows in the ledger.
pub async fn ledger_rows(service: &AccountService) -> Result<i64> {
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(service.repository().pool())
        .await?;
    Ok(rows)
}
