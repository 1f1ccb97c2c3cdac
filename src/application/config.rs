use std::time::Duration;

use crate::storage::DEFAULT_LOCK_TIMEOUT;

pub const DEFAULT_BASE_CURRENCY: &str = "RUB";
pub const DEFAULT_RATES_URL: &str = "https://api.exchangerate.host/latest";
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Runtime settings of the ledger service.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Entries per history page.
    pub page_size: u32,
    /// Bound on waiting for an account lock or a busy store.
    pub lock_timeout: Duration,
    /// Currency the ledger amounts are kept in.
    pub base_currency: String,
    /// Endpoint of the currency rate lookup.
    pub rates_url: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
            rates_url: DEFAULT_RATES_URL.to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_base_currency(mut self, code: impl Into<String>) -> Self {
        self.base_currency = code.into().to_uppercase();
        self
    }

    pub fn with_rates_url(mut self, url: impl Into<String>) -> Self {
        self.rates_url = url.into();
        self
    }
}
