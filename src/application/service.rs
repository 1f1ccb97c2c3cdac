use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    cents_to_decimal, transfer_description, AccountId, Cents, DateRange, EntryPage, HistoryQuery,
    LedgerEntry, NewEntry, SortKey, CENTS_SCALE,
};
use crate::storage::Repository;

use super::{HttpRateProvider, LedgerConfig, LedgerError, RateError, RateProvider};

/// Account operations over the ledger.
/// This is the primary interface for any client (CLI, API, background jobs).
pub struct AccountService {
    repo: Repository,
    rates: Arc<dyn RateProvider>,
    config: LedgerConfig,
}

/// Both entries written by a transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

/// Balance and activity of one account.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub account: AccountId,
    pub balance: Cents,
    pub entry_count: i64,
}

impl AccountService {
    pub fn new(repo: Repository, rates: Arc<dyn RateProvider>, config: LedgerConfig) -> Self {
        Self {
            repo,
            rates,
            config,
        }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, config: LedgerConfig) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url, config.lock_timeout).await?;
        let rates = Arc::new(HttpRateProvider::new(config.rates_url.clone())?);
        Ok(Self::new(repo, rates, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: LedgerConfig) -> Result<Self, LedgerError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url, config.lock_timeout).await?;
        let rates = Arc::new(HttpRateProvider::new(config.rates_url.clone())?);
        Ok(Self::new(repo, rates, config))
    }

    /// Replace the currency rate source.
    pub fn with_rates(mut self, rates: Arc<dyn RateProvider>) -> Self {
        self.rates = rates;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Writes
    // ========================

    /// Record a deposit (positive amount) or withdrawal (negative amount).
    #[instrument(skip(self, description))]
    pub async fn record(
        &self,
        account: AccountId,
        amount: Cents,
        description: Option<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        validate_account(account)?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "Amount must not be zero".to_string(),
            ));
        }

        let entry =
            NewEntry::plain(account, amount).with_description(description.unwrap_or_default());
        let recorded = self
            .repo
            .record_entry(&entry)
            .await
            .map_err(LedgerError::from)
            .inspect_err(log_failure)?;

        info!(id = recorded.id, operation = %recorded.operation, "entry recorded");
        Ok(recorded)
    }

    /// Credit `amount` (positive) to an account.
    pub async fn deposit(
        &self,
        account: AccountId,
        amount: Cents,
        description: Option<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        require_positive(amount)?;
        self.record(account, amount, description).await
    }

    /// Debit `amount` (positive) from an account.
    pub async fn withdraw(
        &self,
        account: AccountId,
        amount: Cents,
        description: Option<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        require_positive(amount)?;
        self.record(account, -amount, description).await
    }

    /// Move `amount` from one account to another.
    ///
    /// Both entries share a description carrying a fresh reference, and are
    /// committed together: a failed credit leaves no debit behind.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Cents,
    ) -> Result<TransferReceipt, LedgerError> {
        validate_account(from)?;
        validate_account(to)?;
        if from == to {
            return Err(LedgerError::SelfTransfer(from));
        }
        require_positive(amount)?;

        let description = transfer_description(from, to, &Uuid::new_v4());
        let (debit, credit) = self
            .repo
            .record_transfer(from, to, amount, &description)
            .await
            .map_err(LedgerError::from)
            .inspect_err(log_failure)?;

        info!(debit_id = debit.id, credit_id = credit.id, "transfer recorded");
        Ok(TransferReceipt { debit, credit })
    }

    // ========================
    // Balances
    // ========================

    /// Raw ledger balance in the base currency.
    pub async fn ledger_balance(&self, account: AccountId) -> Result<Cents, LedgerError> {
        validate_account(account)?;
        Ok(self.repo.balance(account).await?)
    }

    /// Balance expressed in `currency`.
    ///
    /// The code must be exactly three characters; it is checked before the
    /// store or the rate source are touched. Codes the rate source does not
    /// know are reported like malformed ones.
    #[instrument(skip(self))]
    pub async fn balance(&self, account: AccountId, currency: &str) -> Result<Decimal, LedgerError> {
        validate_account(account)?;
        if currency.chars().count() != 3 {
            return Err(LedgerError::InvalidCurrencyCode(currency.to_string()));
        }

        let code = currency.to_uppercase();
        let balance = cents_to_decimal(self.repo.balance(account).await?);
        if code == self.config.base_currency {
            return Ok(balance);
        }

        let rate = self
            .rates
            .rate(&self.config.base_currency, &code)
            .await
            .map_err(|err| match err {
                RateError::UnknownSymbol(_) => LedgerError::InvalidCurrencyCode(code.clone()),
                RateError::Unreachable(reason) => LedgerError::RateLookupFailed(reason),
            })
            .inspect_err(log_failure)?;
        debug!(rate, currency = %code, "converting balance");

        let rate = Decimal::try_from(rate)
            .map_err(|_| LedgerError::RateLookupFailed(format!("unusable rate {rate} for {code}")))?;
        let converted = balance
            .checked_mul(rate)
            .ok_or_else(|| {
                LedgerError::RateLookupFailed(format!("rate {rate} for {code} overflows the balance"))
            })?;
        Ok(converted.round_dp(CENTS_SCALE))
    }

    /// Balance and entry count of an account.
    pub async fn account_info(&self, account: AccountId) -> Result<AccountInfo, LedgerError> {
        validate_account(account)?;
        let balance = self.repo.balance(account).await?;
        let entry_count = self.repo.entry_count(account).await?;
        Ok(AccountInfo {
            account,
            balance,
            entry_count,
        })
    }

    // ========================
    // History
    // ========================

    /// One page of an account's history.
    ///
    /// A cursor of `0` is the same as no cursor. A non-empty cursor that lands
    /// past the end of the history is rejected, while an account without any
    /// entries simply yields an empty first page.
    #[instrument(skip(self, query), fields(account = query.account, sort = %query.sort))]
    pub async fn list_transactions(&self, query: HistoryQuery) -> Result<EntryPage, LedgerError> {
        validate_account(query.account)?;
        let sort = SortKey::from_str(&query.sort)
            .ok_or_else(|| LedgerError::InvalidSortKey(query.sort.clone()))?;

        let cursor = query.cursor.filter(|cursor| *cursor != 0);
        let range = DateRange::bounded(query.from, query.to, Utc::now());
        let page_size = self.config.page_size;

        let page = match sort {
            SortKey::Date => {
                self.repo
                    .entries_by_date(query.account, range, cursor, page_size)
                    .await?
            }
            SortKey::Sum => {
                self.repo
                    .entries_by_magnitude(query.account, range, cursor, page_size)
                    .await?
            }
        };

        if let Some(cursor) = cursor {
            if page.is_empty() {
                return Err(LedgerError::InvalidPage(cursor));
            }
        }
        Ok(page)
    }

    /// Rebuild the magnitude ordering used by `sort = "sum"` pages.
    pub async fn refresh_magnitude_order(&self) -> Result<u64, LedgerError> {
        let ranked = self
            .repo
            .refresh_magnitude_order()
            .await
            .map_err(LedgerError::from)
            .inspect_err(log_failure)?;
        info!(ranked, "magnitude order refreshed");
        Ok(ranked)
    }
}

fn validate_account(account: AccountId) -> Result<(), LedgerError> {
    if account <= 0 {
        return Err(LedgerError::InvalidAccount(account));
    }
    Ok(())
}

fn require_positive(amount: Cents) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

fn log_failure(err: &LedgerError) {
    match err {
        LedgerError::Store(source) => error!(error = ?source, "storage failure"),
        LedgerError::LockTimeout(account) => warn!(account, "account lock timed out"),
        LedgerError::RateLookupFailed(reason) => warn!(reason = %reason, "rate lookup failed"),
        other => debug!(error = %other, "operation rejected"),
    }
}
