use thiserror::Error;

use crate::domain::{AccountId, Cents};
use crate::storage::RecordError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Insufficient funds on account {account}: balance {balance}, required {required}")]
    InsufficientFunds {
        account: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Timed out waiting for the lock on account {0}")]
    LockTimeout(AccountId),

    #[error("Invalid currency code: {0}")]
    InvalidCurrencyCode(String),

    #[error("Currency rate lookup failed: {0}")]
    RateLookupFailed(String),

    #[error("Invalid sort key: {0}")]
    InvalidSortKey(String),

    #[error("Page cursor {0} is past the end of the history")]
    InvalidPage(i64),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid account id: {0}")]
    InvalidAccount(AccountId),

    #[error("Cannot transfer from account {0} to itself")]
    SelfTransfer(AccountId),

    /// Store detail stays on the source chain; the message never carries it.
    #[error("Storage failure")]
    Store(#[from] anyhow::Error),
}

impl LedgerError {
    /// True for transient conditions the caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::LockTimeout(_) | LedgerError::RateLookupFailed(_)
        )
    }
}

impl From<RecordError> for LedgerError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::InsufficientFunds {
                account,
                balance,
                required,
            } => LedgerError::InsufficientFunds {
                account,
                balance,
                required,
            },
            RecordError::BalanceOutOfRange { .. } => LedgerError::InvalidAmount(err.to_string()),
            RecordError::LockTimeout(account) => LedgerError::LockTimeout(account),
            RecordError::Store(source) => LedgerError::Store(source),
        }
    }
}
