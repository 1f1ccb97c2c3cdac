use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

/// Accounts are implicit: an id owns whatever entries carry it.
pub type AccountId = i64;

/// Store-assigned, strictly increasing entry id.
pub type EntryId = i64;

/// Kind of movement recorded by a ledger entry.
///
/// Transfer entries are tagged on both sides so reporting can tell them apart
/// from plain deposits and withdrawals; they count toward the balance all the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Income,
    Outcome,
    Transfer,
}

impl Operation {
    /// Tag for a plain deposit or withdrawal of `sum`.
    pub fn for_amount(sum: Cents) -> Self {
        if sum < 0 {
            Operation::Outcome
        } else {
            Operation::Income
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Operation::Income => 0,
            Operation::Outcome => 1,
            Operation::Transfer => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Operation::Income),
            1 => Some(Operation::Outcome),
            2 => Some(Operation::Transfer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Income => "income",
            Operation::Outcome => "outcome",
            Operation::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, signed record attributed to one account.
/// Positive sums credit the account, negative sums debit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account: AccountId,
    pub sum: Cents,
    pub operation: Operation,
    pub date: DateTime<Utc>,
    pub description: String,
}

/// Write intent for a single ledger entry. Id and date are assigned on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub account: AccountId,
    pub sum: Cents,
    pub operation: Operation,
    pub description: String,
}

impl NewEntry {
    /// Deposit or withdrawal, tagged from the sign of `sum`.
    pub fn plain(account: AccountId, sum: Cents) -> Self {
        Self {
            account,
            sum,
            operation: Operation::for_amount(sum),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_debit(&self) -> bool {
        self.sum < 0
    }
}

/// Description shared by both sides of a transfer.
pub fn transfer_description(from: AccountId, to: AccountId, reference: &uuid::Uuid) -> String {
    format!("Transfer to account {to} from account {from} (ref {reference})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_follows_sign() {
        assert_eq!(Operation::for_amount(100), Operation::Income);
        assert_eq!(Operation::for_amount(-1), Operation::Outcome);
    }

    #[test]
    fn test_operation_codes_round_trip() {
        for op in [Operation::Income, Operation::Outcome, Operation::Transfer] {
            assert_eq!(Operation::from_code(op.code()), Some(op));
        }
        assert_eq!(Operation::from_code(7), None);
    }

    #[test]
    fn test_plain_entry() {
        let entry = NewEntry::plain(3, -250).with_description("coffee");
        assert!(entry.is_debit());
        assert_eq!(entry.operation, Operation::Outcome);
        assert_eq!(entry.description, "coffee");
    }

    #[test]
    fn test_transfer_description_names_both_accounts() {
        let reference = uuid::Uuid::nil();
        let desc = transfer_description(1, 2, &reference);
        assert!(desc.starts_with("Transfer to account 2 from account 1"));
        assert!(desc.contains(&reference.to_string()));
    }
}
