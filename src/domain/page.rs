use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AccountId, LedgerEntry};

/// Ordering of a transaction history page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Newest first; cursor is an entry id.
    Date,
    /// Largest absolute sum first; cursor is a position in the magnitude rank.
    Sum,
}

impl SortKey {
    /// Parse a sort key. The empty string selects the default, [`SortKey::Date`].
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "" | "date" => Some(SortKey::Date),
            "sum" => Some(SortKey::Sum),
            _ => None,
        }
    }
}

/// Inclusive date window for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// Window bounded by the given dates; missing ends default to the epoch and `now`.
    pub fn bounded(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            from: from.unwrap_or(DateTime::UNIX_EPOCH),
            to: to.unwrap_or(now),
        }
    }
}

/// Request for one page of an account's history.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub account: AccountId,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// "date", "sum" or empty.
    pub sort: String,
    /// Position returned by the previous page; `None` asks for the first page.
    pub cursor: Option<i64>,
}

impl HistoryQuery {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    pub fn after(mut self, cursor: Option<i64>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }
}

/// One page of ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPage {
    pub entries: Vec<LedgerEntry>,
    /// Cursor for the following page, `None` once the history is exhausted.
    pub next: Option<i64>,
}

impl EntryPage {
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
