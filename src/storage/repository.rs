use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, instrument};

use crate::domain::{
    AccountId, Cents, DateRange, EntryPage, LedgerEntry, NewEntry, Operation,
};

use super::{AccountLocks, LockTimedOut, MIGRATION_001_INITIAL};

const SELECT_BALANCE: &str =
    "SELECT COALESCE(SUM(sum), 0) AS balance FROM transactions WHERE account = ?";

const CLAIM_ACCOUNT: &str = r#"
    INSERT INTO account_locks (account, acquisitions) VALUES (?, 1)
    ON CONFLICT (account) DO UPDATE SET acquisitions = acquisitions + 1
"#;

const INSERT_ENTRY: &str = r#"
    INSERT INTO transactions (account, sum, operation, date, description)
    VALUES (?, ?, ?, ?, ?)
    RETURNING id
"#;

const SELECT_BY_DATE: &str = r#"
    SELECT id, account, sum, operation, date, description
    FROM transactions
    WHERE account = ? AND date >= ? AND date <= ? AND id < ?
    ORDER BY id DESC
    LIMIT ?
"#;

const SELECT_BY_MAGNITUDE: &str = r#"
    SELECT t.id AS id, t.account AS account, t.sum AS sum, t.operation AS operation,
           t.date AS date, t.description AS description, o.pager AS pager
    FROM transactions_sum_order o
    INNER JOIN transactions t ON o.id = t.id
    WHERE t.account = ? AND t.date >= ? AND t.date <= ? AND o.pager >= ?
    ORDER BY o.pager ASC
    LIMIT ?
"#;

const REBUILD_MAGNITUDE_ORDER: &str = r#"
    INSERT INTO transactions_sum_order (id, pager)
    SELECT id, ROW_NUMBER() OVER (ORDER BY ABS(sum) DESC, id ASC)
    FROM transactions
"#;

/// Failure of a ledger write.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Insufficient funds on account {account}: balance {balance}, required {required}")]
    InsufficientFunds {
        account: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Amount {amount} would take the balance of account {account} out of range")]
    BalanceOutOfRange {
        account: AccountId,
        balance: Cents,
        amount: Cents,
    },

    #[error("Timed out waiting for the lock on account {0}")]
    LockTimeout(AccountId),

    #[error("Failed to record ledger entry")]
    Store(#[from] anyhow::Error),
}

impl From<LockTimedOut> for RecordError {
    fn from(err: LockTimedOut) -> Self {
        RecordError::LockTimeout(err.0)
    }
}

impl RecordError {
    /// Classify a driver error raised while `account` was being written.
    /// SQLite busy/locked conditions are lock waits that ran out, not faults.
    fn from_sqlx(account: AccountId, action: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |err| {
            if is_busy(&err) {
                RecordError::LockTimeout(account)
            } else {
                RecordError::Store(anyhow::Error::new(err).context(action))
            }
        }
    }
}

fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            // Primary result code lives in the low byte of extended codes.
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

/// Repository over the append-only ledger.
///
/// Writes run inside a scoped transaction while the per-account lock is held;
/// an early return or a dropped future rolls the transaction back.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    locks: AccountLocks,
}

impl Repository {
    /// Create a new repository over the given pool.
    pub fn new(pool: SqlitePool, lock_timeout: Duration) -> Self {
        Self {
            pool,
            locks: AccountLocks::new(lock_timeout),
        }
    }

    /// Connect to a SQLite database.
    ///
    /// The store's own busy wait uses the same bound as the account locks.
    pub async fn connect(database_url: &str, lock_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(lock_timeout);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str, lock_timeout: Duration) -> Result<Self> {
        let repo = Self::connect(database_url, lock_timeout).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    // ========================
    // Write path
    // ========================

    /// Record a single entry: lock the account, read its balance, reject a
    /// debit that would overdraw it, insert, commit.
    #[instrument(skip(self, entry), fields(account = entry.account, sum = entry.sum))]
    pub async fn record_entry(&self, entry: &NewEntry) -> Result<LedgerEntry, RecordError> {
        let _guard = self.locks.acquire(entry.account).await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(RecordError::from_sqlx(entry.account, "Failed to begin transaction"))?;

        let recorded = write_entry(&mut tx, entry, Utc::now()).await?;

        tx.commit()
            .await
            .map_err(RecordError::from_sqlx(entry.account, "Failed to commit entry"))?;

        debug!(id = recorded.id, "ledger entry committed");
        Ok(recorded)
    }

    /// Record both sides of a transfer in one transaction.
    ///
    /// The debit on `from` is checked and written first; the credit on `to`
    /// follows. Either both entries commit or neither does.
    #[instrument(skip(self, description))]
    pub async fn record_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Cents,
        description: &str,
    ) -> Result<(LedgerEntry, LedgerEntry), RecordError> {
        let debit = NewEntry {
            account: from,
            sum: -amount,
            operation: Operation::Transfer,
            description: description.to_string(),
        };
        let credit = NewEntry {
            account: to,
            sum: amount,
            operation: Operation::Transfer,
            description: description.to_string(),
        };

        let _guard = self.locks.acquire_all(&[from, to]).await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(RecordError::from_sqlx(from, "Failed to begin transaction"))?;

        let now = Utc::now();
        let debit = write_entry(&mut tx, &debit, now).await?;
        let credit = write_entry(&mut tx, &credit, now).await?;

        tx.commit()
            .await
            .map_err(RecordError::from_sqlx(from, "Failed to commit transfer"))?;

        debug!(debit_id = debit.id, credit_id = credit.id, "transfer committed");
        Ok((debit, credit))
    }

    // ========================
    // Read path
    // ========================

    /// Current balance of an account; 0 when it has no entries.
    pub async fn balance(&self, account: AccountId) -> Result<Cents> {
        let row = sqlx::query(SELECT_BALANCE)
            .bind(account)
            .fetch_one(&self.pool)
            .await
            .context("Failed to compute balance")?;
        Ok(row.get("balance"))
    }

    /// Number of entries recorded for an account.
    pub async fn entry_count(&self, account: AccountId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM transactions WHERE account = ?")
            .bind(account)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count entries")?;
        Ok(row.get("count"))
    }

    /// Newest-first page of entries dated within `range`.
    ///
    /// `cursor` is the id of the last entry of the previous page; only strictly
    /// older entries are returned, so appends never shift later pages.
    pub async fn entries_by_date(
        &self,
        account: AccountId,
        range: DateRange,
        cursor: Option<i64>,
        page_size: u32,
    ) -> Result<EntryPage> {
        let rows = sqlx::query(SELECT_BY_DATE)
            .bind(account)
            .bind(range.from.timestamp())
            .bind(range.to.timestamp())
            .bind(cursor.unwrap_or(i64::MAX))
            .bind(i64::from(page_size) + 1)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list entries by date")?;

        let mut entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>>>()?;

        let page_size = page_size as usize;
        let has_more = entries.len() > page_size;
        entries.truncate(page_size);

        let next = if has_more {
            entries.last().map(|entry| entry.id)
        } else {
            None
        };
        Ok(EntryPage { entries, next })
    }

    /// Largest-magnitude-first page of entries dated within `range`.
    ///
    /// Order comes from the last rebuild of the magnitude table; entries
    /// written since then are missing until the next rebuild. `cursor` is a
    /// rank position, the next page starts at the first unseen rank.
    pub async fn entries_by_magnitude(
        &self,
        account: AccountId,
        range: DateRange,
        cursor: Option<i64>,
        page_size: u32,
    ) -> Result<EntryPage> {
        let rows = sqlx::query(SELECT_BY_MAGNITUDE)
            .bind(account)
            .bind(range.from.timestamp())
            .bind(range.to.timestamp())
            .bind(cursor.unwrap_or(0))
            .bind(i64::from(page_size) + 1)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list entries by magnitude")?;

        let mut ranked = rows
            .iter()
            .map(|row| Ok((row.get::<i64, _>("pager"), Self::row_to_entry(row)?)))
            .collect::<Result<Vec<_>>>()?;

        let page_size = page_size as usize;
        let next = ranked.get(page_size).map(|(pager, _)| *pager);
        ranked.truncate(page_size);

        Ok(EntryPage {
            entries: ranked.into_iter().map(|(_, entry)| entry).collect(),
            next,
        })
    }

    // ========================
    // Magnitude ordering
    // ========================

    /// Rebuild the magnitude ordering from the current ledger.
    /// Readers keep seeing the previous ordering until the rebuild commits.
    #[instrument(skip(self))]
    pub async fn refresh_magnitude_order(&self) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin magnitude refresh")?;

        sqlx::query("DELETE FROM transactions_sum_order")
            .execute(&mut *tx)
            .await
            .context("Failed to clear magnitude order")?;

        let ranked = sqlx::query(REBUILD_MAGNITUDE_ORDER)
            .execute(&mut *tx)
            .await
            .context("Failed to rebuild magnitude order")?
            .rows_affected();

        tx.commit()
            .await
            .context("Failed to commit magnitude refresh")?;

        debug!(ranked, "magnitude order rebuilt");
        Ok(ranked)
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
        let operation_code: i64 = row.get("operation");
        let date: i64 = row.get("date");

        Ok(LedgerEntry {
            id: row.get("id"),
            account: row.get("account"),
            sum: row.get("sum"),
            operation: Operation::from_code(operation_code)
                .ok_or_else(|| anyhow::anyhow!("Invalid operation code: {}", operation_code))?,
            date: from_unix(date)?,
            description: row.get("description"),
        })
    }
}

/// Check-and-write for one entry on an open transaction.
async fn write_entry(
    conn: &mut SqliteConnection,
    entry: &NewEntry,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, RecordError> {
    let account = entry.account;

    // Take the store write lock before reading, so the balance cannot move
    // underneath the check.
    sqlx::query(CLAIM_ACCOUNT)
        .bind(account)
        .execute(&mut *conn)
        .await
        .map_err(RecordError::from_sqlx(account, "Failed to claim account"))?;

    let balance: Cents = sqlx::query(SELECT_BALANCE)
        .bind(account)
        .fetch_one(&mut *conn)
        .await
        .map_err(RecordError::from_sqlx(account, "Failed to read balance"))?
        .get("balance");

    // Every stored running sum must stay representable, or SUM() fails on
    // each later read of the account.
    let Some(updated) = balance.checked_add(entry.sum) else {
        return Err(RecordError::BalanceOutOfRange {
            account,
            balance,
            amount: entry.sum,
        });
    };
    if entry.is_debit() && updated < 0 {
        return Err(RecordError::InsufficientFunds {
            account,
            balance,
            required: entry.sum.saturating_neg(),
        });
    }

    let date = from_unix(now.timestamp())?;
    let row = sqlx::query(INSERT_ENTRY)
        .bind(account)
        .bind(entry.sum)
        .bind(entry.operation.code())
        .bind(date.timestamp())
        .bind(&entry.description)
        .fetch_one(&mut *conn)
        .await
        .map_err(RecordError::from_sqlx(account, "Failed to insert entry"))?;

    Ok(LedgerEntry {
        id: row.get("id"),
        account,
        sum: entry.sum,
        operation: entry.operation,
        date,
        description: entry.description.clone(),
    })
}

fn from_unix(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid timestamp: {}", seconds))
}
