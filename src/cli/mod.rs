use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::application::{
    refresher, AccountService, LedgerConfig, DEFAULT_BASE_CURRENCY, DEFAULT_PAGE_SIZE,
    DEFAULT_RATES_URL,
};
use crate::domain::{format_cents, parse_cents, AccountId, EntryPage, HistoryQuery};
use crate::storage::DEFAULT_LOCK_TIMEOUT;

/// balance-ledger - account balances over an append-only ledger
#[derive(Parser)]
#[command(name = "balance-ledger")]
#[command(about = "Account balances over an append-only ledger of signed entries")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "LEDGER_DATABASE", default_value = "ledger.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Currency the ledger amounts are kept in
    #[arg(long, env = "LEDGER_BASE_CURRENCY", default_value = DEFAULT_BASE_CURRENCY)]
    pub base_currency: String,

    /// Currency rate endpoint
    #[arg(long, env = "LEDGER_RATES_URL", default_value = DEFAULT_RATES_URL)]
    pub rates_url: String,

    /// Entries per history page
    #[arg(long, env = "LEDGER_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Seconds to wait for an account lock before giving up
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_SECS", default_value_t = DEFAULT_LOCK_TIMEOUT.as_secs())]
    pub lock_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Deposit (positive amount) or withdraw (negative amount)
    Record {
        /// Account id
        account: AccountId,

        /// Amount (e.g., "50.00", "-12.5")
        #[arg(allow_hyphen_values = true)]
        amount: String,

        /// Description of the entry
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Move money between two accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account id
        #[arg(long)]
        from: AccountId,

        /// Destination account id
        #[arg(long)]
        to: AccountId,
    },

    /// Show the balance of an account
    Balance {
        /// Account id
        account: AccountId,

        /// Three-letter currency code (defaults to the base currency)
        #[arg(short, long)]
        currency: Option<String>,
    },

    /// Show balance and entry count of an account
    Info {
        /// Account id
        account: AccountId,
    },

    /// List one page of an account's history
    History {
        /// Account id
        account: AccountId,

        /// Only entries on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Only entries on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,

        /// Sort order: date, sum
        #[arg(long, default_value = "")]
        sort: String,

        /// Cursor printed by the previous page
        #[arg(long)]
        cursor: Option<i64>,

        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Rebuild the magnitude ordering once
    Refresh,

    /// Rebuild the magnitude ordering periodically until interrupted
    Refresher {
        /// Seconds between rebuilds
        #[arg(long, default_value_t = refresher::DEFAULT_REFRESH_INTERVAL.as_secs())]
        interval_secs: u64,
    },
}

impl Cli {
    fn config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_page_size(self.page_size)
            .with_lock_timeout(Duration::from_secs(self.lock_timeout_secs))
            .with_base_currency(self.base_currency.clone())
            .with_rates_url(self.rates_url.clone())
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();

        match self.command {
            Commands::Init => {
                AccountService::init(&self.database, config).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Record {
                account,
                amount,
                description,
            } => {
                let service = AccountService::connect(&self.database, config).await?;
                let amount =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '-50'")?;

                let entry = service.record(account, amount, description).await?;
                println!(
                    "Recorded {} {} on account {} (entry {})",
                    entry.operation,
                    format_cents(entry.sum),
                    entry.account,
                    entry.id
                );
            }

            Commands::Transfer { amount, from, to } => {
                let service = AccountService::connect(&self.database, config).await?;
                let amount =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;

                let receipt = service.transfer(from, to, amount).await?;
                println!(
                    "Transferred {}: account {} -> account {} (entries {}, {})",
                    format_cents(amount),
                    receipt.debit.account,
                    receipt.credit.account,
                    receipt.debit.id,
                    receipt.credit.id
                );
            }

            Commands::Balance { account, currency } => {
                let currency = currency.unwrap_or_else(|| config.base_currency.clone());
                let service = AccountService::connect(&self.database, config).await?;
                let balance = service.balance(account, &currency).await?;
                println!("{}: {} {}", account, balance, currency.to_uppercase());
            }

            Commands::Info { account } => {
                let service = AccountService::connect(&self.database, config).await?;
                let info = service.account_info(account).await?;
                println!("Account:  {}", info.account);
                println!("Balance:  {}", format_cents(info.balance));
                println!("Entries:  {}", info.entry_count);
            }

            Commands::History {
                account,
                from_date,
                to_date,
                sort,
                cursor,
                format,
            } => {
                let service = AccountService::connect(&self.database, config).await?;
                let from = from_date
                    .map(|s| parse_date(&s, false))
                    .transpose()
                    .context("Invalid from-date")?;
                let to = to_date
                    .map(|s| parse_date(&s, true))
                    .transpose()
                    .context("Invalid to-date")?;

                let query = HistoryQuery::new(account)
                    .between(from, to)
                    .sorted_by(sort)
                    .after(cursor);
                let page = service.list_transactions(query).await?;
                print_page(&page, &format)?;
            }

            Commands::Refresh => {
                let service = AccountService::connect(&self.database, config).await?;
                let ranked = service.refresh_magnitude_order().await?;
                println!("Magnitude order rebuilt ({} entries)", ranked);
            }

            Commands::Refresher { interval_secs } => {
                let service = Arc::new(AccountService::connect(&self.database, config).await?);
                let handle = refresher::spawn(service, Duration::from_secs(interval_secs));
                println!("Refreshing magnitude order every {}s (Ctrl-C to stop)", interval_secs);

                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for Ctrl-C")?;
                handle.abort();
                println!("Refresher stopped");
            }
        }

        Ok(())
    }
}

fn print_page(page: &EntryPage, format: &str) -> Result<()> {
    match format {
        "table" => {
            if page.is_empty() {
                println!("No entries found.");
                return Ok(());
            }

            println!(
                "{:>8} {:<20} {:<9} {:>12} DESCRIPTION",
                "ID", "DATE", "OPERATION", "SUM"
            );
            println!("{}", "-".repeat(72));
            for entry in &page.entries {
                println!(
                    "{:>8} {:<20} {:<9} {:>12} {}",
                    entry.id,
                    entry.date.format("%Y-%m-%d %H:%M:%S"),
                    entry.operation,
                    format_cents(entry.sum),
                    truncate(&entry.description, 40)
                );
            }
            match page.next {
                Some(cursor) => println!("\nMore entries: --cursor {}", cursor),
                None => println!("\nEnd of history."),
            }
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(page)?);
        }
        "csv" => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            for entry in &page.entries {
                writer.serialize(entry)?;
            }
            writer.flush()?;
        }
        other => bail!("Unknown format '{}'. Use table, json or csv", other),
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Parse YYYY-MM-DD into the first or last second of that day (UTC).
fn parse_date(date_str: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;

    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    let naive = time.ok_or_else(|| anyhow::anyhow!("Invalid date"))?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_bounds() {
        let start = parse_date("2024-03-10", false).unwrap();
        let end = parse_date("2024-03-10", true).unwrap();
        assert_eq!(end.timestamp() - start.timestamp(), 86_399);
        assert!(parse_date("10/03/2024", false).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a rather long description", 10), "a rathe...");
    }

    #[test]
    fn test_cli_parses_negative_amount() {
        let cli = Cli::try_parse_from(["balance-ledger", "record", "3", "-12.50"]).unwrap();
        match cli.command {
            Commands::Record { account, amount, .. } => {
                assert_eq!(account, 3);
                assert_eq!(amount, "-12.50");
            }
            _ => panic!("expected record command"),
        }
    }

    #[test]
    fn test_cli_defaults_follow_library_constants() {
        let cli = Cli::try_parse_from(["balance-ledger", "refresher"]).unwrap();
        assert_eq!(cli.lock_timeout_secs, DEFAULT_LOCK_TIMEOUT.as_secs());
        match cli.command {
            Commands::Refresher { interval_secs } => {
                assert_eq!(interval_secs, refresher::DEFAULT_REFRESH_INTERVAL.as_secs());
            }
            _ => panic!("expected refresher command"),
        }
    }
}
