use anyhow::Result;
use balance_ledger::cli::Cli;
use balance_ledger::telemetry;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; flags and the environment still apply.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    telemetry::init(cli.verbose);
    cli.run().await
}
