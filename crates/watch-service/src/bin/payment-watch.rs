//! Payment watch command-line utility
//!
//! Uses the same environment configuration as the service.
//!
//! Modes:
//! - default: watch until a matching payment arrives or the time limit passes
//! - `--once`: a single history scan listing every matching transaction

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payment_watcher::{MatchPredicate, PaymentWatcher, WatchRequest, WatchStatus};
use watch_service::{ledger, Config};

#[derive(Parser)]
#[command(name = "payment-watch")]
#[command(about = "Watch a ledger account for a payment with a given memo or value")]
struct Cli {
    /// Text memo the payment must carry
    #[arg(long, conflicts_with = "value", required_unless_present = "value")]
    memo: Option<String>,

    /// Exact value (in the ledger's smallest unit) sent to the account
    #[arg(long)]
    value: Option<String>,

    /// Account to watch (defaults to WALLET_ADDRESS)
    #[arg(long)]
    account: Option<String>,

    /// Seconds between polls (defaults to POLL_INTERVAL_SECS)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Give up after this many seconds (defaults to MAX_DURATION_SECS)
    #[arg(long)]
    max_secs: Option<u64>,

    /// Scan the history once and print every match
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,payment_watcher=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(account) = &cli.account {
        config.wallet_address = account.clone();
    }
    if let Some(secs) = cli.interval_secs {
        config.poll_interval_secs = secs;
    }
    if let Some(secs) = cli.max_secs {
        config.max_duration_secs = secs;
    }
    config.validate()?;

    let predicate = match (cli.memo, cli.value) {
        (Some(memo), _) => MatchPredicate::exact_memo(memo),
        (None, Some(value)) => MatchPredicate::exact_value(value, config.wallet_address.clone()),
        (None, None) => anyhow::bail!("One of --memo or --value is required"),
    };

    let source = ledger::connect(&config).await?;
    let watcher = PaymentWatcher::with_page_size(source, config.page_size);

    if cli.once {
        scan_once(&watcher, &config.wallet_address, &predicate).await
    } else {
        // Only payments made from now on count for a value watch
        let from_height = match &predicate {
            MatchPredicate::ExactValue { .. } => watcher
                .current_height()
                .await
                .context("Failed to get current block number")?,
            MatchPredicate::ExactMemo { .. } => None,
        };
        watch(&watcher, &config, predicate, from_height).await
    }
}

async fn scan_once(
    watcher: &PaymentWatcher,
    account: &str,
    predicate: &MatchPredicate,
) -> Result<()> {
    let matches = watcher
        .find_matches(account, predicate)
        .await
        .context("Failed to fetch transactions")?;

    println!("Found {} matching transactions:", matches.len());

    for tx in &matches {
        println!("Transaction ID: {}", tx.id);

        match watcher.resolve_amounts(&tx.id).await {
            Ok(amounts) if amounts.is_empty() => println!("  No amount found"),
            Ok(amounts) => {
                for amount in amounts {
                    println!("  Amount: {} {}", amount.amount, amount.asset);
                }
            }
            Err(e) => eprintln!("  Error fetching operations: {}", e),
        }
    }

    Ok(())
}

async fn watch(
    watcher: &PaymentWatcher,
    config: &Config,
    predicate: MatchPredicate,
    from_height: Option<u64>,
) -> Result<()> {
    let request = WatchRequest::new(config.wallet_address.clone(), predicate)
        .with_poll_interval(Duration::from_secs(config.poll_interval_secs))
        .with_max_duration(Duration::from_secs(config.max_duration_secs))
        .with_from_height(from_height);

    println!(
        "Watching {} (every {}s, up to {}s)",
        config.wallet_address, config.poll_interval_secs, config.max_duration_secs
    );

    let handle = watcher.start(request);
    let outcome = tokio::select! {
        outcome = handle.result() => outcome,
        _ = tokio::signal::ctrl_c() => {
            handle.cancel();
            handle.result().await
        }
    };

    match (outcome.status, &outcome.transaction) {
        (WatchStatus::Succeeded, Some(tx)) => {
            println!("Payment received in transaction {}", tx.id);
            for amount in &outcome.amounts {
                println!("  Amount: {} {}", amount.amount, amount.asset);
            }
            Ok(())
        }
        (status, _) => {
            let message = outcome.message.as_deref().unwrap_or("no message");
            anyhow::bail!("Watch ended {}: {}", status, message)
        }
    }
}
