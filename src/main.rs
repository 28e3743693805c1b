//! Stick Rebalancer
//!
//! Keeps a single-pair spot account near a target allocation: whenever the
//! price moves far enough from the last fill, it places a maker order that
//! rebalances the holdings, chasing the book if the order would take.

mod bot;
mod db;
mod error;
mod exchange;
mod logging;
mod models;
mod trading;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::bot::{Bot, CycleOutcome};
use crate::db::{SqliteStateStore, StickStateStore};
use crate::trading::{BotRegistry, Credentials};

/// Threshold-triggered portfolio rebalancer CLI.
#[derive(Parser)]
#[command(name = "stick_rebalancer")]
#[command(about = "Rebalance a spot pair whenever price drifts from the last fill", long_about = None)]
struct Cli {
    /// Bot identifier from the registry
    bot_id: String,

    /// Bot registry file
    #[arg(short, long, default_value = "bots.toml", env = "STICK_REBALANCER_CONFIG")]
    config: PathBuf,

    /// Database file path
    #[arg(short, long, default_value = "sqlite:./stick_rebalancer.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Directory for the daily log files (<BOT_ID>.log.<date>)
    #[arg(long, default_value = "log", env = "STICK_REBALANCER_LOG_DIR")]
    log_dir: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Print the persisted order state and exit
    #[arg(long, conflicts_with = "once")]
    status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Invalid log level")?;

    let (subscriber, _log_guard) =
        logging::subscriber(filter, &cli.log_dir, &format!("{}.log", cli.bot_id))?;
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = BotRegistry::load(&cli.config)?;
    let config = registry.get(&cli.bot_id).with_context(|| {
        format!(
            "Known bots: {}",
            registry.ids().collect::<Vec<_>>().join(", ")
        )
    })?;

    // Initialize state store
    let sqlite = SqliteStateStore::new(&cli.database, &config.id)
        .await
        .context("Failed to open state database")?;
    let store = StickStateStore::open(Arc::new(sqlite)).await?;

    if cli.status {
        let (stick, anchor) = store.load().await?;

        println!("\n=== Bot {} ({}) ===", config.id, config.symbol);
        println!("Anchor price:  {}", anchor);
        if stick.is_empty() {
            println!("Order:         none");
        } else {
            println!("Order id:      {}", stick.order_id.as_deref().unwrap_or("-"));
            println!("Side:          {}", display_opt(stick.order_side));
            println!("Status:        {}", display_opt(stick.order_status));
            println!("Amount:        {}", display_opt(stick.amount));
            println!("Actual amount: {}", display_opt(stick.actual_amount));
            println!("Price:         {}", display_opt(stick.price));
        }
        return Ok(());
    }

    let credentials = Credentials::from_env(&config.id)?;
    let gateway = exchange::connect(&config, credentials)?;

    info!(
        bot = %config.id,
        symbol = %config.symbol,
        exchange = ?config.exchange,
        testnet = config.testnet,
        "Starting rebalancer"
    );

    let bot = Bot::new(config, gateway, store)?;

    if cli.once {
        bot.initialize().await?;
        match bot.tick().await? {
            CycleOutcome::Idle(decision) => {
                println!("Idle: price moved {} from anchor", decision.price_diff)
            }
            CycleOutcome::Placed(order) => println!(
                "Placed {} {} @ {} ({})",
                order.side, order.amount, order.price, order.status
            ),
            CycleOutcome::Canceled(order) => {
                println!("Order {} came back canceled", order.id)
            }
            CycleOutcome::Halted(violation) => println!("Halted: {}", violation),
            CycleOutcome::ChaseExhausted {
                attempts,
                last_price,
            } => println!(
                "No order accepted after {} attempts (last price {})",
                attempts, last_price
            ),
        }
        return Ok(());
    }

    bot.run().await?;

    Ok(())
}

fn display_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
