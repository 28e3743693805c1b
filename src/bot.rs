//! Bot runner: one rebalance cycle per tick, driven forever by the time sequence.
//!
//! Each cycle runs, in order:
//! - reconcile the persisted stick against the exchange
//! - load the stick and anchor price
//! - fetch holdings and the last price
//! - evaluate the threshold; stop here if it does not trigger
//! - cancel any resting order, then size and place the rebalance order

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::db::StickStateStore;
use crate::error::{BotError, Result};
use crate::exchange::{ExchangeGateway, LimitViolation, Order};
use crate::trading::{
    BotConfig, MarketSnapshot, OrderManager, PlacementOutcome, PositionSizer,
    StaleOrderReconciler, ThresholdDecision, ThresholdEvaluator, TradingPair,
};

/// How one cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Price within the threshold; nothing sent to the exchange.
    Idle(ThresholdDecision),
    /// An order was accepted by the exchange.
    Placed(Order),
    /// The exchange canceled the new order outright.
    Canceled(Order),
    /// The computed order was below market minimums.
    Halted(LimitViolation),
    /// The post-only chase gave up.
    ChaseExhausted { attempts: u32, last_price: Decimal },
}

impl From<PlacementOutcome> for CycleOutcome {
    fn from(outcome: PlacementOutcome) -> Self {
        match outcome {
            PlacementOutcome::Accepted(order) => CycleOutcome::Placed(order),
            PlacementOutcome::Canceled(order) => CycleOutcome::Canceled(order),
            PlacementOutcome::Halted(violation) => CycleOutcome::Halted(violation),
            PlacementOutcome::RetriesExhausted {
                attempts,
                last_price,
            } => CycleOutcome::ChaseExhausted {
                attempts,
                last_price,
            },
        }
    }
}

/// A single-pair rebalancing bot.
pub struct Bot {
    config: BotConfig,
    pair: TradingPair,
    gateway: Arc<dyn ExchangeGateway>,
    store: StickStateStore,
    evaluator: ThresholdEvaluator,
    reconciler: StaleOrderReconciler,
    order_manager: OrderManager,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        gateway: Arc<dyn ExchangeGateway>,
        store: StickStateStore,
    ) -> Result<Self> {
        let pair = config.pair()?;
        let evaluator = ThresholdEvaluator::new(config.min_diff_value, config.min_diff_type);
        let order_manager = OrderManager::new(
            PositionSizer::new(config.condition_value, config.condition_type),
            config.post_only,
            config.max_chase_retries,
        );

        Ok(Self {
            config,
            pair,
            gateway,
            store,
            evaluator,
            reconciler: StaleOrderReconciler::new(),
            order_manager,
        })
    }

    /// Load market metadata and log the state we resume from.
    ///
    /// A non-fatal failure to load markets is only logged: the gateway
    /// loads them again on first use.
    pub async fn initialize(&self) -> Result<()> {
        if let Err(e) = self.gateway.load_markets().await {
            let e = BotError::from(e);
            if e.is_fatal() {
                return Err(e);
            }
            warn!(error = %e, "Market metadata not loaded, retrying on first use");
        }

        let (stick, anchor) = self.store.load().await?;
        info!(
            bot = %self.config.id,
            symbol = %self.pair,
            anchor = %anchor,
            ?stick,
            "Bot initialized"
        );

        Ok(())
    }

    /// Run one rebalance cycle to completion.
    pub async fn tick(&self) -> Result<CycleOutcome> {
        info!(bot = %self.config.id, symbol = %self.pair, "New iteration");

        let gateway = self.gateway.as_ref();

        let action = self.reconciler.reconcile(gateway, &self.store).await?;
        debug!(?action, "Reconcile step done");

        let (stick, anchor) = self.store.load().await?;

        let balance = gateway.fetch_balance().await?;
        let total_base = balance.total_of(&self.pair.base);
        let total_quote = balance.total_of(&self.pair.quote);
        let price = gateway.get_last_price().await?;

        info!(
            price = %price,
            anchor = %anchor,
            base = %self.pair.base,
            total_base = %total_base,
            free_base = %balance.free_of(&self.pair.base),
            quote = %self.pair.quote,
            total_quote = %total_quote,
            free_quote = %balance.free_of(&self.pair.quote),
            "Market snapshot"
        );

        let decision = self.evaluator.evaluate(anchor, price);
        info!(
            price_diff = %decision.price_diff,
            percentage_diff = ?decision.percentage_diff,
            min_diff = %self.config.min_diff_value,
            min_diff_type = %self.config.min_diff_type,
            triggered = decision.triggered,
            "Threshold evaluated"
        );

        if !decision.triggered {
            return Ok(CycleOutcome::Idle(decision));
        }

        let stick = self
            .order_manager
            .cancel_existing(gateway, &self.store, &stick)
            .await?;

        let snapshot = MarketSnapshot {
            total_base,
            total_quote,
            price,
        };
        let outcome = self
            .order_manager
            .execute(gateway, &self.store, &stick, snapshot)
            .await?;

        Ok(outcome.into())
    }

    /// Cycle forever over the time sequence until Ctrl-C or a fatal error.
    ///
    /// Non-fatal errors end the current cycle only. Ctrl-C is honored
    /// between cycles; a running cycle always completes.
    pub async fn run(&self) -> Result<()> {
        self.initialize().await?;

        info!(
            time_sequence = ?self.config.time_sequence,
            multiplier_secs = self.config.time_sequence_multiplier,
            post_only = self.config.post_only,
            "Starting bot run loop"
        );

        for multiplier in self.config.time_sequence.iter().cycle() {
            match self.tick().await {
                Ok(outcome) => log_outcome(&outcome),
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal error, stopping");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Cycle failed"),
            }

            let wait = Duration::from_secs(
                multiplier.saturating_mul(self.config.time_sequence_multiplier),
            );
            debug!(wait_secs = wait.as_secs(), "Sleeping until next iteration");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("Bot shutdown complete");
        Ok(())
    }

    #[cfg(test)]
    pub fn store(&self) -> &StickStateStore {
        &self.store
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Idle(_) => debug!("Idle"),
        CycleOutcome::Placed(order) => info!(
            order_id = %order.id,
            status = %order.status,
            "Cycle placed order"
        ),
        CycleOutcome::Canceled(order) => warn!(
            order_id = %order.id,
            "Cycle order canceled by the exchange"
        ),
        CycleOutcome::Halted(violation) => info!(reason = %violation, "Cycle halted"),
        CycleOutcome::ChaseExhausted {
            attempts,
            last_price,
        } => warn!(
            attempts = attempts,
            last_price = %last_price,
            "Cycle ended without an accepted order"
        ),
    }
}
