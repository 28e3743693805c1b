//! Order placement with the post-only chase.
//!
//! ## Placement step
//!
//! 1. Size the trade at the working price
//! 2. Normalize the price to the market's tick
//! 3. Halt (no order, no state change) if amount, price, or cost is below
//!    the market minimums
//! 4. Place the limit order
//!
//! ## Chase
//!
//! A post-only order that would have taken liquidity comes back canceled.
//! The working price then moves to the top of our own side of the book
//! (best bid for buys, best ask for sells) and the whole placement step
//! runs again, up to `max_chase_retries` times.

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::position_sizer::{PositionSizer, SizingDecision};
use crate::db::StickStateStore;
use crate::error::{GatewayError, Result};
use crate::exchange::{
    ExchangeGateway, LimitViolation, Order, OrderSide, OrderStatus, PrecisionKind,
};
use crate::models::Stick;

/// Holdings and price the trade is sized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub total_base: Decimal,
    pub total_quote: Decimal,
    pub price: Decimal,
}

/// How a placement ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// The exchange took the order; persisted state reflects it.
    Accepted(Order),
    /// Canceled by the exchange for a reason other than post-only;
    /// persisted as the stick and not retried.
    Canceled(Order),
    /// Below market minimums; nothing placed, nothing persisted.
    Halted(LimitViolation),
    /// Every attempt was rejected as a taker.
    RetriesExhausted { attempts: u32, last_price: Decimal },
}

/// Places rebalance orders and records their outcome.
#[derive(Debug, Clone)]
pub struct OrderManager {
    sizer: PositionSizer,
    post_only: bool,
    max_chase_retries: u32,
}

impl OrderManager {
    pub fn new(sizer: PositionSizer, post_only: bool, max_chase_retries: u32) -> Self {
        Self {
            sizer,
            post_only,
            max_chase_retries,
        }
    }

    /// Cancel the in-flight order, if any, and empty the slot.
    ///
    /// Returns the stick as it is after the call. The cancel is not
    /// re-verified; placement follows immediately.
    pub async fn cancel_existing(
        &self,
        gateway: &dyn ExchangeGateway,
        store: &StickStateStore,
        stick: &Stick,
    ) -> Result<Stick> {
        if !stick.is_open() {
            return Ok(stick.clone());
        }

        if let Some(order_id) = stick.order_id.as_deref() {
            info!(order_id = %order_id, ?stick, "Cancelling order");
            gateway.cancel_order(order_id).await?;
        }
        store.clear_stick().await?;

        Ok(Stick::empty())
    }

    /// Run the placement step, chasing the book on post-only rejections.
    pub async fn execute(
        &self,
        gateway: &dyn ExchangeGateway,
        store: &StickStateStore,
        stick: &Stick,
        snapshot: MarketSnapshot,
    ) -> Result<PlacementOutcome> {
        self.cancel_existing(gateway, store, stick).await?;

        let mut working_price = snapshot.price;
        let mut retries = 0;

        loop {
            let sizing = self
                .sizer
                .size(snapshot.total_base, snapshot.total_quote, working_price)?;

            info!(
                side = %sizing.side,
                amount = %sizing.amount,
                base_value_in_quote = %sizing.base_value_in_quote,
                current_percentage = ?sizing.current_percentage,
                "Sized rebalance"
            );

            let price = gateway
                .decimal_to_precision(working_price, PrecisionKind::Price)
                .await?;

            let market = gateway.get_market().await?;
            if let Some(violation) = market.limits.check(sizing.amount, price) {
                info!(reason = %violation, "Halt execution");
                return Ok(PlacementOutcome::Halted(violation));
            }

            let order = gateway
                .create_order(sizing.side, sizing.amount, price, self.post_only)
                .await?;

            if !order.is_post_only_rejection() {
                self.log_order(&sizing, &order);
                store.apply_order(&order).await?;
                return Ok(match order.status {
                    OrderStatus::Canceled => PlacementOutcome::Canceled(order),
                    _ => PlacementOutcome::Accepted(order),
                });
            }

            info!(
                side = %sizing.side,
                amount = %order.amount,
                price = %order.price,
                "Order canceled (taker)"
            );

            if retries >= self.max_chase_retries {
                warn!(
                    attempts = retries + 1,
                    last_price = %price,
                    "Post-only chase gave up"
                );
                return Ok(PlacementOutcome::RetriesExhausted {
                    attempts: retries + 1,
                    last_price: price,
                });
            }
            retries += 1;

            working_price = self.chase_price(gateway, sizing.side).await?;
            info!(attempt = retries, price = %working_price, "Chasing top of book");
        }
    }

    /// Best price on the side a maker order of `side` rests on.
    async fn chase_price(&self, gateway: &dyn ExchangeGateway, side: OrderSide) -> Result<Decimal> {
        let book = gateway.get_order_book().await?;
        let price = book.best_price_for(side).ok_or_else(|| {
            GatewayError::Exchange(format!("order book has no levels to chase a {}", side))
        })?;
        Ok(price)
    }

    fn log_order(&self, sizing: &SizingDecision, order: &Order) {
        info!(
            side = %sizing.side,
            order_id = %order.id,
            status = %order.status,
            amount = %order.amount,
            price = %order.price,
            fee_cost = ?order.fee.as_ref().map(|fee| fee.cost),
            fee_currency = ?order.fee.as_ref().and_then(|fee| fee.currency.as_deref()),
            datetime = ?order.datetime,
            "Order placed"
        );
    }
}
