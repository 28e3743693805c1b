//! Re-synchronizes the persisted stick with the exchange before each decision.

use rust_decimal::Decimal;
use tracing::info;

use crate::db::StickStateStore;
use crate::error::{BotError, Result};
use crate::exchange::{ExchangeGateway, OrderStatus};

/// What reconciliation did to the persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// No order was in flight.
    NoOpenOrder,
    /// Still resting with nothing executed.
    StillOpen,
    /// Still resting, partly executed: anchor moved to the order price.
    PartiallyFilled { price: Decimal },
    /// Fully executed: anchor moved and stick cleared.
    Filled { price: Decimal },
    /// Canceled remotely: stick cleared, anchor untouched.
    Canceled,
}

/// Brings the local stick in line with the exchange, which is always right.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaleOrderReconciler;

impl StaleOrderReconciler {
    pub fn new() -> Self {
        Self
    }

    pub async fn reconcile(
        &self,
        gateway: &dyn ExchangeGateway,
        store: &StickStateStore,
    ) -> Result<ReconcileAction> {
        let (stick, _) = store.load().await?;

        if !stick.is_open() {
            return Ok(ReconcileAction::NoOpenOrder);
        }

        let order_id = stick.order_id.as_deref().ok_or_else(|| {
            BotError::Store(anyhow::anyhow!("open stick without an order id"))
        })?;

        let order = gateway.fetch_order(order_id).await?;

        let action = match order.status {
            OrderStatus::Open if order.is_partially_filled() => {
                store.set_anchor(order.price).await?;
                ReconcileAction::PartiallyFilled { price: order.price }
            }
            OrderStatus::Open => ReconcileAction::StillOpen,
            OrderStatus::Closed => {
                store.record_fill(order.price).await?;
                ReconcileAction::Filled { price: order.price }
            }
            OrderStatus::Canceled => {
                store.clear_stick().await?;
                ReconcileAction::Canceled
            }
        };

        info!(
            order_id = %order_id,
            remote_status = %order.status,
            filled = %order.filled,
            action = ?action,
            "Reconciled stale order"
        );

        Ok(action)
    }
}
