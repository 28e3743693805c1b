//! Typed access to the two persisted entities: the stick and the anchor price.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use super::StateStore;
use crate::error::{BotError, Result};
use crate::exchange::{Order, OrderStatus};
use crate::models::Stick;

const STICK_KEY: &str = "stick";
const ANCHOR_KEY: &str = "lastFilledOrderPrice";

/// Wrapper over a [`StateStore`] exposing the in-flight order slot and the
/// price of the last completed trade.
///
/// Every method writes through before returning.
#[derive(Clone)]
pub struct StickStateStore {
    store: Arc<dyn StateStore>,
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| BotError::Store(e.into()))
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| BotError::Store(anyhow::anyhow!("malformed '{}': {}", key, e)))
}

impl StickStateStore {
    /// Wrap `store`, writing the empty stick and a zero anchor if this
    /// account has never been persisted. Existing values are kept.
    pub async fn open(store: Arc<dyn StateStore>) -> Result<Self> {
        let this = Self { store };

        let mut defaults = Vec::new();
        if this.store.get(STICK_KEY).await.map_err(BotError::Store)?.is_none() {
            defaults.push((STICK_KEY.to_string(), encode(&Stick::empty())?));
        }
        if this.store.get(ANCHOR_KEY).await.map_err(BotError::Store)?.is_none() {
            defaults.push((ANCHOR_KEY.to_string(), encode(&Decimal::ZERO)?));
        }
        if !defaults.is_empty() {
            this.store.merge(defaults).await.map_err(BotError::Store)?;
        }

        Ok(this)
    }

    /// Current stick and anchor price.
    pub async fn load(&self) -> Result<(Stick, Decimal)> {
        let stick = match self.store.get(STICK_KEY).await.map_err(BotError::Store)? {
            Some(value) => decode(STICK_KEY, value)?,
            None => Stick::empty(),
        };
        let anchor = match self.store.get(ANCHOR_KEY).await.map_err(BotError::Store)? {
            Some(value) => decode(ANCHOR_KEY, value)?,
            None => Decimal::ZERO,
        };
        Ok((stick, anchor))
    }

    pub async fn save_stick(&self, stick: &Stick) -> Result<()> {
        debug!(?stick, "Saving stick");
        self.store
            .set(STICK_KEY, encode(stick)?)
            .await
            .map_err(BotError::Store)
    }

    pub async fn clear_stick(&self) -> Result<()> {
        self.save_stick(&Stick::empty()).await
    }

    /// Move the anchor without touching the stick (partial fills).
    pub async fn set_anchor(&self, price: Decimal) -> Result<()> {
        self.store
            .set(ANCHOR_KEY, encode(&price)?)
            .await
            .map_err(BotError::Store)
    }

    /// A trade completed at `price`: anchor moves and the slot empties in
    /// one write.
    pub async fn record_fill(&self, price: Decimal) -> Result<()> {
        debug!(price = %price, "Recording fill");
        self.store
            .merge(vec![
                (ANCHOR_KEY.to_string(), encode(&price)?),
                (STICK_KEY.to_string(), encode(&Stick::empty())?),
            ])
            .await
            .map_err(BotError::Store)
    }

    /// Persist the outcome of an order: a fill moves the anchor, anything
    /// else becomes the new stick.
    pub async fn apply_order(&self, order: &Order) -> Result<()> {
        if order.status == OrderStatus::Closed {
            self.record_fill(order.price).await
        } else {
            self.save_stick(&Stick::from_order(order)).await
        }
    }
}
