//! Exchange access behind a single capability trait.
//!
//! The bot only ever talks to [`ExchangeGateway`]. Concrete backends are
//! chosen once, at construction time, by [`connect`].

mod auth;
mod binance;
#[cfg(test)]
pub mod mock;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::GatewayError;
use crate::trading::{BotConfig, Credentials, ExchangeId};

pub use binance::BinanceGateway;
pub use types::*;

/// Operations the rebalancer needs from an exchange account.
///
/// Every call is scoped to the pair the gateway was built for.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Fetch and cache market metadata. Called once at startup.
    async fn load_markets(&self) -> Result<(), GatewayError>;

    /// Balances of the pair's base and quote currencies.
    async fn fetch_balance(&self) -> Result<Balance, GatewayError>;

    /// Last traded price.
    async fn get_last_price(&self) -> Result<Decimal, GatewayError>;

    async fn get_order_book(&self) -> Result<OrderBook, GatewayError>;

    /// Precision and limits for the pair.
    async fn get_market(&self) -> Result<Market, GatewayError>;

    /// Normalize a value to the market's precision.
    /// Amounts truncate, prices round.
    async fn decimal_to_precision(
        &self,
        value: Decimal,
        kind: PrecisionKind,
    ) -> Result<Decimal, GatewayError> {
        let market = self.get_market().await?;
        Ok(market.precision.normalize(value, kind))
    }

    /// Place a limit order and return its state right after placement.
    ///
    /// A post-only order that would have taken liquidity comes back with
    /// status `Canceled` and `post_only` set; it is not an error.
    async fn create_order(
        &self,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        post_only: bool,
    ) -> Result<Order, GatewayError>;

    async fn fetch_order(&self, id: &str) -> Result<Order, GatewayError>;

    async fn cancel_order(&self, id: &str) -> Result<(), GatewayError>;
}

/// Build the backend selected by the bot configuration.
pub fn connect(
    config: &BotConfig,
    credentials: Credentials,
) -> anyhow::Result<Arc<dyn ExchangeGateway>> {
    let pair = config.pair()?;
    match config.exchange {
        ExchangeId::Binance => Ok(Arc::new(BinanceGateway::new(
            pair,
            credentials,
            config.testnet,
        )?)),
    }
}
