//! Error taxonomy for the rebalancing bot.
//!
//! Gateway backends report [`GatewayError`]; everything a cycle can fail
//! with is folded into [`BotError`]. Limit halts and exhausted chase
//! retries are *outcomes*, not errors, and never show up here.

use rust_decimal::Decimal;

/// Failure reported by an exchange backend.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transport failure, timeout, or exchange-side outage.
    #[error("network error: {0}")]
    Network(String),

    /// The exchange understood the request and refused it
    /// (insufficient balance, invalid parameters, unknown order, ...).
    #[error("exchange error: {0}")]
    Exchange(String),

    /// Anything we could not classify, e.g. an undecodable response.
    #[error("unexpected gateway error: {0}")]
    Unexpected(String),
}

/// Invalid input to the position sizer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizingError {
    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),
}

/// Errors surfaced by a rebalance cycle or at startup.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("sizing error: {0}")]
    Sizing(#[from] SizingError),

    #[error("state store error: {0:#}")]
    Store(anyhow::Error),
}

impl BotError {
    /// Whether the process must stop instead of waiting for the next tick.
    ///
    /// Network and exchange hiccups leave the persisted state as last known
    /// and are retried naturally on the next tick. Anything that could mean
    /// our view of the account is inconsistent terminates.
    pub fn is_fatal(&self) -> bool {
        match self {
            BotError::Configuration(_) | BotError::Store(_) => true,
            BotError::Gateway(GatewayError::Unexpected(_)) => true,
            BotError::Gateway(_) | BotError::Sizing(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
