//! Exchange-agnostic types shared by the gateway trait and its backends.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order lifecycle status as seen by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Open => "open",
            OrderStatus::Closed => "closed",
            OrderStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Fee charged on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub cost: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

/// An order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    pub side: OrderSide,
    pub amount: Decimal,
    pub filled: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub fee: Option<Fee>,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    /// Set when the order was submitted maker-only.
    #[serde(default)]
    pub post_only: bool,
}

impl Order {
    /// A post-only order the exchange refused because it would have taken.
    pub fn is_post_only_rejection(&self) -> bool {
        self.status == OrderStatus::Canceled && self.post_only
    }

    /// Open with some, but not all, of the amount executed.
    pub fn is_partially_filled(&self) -> bool {
        self.status == OrderStatus::Open
            && self.filled > Decimal::ZERO
            && self.filled < self.amount
    }

    /// Quantity actually received: buys lose the fee when one was charged.
    pub fn actual_amount(&self) -> Decimal {
        match (&self.side, &self.fee) {
            (OrderSide::Buy, Some(fee)) if !fee.cost.is_zero() => self.amount - fee.cost,
            _ => self.amount,
        }
    }
}

/// Account balances keyed by currency code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balance {
    pub free: HashMap<String, Decimal>,
    pub used: HashMap<String, Decimal>,
    pub total: HashMap<String, Decimal>,
}

impl Balance {
    /// Total holdings of a currency, zero when the exchange omits it.
    pub fn total_of(&self, currency: &str) -> Decimal {
        self.total.get(currency).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn free_of(&self, currency: &str) -> Decimal {
        self.free.get(currency).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Price level: `(price, size)`.
pub type BookLevel = (Decimal, Decimal);

/// Top of the order book, best levels first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Best price on the side a maker order of `side` would rest on.
    pub fn best_price_for(&self, side: OrderSide) -> Option<Decimal> {
        let levels = match side {
            OrderSide::Buy => &self.bids,
            OrderSide::Sell => &self.asks,
        };
        levels.first().map(|(price, _)| *price)
    }
}

/// What a value is being normalized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionKind {
    /// Quantities are truncated towards zero.
    Amount,
    /// Prices are rounded to the nearest tick.
    Price,
}

/// Increment sizes the exchange accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketPrecision {
    /// Lot step for quantities.
    pub amount: Decimal,
    /// Tick size for prices.
    pub price: Decimal,
}

impl MarketPrecision {
    pub fn normalize(&self, value: Decimal, kind: PrecisionKind) -> Decimal {
        match kind {
            PrecisionKind::Amount => truncate_to_step(value, self.amount),
            PrecisionKind::Price => round_to_step(value, self.price),
        }
    }
}

fn truncate_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).trunc() * step).normalize()
}

fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    let ticks = (value / step)
        .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    (ticks * step).normalize()
}

/// Lower bound for one market dimension. `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Limit {
    pub min: Option<Decimal>,
}

impl Limit {
    pub fn min(min: Decimal) -> Self {
        Self { min: Some(min) }
    }

    fn violated_by(&self, value: Decimal) -> Option<Decimal> {
        self.min.filter(|min| value < *min)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketLimits {
    pub amount: Limit,
    pub price: Limit,
    pub cost: Limit,
}

/// Why an order was not placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitViolation {
    AmountBelowMin { amount: Decimal, min: Decimal },
    PriceBelowMin { price: Decimal, min: Decimal },
    CostBelowMin { cost: Decimal, min: Decimal },
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitViolation::AmountBelowMin { amount, min } => {
                write!(f, "limits.amount.min - {}, amount - {}", min, amount)
            }
            LimitViolation::PriceBelowMin { price, min } => {
                write!(f, "limits.price.min - {}, price - {}", min, price)
            }
            LimitViolation::CostBelowMin { cost, min } => {
                write!(f, "limits.cost.min - {}, cost {}", min, cost)
            }
        }
    }
}

impl MarketLimits {
    /// First violated limit, checked in amount, price, cost order.
    pub fn check(&self, amount: Decimal, price: Decimal) -> Option<LimitViolation> {
        if let Some(min) = self.amount.violated_by(amount) {
            return Some(LimitViolation::AmountBelowMin { amount, min });
        }
        if let Some(min) = self.price.violated_by(price) {
            return Some(LimitViolation::PriceBelowMin { price, min });
        }
        let cost = amount * price;
        self.cost
            .violated_by(cost)
            .map(|min| LimitViolation::CostBelowMin { cost, min })
    }
}

/// Trading rules for the configured pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub symbol: String,
    pub precision: MarketPrecision,
    pub limits: MarketLimits,
}
