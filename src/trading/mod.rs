//! Trading logic: threshold check, position sizing, reconciliation, order placement.

mod config;
mod order_manager;
mod position_sizer;
mod reconciler;
mod threshold;

pub use config::{BotConfig, BotRegistry, Credentials, ExchangeId, TradingPair, ValueType};
pub use order_manager::{MarketSnapshot, OrderManager, PlacementOutcome};
pub use position_sizer::{PositionSizer, SizingDecision};
pub use reconciler::{ReconcileAction, StaleOrderReconciler};
pub use threshold::{ThresholdDecision, ThresholdEvaluator};
