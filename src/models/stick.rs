//! The persisted descriptor of the bot's single in-flight order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::exchange::{Order, OrderSide, OrderStatus};

/// In-flight order slot. All fields are `None` when no order is outstanding.
///
/// A `Closed` status never survives a write: whoever observes the fill
/// clears the stick and moves the anchor in the same store operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stick {
    /// Nominal order quantity
    pub amount: Option<Decimal>,

    /// Quantity net of the buy-side fee, otherwise equal to `amount`
    pub actual_amount: Option<Decimal>,

    /// Limit price
    pub price: Option<Decimal>,

    /// Exchange-assigned identifier
    pub order_id: Option<String>,

    pub order_side: Option<OrderSide>,

    pub order_status: Option<OrderStatus>,
}

impl Stick {
    /// The all-null slot.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// An order we believe is still resting on the book.
    pub fn is_open(&self) -> bool {
        self.order_status == Some(OrderStatus::Open)
    }

    /// Snapshot of an order as it is persisted.
    pub fn from_order(order: &Order) -> Self {
        Self {
            amount: Some(order.amount),
            actual_amount: Some(order.actual_amount()),
            price: Some(order.price),
            order_id: Some(order.id.clone()),
            order_side: Some(order.side),
            order_status: Some(order.status),
        }
    }
}
