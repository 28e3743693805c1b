//! Decides whether the price has moved far enough from the anchor to act.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::ValueType;

/// Result of one threshold check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdDecision {
    /// `|anchor - price|`
    pub price_diff: Decimal,
    /// Move relative to the anchor, in percent. `None` when the anchor is
    /// zero and the ratio is undefined.
    pub percentage_diff: Option<Decimal>,
    pub triggered: bool,
}

/// Threshold rule built from `min_diff_value` / `min_diff_type`.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdEvaluator {
    min_diff_value: Decimal,
    min_diff_type: ValueType,
}

impl ThresholdEvaluator {
    pub fn new(min_diff_value: Decimal, min_diff_type: ValueType) -> Self {
        Self {
            min_diff_value,
            min_diff_type,
        }
    }

    /// FIXED triggers on `diff >= min`, PERCENTAGE on `diff% > min`.
    ///
    /// In PERCENTAGE mode a zero anchor (nothing filled yet) always
    /// triggers: the relative move from nothing is unbounded.
    pub fn evaluate(&self, anchor: Decimal, price: Decimal) -> ThresholdDecision {
        let price_diff = (anchor - price).abs();

        match self.min_diff_type {
            ValueType::Fixed => ThresholdDecision {
                price_diff,
                percentage_diff: None,
                triggered: price_diff >= self.min_diff_value,
            },
            ValueType::Percentage => {
                if anchor.is_zero() {
                    return ThresholdDecision {
                        price_diff,
                        percentage_diff: None,
                        triggered: true,
                    };
                }
                let percentage_diff = price_diff / anchor * dec!(100);
                ThresholdDecision {
                    price_diff,
                    percentage_diff: Some(percentage_diff),
                    triggered: percentage_diff > self.min_diff_value,
                }
            }
        }
    }
}
