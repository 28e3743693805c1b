//! Position sizing: how much to buy or sell to get back to the target allocation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::ValueType;
use crate::error::SizingError;
use crate::exchange::OrderSide;

/// Sizing result for one rebalance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingDecision {
    pub side: OrderSide,
    /// Quantity in base currency, before any precision normalization
    pub amount: Decimal,
    /// Base holdings valued in quote currency
    pub base_value_in_quote: Decimal,
    /// Current base allocation in percent (PERCENTAGE mode only)
    pub current_percentage: Option<Decimal>,
}

/// Calculator for rebalance trades.
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    condition_value: Decimal,
    condition_type: ValueType,
}

impl PositionSizer {
    pub fn new(condition_value: Decimal, condition_type: ValueType) -> Self {
        Self {
            condition_value,
            condition_type,
        }
    }

    /// Side and size of the trade that restores the target.
    ///
    /// # Arguments
    /// * `total_base` - Base currency held (free + used)
    /// * `_total_quote` - Quote currency held; only the exchange's limits care about it
    /// * `price` - Current price of base in quote
    ///
    /// # Errors
    /// `price <= 0` would make every quantity meaningless.
    pub fn size(
        &self,
        total_base: Decimal,
        _total_quote: Decimal,
        price: Decimal,
    ) -> Result<SizingDecision, SizingError> {
        if price <= Decimal::ZERO {
            return Err(SizingError::NonPositivePrice(price));
        }

        let base_value_in_quote = total_base * price;

        let decision = match self.condition_type {
            ValueType::Fixed => self.fixed_size(base_value_in_quote, price),
            ValueType::Percentage => self.percentage_size(total_base, base_value_in_quote, price),
        };

        Ok(decision)
    }

    /// Target is a fixed quote valuation of the base holdings.
    fn fixed_size(&self, base_value_in_quote: Decimal, price: Decimal) -> SizingDecision {
        let value_diff = base_value_in_quote - self.condition_value;

        SizingDecision {
            side: if value_diff > Decimal::ZERO {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            },
            amount: value_diff.abs() / price,
            base_value_in_quote,
            current_percentage: None,
        }
    }

    /// Target is a share of the balance.
    ///
    /// The balance approximation adds the base *quantity* to its quote
    /// value. Kept as-is: changing it changes every trade the bot makes.
    fn percentage_size(
        &self,
        total_base: Decimal,
        base_value_in_quote: Decimal,
        price: Decimal,
    ) -> SizingDecision {
        let total_balance_approx = base_value_in_quote + total_base;

        // Nothing held: 0% allocated, and no balance to move.
        let current_percentage = if total_balance_approx.is_zero() {
            Decimal::ZERO
        } else {
            base_value_in_quote / total_balance_approx * dec!(100)
        };

        let diff_percentage = (current_percentage - self.condition_value).abs();
        let amount = diff_percentage / dec!(100) * total_balance_approx / price;

        SizingDecision {
            side: if current_percentage > self.condition_value {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            },
            amount,
            base_value_in_quote,
            current_percentage: Some(current_percentage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sells_excess_value() {
        let sizer = PositionSizer::new(dec!(5000), ValueType::Fixed);
        let decision = sizer.size(dec!(1), dec!(0), dec!(10000)).unwrap();

        assert_eq!(decision.side, OrderSide::Sell);
        assert_eq!(decision.amount, dec!(0.5));
        assert_eq!(decision.base_value_in_quote, dec!(10000));
    }

    #[test]
    fn test_fixed_buys_shortfall() {
        let sizer = PositionSizer::new(dec!(10), ValueType::Fixed);
        let decision = sizer.size(dec!(0.02), dec!(100), dec!(200)).unwrap();

        // Holding 4 USDT worth, target 10: buy 6 USDT worth.
        assert_eq!(decision.side, OrderSide::Buy);
        assert_eq!(decision.amount, dec!(0.03));
    }

    #[test]
    fn test_fixed_on_target_is_zero_buy() {
        let sizer = PositionSizer::new(dec!(100), ValueType::Fixed);
        let decision = sizer.size(dec!(1), dec!(0), dec!(100)).unwrap();
        assert_eq!(decision.side, OrderSide::Buy);
        assert_eq!(decision.amount, Decimal::ZERO);
    }

    #[test]
    fn test_percentage_uses_quantity_in_denominator() {
        let sizer = PositionSizer::new(dec!(50), ValueType::Percentage);
        let decision = sizer.size(dec!(2), dec!(500), dec!(100)).unwrap();

        // 200 / (200 + 2) is ~99% allocated, far above 50%.
        assert_eq!(decision.side, OrderSide::Sell);
        let pct = decision.current_percentage.unwrap();
        assert!((pct - dec!(99.00990099)).abs() < dec!(0.00000001));
        // (pct - 50)% of 202, in base: (200 - 101) / 100
        assert!((decision.amount - dec!(0.99)).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_percentage_is_deterministic() {
        let sizer = PositionSizer::new(dec!(30), ValueType::Percentage);
        let first = sizer.size(dec!(0.75), dec!(1000), dec!(0.8)).unwrap();
        let _ = sizer.size(dec!(12), dec!(1), dec!(5000)).unwrap();
        let second = sizer.size(dec!(0.75), dec!(1000), dec!(0.8)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_percentage_low_price_buys() {
        // 0.6 quote value vs 1.35 approximated total: ~44% < 60%.
        let sizer = PositionSizer::new(dec!(60), ValueType::Percentage);
        let decision = sizer.size(dec!(0.75), dec!(0), dec!(0.8)).unwrap();
        assert_eq!(decision.side, OrderSide::Buy);
        assert!(decision.amount > Decimal::ZERO);
    }

    #[test]
    fn test_percentage_with_no_holdings() {
        let sizer = PositionSizer::new(dec!(50), ValueType::Percentage);
        let decision = sizer.size(Decimal::ZERO, dec!(1000), dec!(100)).unwrap();
        assert_eq!(decision.side, OrderSide::Buy);
        assert_eq!(decision.amount, Decimal::ZERO);
        assert_eq!(decision.current_percentage, Some(Decimal::ZERO));
    }

    #[test]
    fn test_non_positive_price_is_rejected() {
        for mode in [ValueType::Fixed, ValueType::Percentage] {
            let sizer = PositionSizer::new(dec!(50), mode);
            assert_eq!(
                sizer.size(dec!(1), dec!(1), Decimal::ZERO),
                Err(SizingError::NonPositivePrice(Decimal::ZERO))
            );
            assert_eq!(
                sizer.size(dec!(1), dec!(1), dec!(-3)),
                Err(SizingError::NonPositivePrice(dec!(-3)))
            );
        }
    }
}
