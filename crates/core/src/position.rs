use crate::events::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signed holding in one instrument. Zero quantity means closed; the row is
/// kept for history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    /// Cumulative realized PnL on this instrument, gross of commission.
    pub realized_pnl: Decimal,
}

impl Position {
    #[allow(clippy::missing_const_for_fn)] // String cannot be used in const fn
    fn new(ticker: String) -> Self {
        Self {
            ticker,
            quantity: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.quantity.is_zero()
    }

    #[must_use]
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.avg_cost) * self.quantity
    }

    #[must_use]
    pub fn market_value(&self, mark: Decimal) -> Decimal {
        mark * self.quantity
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTracker {
    positions: BTreeMap<String, Position>,
}

impl PositionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            positions: BTreeMap::new(),
        }
    }

    /// Applies a fill and returns the realized `PnL` when it reduced a position.
    ///
    /// Same-direction adds re-average the cost basis; reductions realize
    /// against the average cost; a fill larger than the position flips it and
    /// opens the remainder at the fill price.
    pub fn apply_fill(
        &mut self,
        ticker: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Option<Decimal> {
        let pos = self
            .positions
            .entry(ticker.to_string())
            .or_insert_with(|| Position::new(ticker.to_string()));
        let signed = quantity * side.sign();

        // Opening or adding in the same direction
        if pos.quantity.is_zero() || pos.quantity.is_sign_positive() == signed.is_sign_positive() {
            let total_cost = pos.avg_cost * pos.quantity.abs() + price * quantity;
            pos.quantity += signed;
            pos.avg_cost = total_cost / pos.quantity.abs();
            return None;
        }

        // Reducing, closing, or flipping
        let close_quantity = quantity.min(pos.quantity.abs());
        let pnl = if pos.quantity.is_sign_positive() {
            (price - pos.avg_cost) * close_quantity
        } else {
            (pos.avg_cost - price) * close_quantity
        };
        pos.realized_pnl += pnl;
        pos.quantity += close_quantity * side.sign();

        let remainder = quantity - close_quantity;
        if remainder > Decimal::ZERO {
            pos.quantity = remainder * side.sign();
            pos.avg_cost = price;
        } else if pos.quantity.is_zero() {
            pos.avg_cost = Decimal::ZERO;
        }

        Some(pnl)
    }

    #[must_use]
    pub fn get(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    #[must_use]
    pub fn quantity(&self, ticker: &str) -> Decimal {
        self.positions
            .get(ticker)
            .map_or(Decimal::ZERO, |p| p.quantity)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_open())
    }

    #[must_use]
    pub const fn all(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn adds_reaverage_cost_basis() {
        let mut tracker = PositionTracker::new();
        assert_eq!(tracker.apply_fill("SPY", Side::Buy, dec!(10), dec!(100)), None);
        assert_eq!(tracker.apply_fill("SPY", Side::Buy, dec!(10), dec!(110)), None);
        let pos = tracker.get("SPY").unwrap();
        assert_eq!(pos.quantity, dec!(20));
        assert_eq!(pos.avg_cost, dec!(105));
    }

    #[test]
    fn reduction_realizes_against_average_cost() {
        let mut tracker = PositionTracker::new();
        let _ = tracker.apply_fill("SPY", Side::Buy, dec!(20), dec!(105));
        let pnl = tracker.apply_fill("SPY", Side::Sell, dec!(5), dec!(100));
        assert_eq!(pnl, Some(dec!(-25)));
        let pos = tracker.get("SPY").unwrap();
        assert_eq!(pos.quantity, dec!(15));
        assert_eq!(pos.avg_cost, dec!(105));
    }

    #[test]
    fn close_keeps_row_for_history() {
        let mut tracker = PositionTracker::new();
        let _ = tracker.apply_fill("SPY", Side::Buy, dec!(10), dec!(100));
        let pnl = tracker.apply_fill("SPY", Side::Sell, dec!(10), dec!(120));
        assert_eq!(pnl, Some(dec!(200)));
        let pos = tracker.get("SPY").unwrap();
        assert!(!pos.is_open());
        assert_eq!(pos.realized_pnl, dec!(200));
        assert_eq!(tracker.open_positions().count(), 0);
    }

    #[test]
    fn short_side_realizes_inverted() {
        let mut tracker = PositionTracker::new();
        let _ = tracker.apply_fill("QQQ P400/P398", Side::Sell, dec!(100), dec!(0.50));
        assert_eq!(tracker.quantity("QQQ P400/P398"), dec!(-100));
        let pnl = tracker.apply_fill("QQQ P400/P398", Side::Buy, dec!(100), dec!(0.20));
        assert_eq!(pnl, Some(dec!(30)));
    }

    #[test]
    fn oversized_fill_flips_position() {
        let mut tracker = PositionTracker::new();
        let _ = tracker.apply_fill("SPY", Side::Buy, dec!(5), dec!(100));
        let pnl = tracker.apply_fill("SPY", Side::Sell, dec!(8), dec!(110));
        assert_eq!(pnl, Some(dec!(50)));
        let pos = tracker.get("SPY").unwrap();
        assert_eq!(pos.quantity, dec!(-3));
        assert_eq!(pos.avg_cost, dec!(110));
    }
}
