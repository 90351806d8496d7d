use deltadesk_core::{BrokerConfig, Side};
use rust_decimal::Decimal;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Slippage and commission model shared by the paper broker and the
/// backtester, so both price fills identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillModel {
    commission_per_trade: Decimal,
    slippage_bps: Decimal,
}

/// Price and costs for one simulated execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillQuote {
    pub price: Decimal,
    /// Per-unit degradation against the reference price.
    pub slippage: Decimal,
    pub commission: Decimal,
}

impl FillQuote {
    /// Cash leaving the account for a buy, or entering it for a sell.
    #[must_use]
    pub fn cash_delta(&self, side: Side, quantity: Decimal) -> Decimal {
        match side {
            Side::Buy => -(self.price * quantity) - self.commission,
            Side::Sell => self.price * quantity - self.commission,
        }
    }
}

impl FillModel {
    #[must_use]
    pub const fn new(commission_per_trade: Decimal, slippage_bps: Decimal) -> Self {
        Self {
            commission_per_trade,
            slippage_bps,
        }
    }

    #[must_use]
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.commission_per_trade, config.slippage_bps)
    }

    #[must_use]
    pub const fn commission_per_trade(&self) -> Decimal {
        self.commission_per_trade
    }

    /// Moves the price against the trader: up for buys, down for sells.
    #[must_use]
    pub fn apply_slippage(&self, price: Decimal, side: Side) -> Decimal {
        let slippage = price * self.slippage_bps / BPS;
        match side {
            Side::Buy => price + slippage,
            Side::Sell => price - slippage,
        }
    }

    #[must_use]
    pub fn quote(&self, side: Side, reference_price: Decimal) -> FillQuote {
        let price = self.apply_slippage(reference_price, side);
        FillQuote {
            price,
            slippage: (price - reference_price).abs(),
            commission: self.commission_per_trade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn slippage_is_adverse() {
        let model = FillModel::new(dec!(1), dec!(2));
        let buy = model.quote(Side::Buy, dec!(100));
        let sell = model.quote(Side::Sell, dec!(100));
        assert_eq!(buy.price, dec!(100.02));
        assert_eq!(sell.price, dec!(99.98));
        assert_eq!(buy.slippage, dec!(0.02));
        assert_eq!(buy.cash_delta(Side::Buy, dec!(10)), dec!(-1001.2));
        assert_eq!(sell.cash_delta(Side::Sell, dec!(10)), dec!(998.8));
    }
}
