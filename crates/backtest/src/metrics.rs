use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const TRADING_DAYS: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub total_return: Decimal,
    pub cagr: f64,
    /// Largest peak-to-trough fall as a positive fraction of the peak.
    pub max_drawdown: Decimal,
    pub num_trades: usize,
    pub win_rate: f64,
    /// Annualised return over annualised volatility of daily equity changes.
    pub sharpe_like: f64,
}

/// Derives metrics from an equity curve and closed-trade PnLs.
pub struct MetricsCalculator {
    initial_equity: Decimal,
    equity_curve: Vec<Decimal>,
    trade_pnls: Vec<Decimal>,
    calendar_days: i64,
}

impl MetricsCalculator {
    #[must_use]
    pub fn new(initial_equity: Decimal, calendar_days: i64) -> Self {
        Self {
            initial_equity,
            equity_curve: Vec::new(),
            trade_pnls: Vec::new(),
            calendar_days,
        }
    }

    pub fn push_equity(&mut self, equity: Decimal) {
        self.equity_curve.push(equity);
    }

    pub fn add_trade(&mut self, pnl: Decimal) {
        self.trade_pnls.push(pnl);
    }

    #[must_use]
    pub fn calculate(&self, final_equity: Decimal) -> PerformanceMetrics {
        let total_return = if self.initial_equity.is_zero() {
            Decimal::ZERO
        } else {
            (final_equity - self.initial_equity) / self.initial_equity
        };

        #[allow(clippy::cast_precision_loss)]
        let years = (self.calendar_days.max(1) as f64 / DAYS_PER_YEAR).max(0.01);
        let growth = if self.initial_equity > Decimal::ZERO {
            (final_equity / self.initial_equity).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        let cagr = if final_equity > Decimal::ZERO && growth > 0.0 {
            growth.powf(1.0 / years) - 1.0
        } else {
            -1.0
        };

        let wins = self.trade_pnls.iter().filter(|p| **p > Decimal::ZERO).count();
        #[allow(clippy::cast_precision_loss)]
        let win_rate = if self.trade_pnls.is_empty() {
            0.0
        } else {
            wins as f64 / self.trade_pnls.len() as f64
        };

        let ann_vol = self.annualised_volatility();
        let sharpe_like = if ann_vol > 0.0 { cagr / ann_vol } else { 0.0 };

        PerformanceMetrics {
            initial_equity: self.initial_equity,
            final_equity,
            total_return,
            cagr,
            max_drawdown: self.calculate_max_drawdown(),
            num_trades: self.trade_pnls.len(),
            win_rate,
            sharpe_like,
        }
    }

    /// Sample standard deviation of daily returns scaled to a year. With
    /// fewer than two returns the volatility is taken as 1.
    fn annualised_volatility(&self) -> f64 {
        let returns: Vec<f64> = self
            .equity_curve
            .windows(2)
            .filter(|w| !w[0].is_zero())
            .filter_map(|w| ((w[1] - w[0]) / w[0]).to_f64())
            .collect();
        if returns.len() < 2 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt() * TRADING_DAYS.sqrt()
    }

    fn calculate_max_drawdown(&self) -> Decimal {
        let mut max_drawdown = Decimal::ZERO;
        let Some(mut peak) = self.equity_curve.first().copied() else {
            return max_drawdown;
        };

        for &equity in &self.equity_curve {
            if equity > peak {
                peak = equity;
            }
            if peak > Decimal::ZERO {
                let drawdown = (peak - equity) / peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        max_drawdown
    }
}
