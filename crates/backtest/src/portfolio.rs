//! Multi-ticker portfolio backtest on daily bars.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use deltadesk_core::{
    CancelFlag, CoreError, CoreResult, MarketClock, MarketSnapshot, Side, SignalValue,
    StrategyParams,
};
use deltadesk_execution::FillModel;
use deltadesk_strategy::{EvalContext, StrategyVariant};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data_provider::HistoricalBars;
use crate::metrics::{MetricsCalculator, PerformanceMetrics};

pub const CLOSED_AT_END: &str = "closed_at_end";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub params: StrategyParams,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: Decimal,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Fraction of current equity committed to each new position.
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: Decimal,
    #[serde(default = "default_commission")]
    pub commission_per_trade: Decimal,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: Decimal,
}

fn default_strategy() -> String {
    deltadesk_strategy::sma::NAME.to_string()
}

pub(crate) fn default_initial_cash() -> Decimal {
    Decimal::from(100_000)
}

const fn default_max_positions() -> usize {
    3
}

fn default_risk_per_trade() -> Decimal {
    Decimal::new(2, 2)
}

pub(crate) const fn default_commission() -> Decimal {
    Decimal::ONE
}

pub(crate) const fn default_slippage_bps() -> Decimal {
    Decimal::TWO
}

impl PortfolioConfig {
    #[must_use]
    pub fn new(tickers: Vec<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            tickers,
            start,
            end,
            strategy: default_strategy(),
            params: StrategyParams::new(),
            initial_cash: default_initial_cash(),
            max_positions: default_max_positions(),
            risk_per_trade: default_risk_per_trade(),
            commission_per_trade: default_commission(),
            slippage_bps: default_slippage_bps(),
        }
    }

    /// # Errors
    ///
    /// Returns `CoreError::Configuration` describing the first invalid field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.tickers.is_empty() {
            return Err(CoreError::config("backtest needs at least one ticker"));
        }
        if self.start > self.end {
            return Err(CoreError::config(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        if self.initial_cash <= Decimal::ZERO {
            return Err(CoreError::config("initial_cash must be positive"));
        }
        if self.max_positions == 0 {
            return Err(CoreError::config("max_positions must be at least 1"));
        }
        if self.risk_per_trade <= Decimal::ZERO || self.risk_per_trade > Decimal::ONE {
            return Err(CoreError::config("risk_per_trade must be in (0, 1]"));
        }
        if self.commission_per_trade.is_sign_negative() || self.slippage_bps.is_sign_negative() {
            return Err(CoreError::config("commission and slippage cannot be negative"));
        }
        Ok(())
    }

    #[must_use]
    pub fn fill_model(&self) -> FillModel {
        FillModel::new(self.commission_per_trade, self.slippage_bps)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: Decimal,
}

/// A round trip: entry fill, exit fill and PnL net of both commissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticker: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    pub exit_date: NaiveDate,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<ClosedTrade>,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone)]
struct OpenLot {
    quantity: Decimal,
    entry_price: Decimal,
    entry_date: NaiveDate,
}

pub struct PortfolioBacktest {
    config: PortfolioConfig,
    variant: StrategyVariant,
    fill_model: FillModel,
    clock: MarketClock,
}

impl PortfolioBacktest {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for invalid settings, invalid
    /// strategy parameters, or a strategy that needs intraday option chains.
    pub fn new(config: PortfolioConfig) -> CoreResult<Self> {
        config.validate()?;
        let variant = StrategyVariant::parse(&config.strategy, &config.params)?;
        if !variant.is_bar_strategy() {
            return Err(CoreError::config(format!(
                "{} cannot run as a daily-bar portfolio backtest",
                variant.name()
            )));
        }
        Ok(Self {
            fill_model: config.fill_model(),
            config,
            variant,
            clock: MarketClock::new_york(),
        })
    }

    #[must_use]
    pub const fn with_clock(mut self, clock: MarketClock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    /// Runs the simulation. Identical inputs give identical results.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Cancelled` when `cancel` fires between dates,
    /// `CoreError::DataUnavailable` without bars, or the evaluator's error for
    /// malformed data.
    pub fn run(&self, bars: &HistoricalBars, cancel: &CancelFlag) -> CoreResult<BacktestResult> {
        let dates = bars.dates();
        let (Some(first), Some(last)) = (dates.first().copied(), dates.last().copied()) else {
            return Err(CoreError::unavailable(
                self.config.tickers.join(","),
                "no bars to backtest",
            ));
        };
        info!(
            strategy = self.variant.name(),
            tickers = ?bars.tickers(),
            start = %first,
            end = %last,
            "portfolio backtest started"
        );

        let variants: BTreeMap<&str, StrategyVariant> = bars
            .tickers()
            .into_iter()
            .map(|t| (t, self.variant.for_symbol(t)))
            .collect();

        let mut cash = self.config.initial_cash;
        let mut open: BTreeMap<String, OpenLot> = BTreeMap::new();
        let mut last_close: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut trades = Vec::new();
        let mut curve = Vec::with_capacity(dates.len());
        let mut metrics = MetricsCalculator::new(self.config.initial_cash, (last - first).num_days());

        for &date in &dates {
            cancel.checkpoint()?;

            for ticker in variants.keys() {
                if let Some(close) = bars.close_on(ticker, date) {
                    last_close.insert((*ticker).to_string(), close);
                }
            }

            // Exits first, so freed slots are available to today's entries.
            let held: Vec<String> = open.keys().cloned().collect();
            for ticker in held {
                let Some(variant) = variants.get(ticker.as_str()) else {
                    continue;
                };
                if self.signal_on(bars, variant, &ticker, date, true)? != Some(SignalValue::Sell) {
                    continue;
                }
                if let (Some(lot), Some(close)) = (open.remove(&ticker), bars.close_on(&ticker, date)) {
                    let trade = self.close_lot(&ticker, lot, close, date, None, &mut cash);
                    metrics.add_trade(trade.pnl);
                    trades.push(trade);
                }
            }

            for (ticker, variant) in &variants {
                if open.len() >= self.config.max_positions {
                    break;
                }
                if open.contains_key(*ticker) {
                    continue;
                }
                if self.signal_on(bars, variant, ticker, date, false)? != Some(SignalValue::Buy) {
                    continue;
                }
                let Some(close) = bars.close_on(ticker, date) else {
                    continue;
                };
                let equity = Self::mark_to_market(cash, &open, &last_close);
                if let Some(lot) = self.open_lot(ticker, close, date, equity, &mut cash) {
                    open.insert((*ticker).to_string(), lot);
                }
            }

            // Whatever is still open is flattened on the last date, before its
            // equity point, so the curve ends at the final equity.
            if date == last {
                for (ticker, lot) in std::mem::take(&mut open) {
                    let close = last_close.get(&ticker).copied().unwrap_or(lot.entry_price);
                    let trade = self.close_lot(&ticker, lot, close, last, Some(CLOSED_AT_END), &mut cash);
                    metrics.add_trade(trade.pnl);
                    trades.push(trade);
                }
            }

            let equity = Self::mark_to_market(cash, &open, &last_close);
            metrics.push_equity(equity);
            curve.push(EquityPoint { date, equity });
        }

        let result = BacktestResult {
            strategy: self.variant.name().to_string(),
            equity_curve: curve,
            metrics: metrics.calculate(cash),
            trades,
        };
        info!(
            strategy = %result.strategy,
            final_equity = %result.metrics.final_equity,
            total_return = %result.metrics.total_return,
            max_drawdown = %result.metrics.max_drawdown,
            trades = result.metrics.num_trades,
            "portfolio backtest finished"
        );
        Ok(result)
    }

    /// Signal at `date` from the bars up to and including it, or `None` when
    /// the ticker has no bar that day.
    fn signal_on(
        &self,
        bars: &HistoricalBars,
        variant: &StrategyVariant,
        ticker: &str,
        date: NaiveDate,
        holding: bool,
    ) -> CoreResult<Option<SignalValue>> {
        let Some(idx) = bars.index_on(ticker, date) else {
            return Ok(None);
        };
        let series = bars.series(ticker);
        let lookback = variant.requirements().bars.max(1);
        let from = (idx + 1).saturating_sub(lookback);
        let snapshot = MarketSnapshot::from_bars(
            ticker,
            self.clock.at(date, self.clock.close())?,
            series[from..=idx].to_vec(),
        );
        let ctx = EvalContext {
            clock: &self.clock,
            holding,
        };
        Ok(Some(variant.evaluate(&snapshot, &ctx)?.signal_value()))
    }

    fn mark_to_market(
        cash: Decimal,
        open: &BTreeMap<String, OpenLot>,
        last_close: &BTreeMap<String, Decimal>,
    ) -> Decimal {
        cash + open
            .iter()
            .map(|(t, lot)| lot.quantity * last_close.get(t).copied().unwrap_or(lot.entry_price))
            .sum::<Decimal>()
    }

    fn open_lot(
        &self,
        ticker: &str,
        close: Decimal,
        date: NaiveDate,
        equity: Decimal,
        cash: &mut Decimal,
    ) -> Option<OpenLot> {
        let quote = self.fill_model.quote(Side::Buy, close);
        if quote.price <= Decimal::ZERO {
            return None;
        }
        let quantity = (self.config.risk_per_trade * equity / quote.price).floor();
        if quantity <= Decimal::ZERO {
            debug!(ticker, %date, "position size rounds to zero, skipping entry");
            return None;
        }
        let cost = -quote.cash_delta(Side::Buy, quantity);
        if cost > *cash {
            debug!(ticker, %date, %cost, cash = %*cash, "insufficient cash, skipping entry");
            return None;
        }
        *cash -= cost;
        debug!(ticker, %date, %quantity, price = %quote.price, "entry");
        Some(OpenLot {
            quantity,
            entry_price: quote.price,
            entry_date: date,
        })
    }

    fn close_lot(
        &self,
        ticker: &str,
        lot: OpenLot,
        close: Decimal,
        date: NaiveDate,
        note: Option<&str>,
        cash: &mut Decimal,
    ) -> ClosedTrade {
        let quote = self.fill_model.quote(Side::Sell, close);
        *cash += quote.cash_delta(Side::Sell, lot.quantity);
        let pnl = (quote.price - lot.entry_price) * lot.quantity
            - quote.commission * Decimal::TWO;
        debug!(ticker, %date, quantity = %lot.quantity, price = %quote.price, %pnl, "exit");
        ClosedTrade {
            ticker: ticker.to_string(),
            side: Side::Sell,
            quantity: lot.quantity,
            entry_date: lot.entry_date,
            entry_price: lot.entry_price,
            exit_date: date,
            exit_price: quote.price,
            pnl,
            note: note.map(str::to_string),
        }
    }
}
