//! Intraday backtest of same-day-expiry credit spreads over captured chains.
//!
//! One spread at most per day. An open spread is marked at every tick from
//! the leg mids and closed on the first of: profit target, stop loss, the
//! force-exit cutoff, or the day's last captured chain.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use deltadesk_core::{
    Bar, CancelFlag, ChainSlice, CoreError, CoreResult, MarketClock, MarketSnapshot, Side,
    SnapshotProvider, SpreadProposal, StrategyParams,
};
use deltadesk_execution::FillModel;
use deltadesk_strategy::{zero_dte, EvalContext, Evaluation, StrategyVariant};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{MetricsCalculator, PerformanceMetrics};
use crate::portfolio::EquityPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadBacktestConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Credit spread strategy parameters (underlying, delta, width, ...).
    #[serde(default)]
    pub params: StrategyParams,
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
    /// Close once the open profit reaches this fraction of the credit.
    #[serde(default = "default_profit_take")]
    pub profit_take_pct: Decimal,
    /// Close once the open loss reaches this multiple of the credit.
    #[serde(default = "default_stop_loss")]
    pub stop_loss_pct: Decimal,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: Decimal,
    #[serde(default = "default_commission")]
    pub commission_per_trade: Decimal,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: Decimal,
    #[serde(default = "default_multiplier")]
    pub contract_multiplier: Decimal,
}

const fn default_interval() -> u32 {
    5
}

fn default_profit_take() -> Decimal {
    Decimal::new(50, 2)
}

fn default_stop_loss() -> Decimal {
    Decimal::TWO
}

fn default_initial_cash() -> Decimal {
    Decimal::from(100_000)
}

const fn default_commission() -> Decimal {
    Decimal::ONE
}

const fn default_slippage_bps() -> Decimal {
    Decimal::TWO
}

fn default_multiplier() -> Decimal {
    Decimal::ONE_HUNDRED
}

impl SpreadBacktestConfig {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            params: StrategyParams::new(),
            interval_minutes: default_interval(),
            profit_take_pct: default_profit_take(),
            stop_loss_pct: default_stop_loss(),
            initial_cash: default_initial_cash(),
            commission_per_trade: default_commission(),
            slippage_bps: default_slippage_bps(),
            contract_multiplier: default_multiplier(),
        }
    }

    /// # Errors
    ///
    /// Returns `CoreError::Configuration` describing the first invalid field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.start > self.end {
            return Err(CoreError::config(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        if self.interval_minutes == 0 {
            return Err(CoreError::config("interval_minutes must be at least 1"));
        }
        if self.profit_take_pct <= Decimal::ZERO || self.stop_loss_pct <= Decimal::ZERO {
            return Err(CoreError::config("profit_take_pct and stop_loss_pct must be positive"));
        }
        if self.initial_cash <= Decimal::ZERO {
            return Err(CoreError::config("initial_cash must be positive"));
        }
        if self.contract_multiplier <= Decimal::ZERO {
            return Err(CoreError::config("contract_multiplier must be positive"));
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadExit {
    ProfitTake,
    StopLoss,
    ForceExit,
    /// The day's captures ended before any other exit fired.
    EndOfData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadTrade {
    pub date: NaiveDate,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub short_strike: Decimal,
    pub long_strike: Decimal,
    pub contracts: u32,
    /// Credit received per share after slippage.
    pub entry_credit: Decimal,
    /// Debit paid per share to close, after slippage.
    pub exit_debit: Decimal,
    /// Net of both commissions.
    pub pnl: Decimal,
    pub exit_reason: SpreadExit,
    pub minutes_held: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadBacktestResult {
    pub strategy: String,
    pub underlying: String,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<SpreadTrade>,
    pub metrics: PerformanceMetrics,
    /// Worst open PnL seen on any tick.
    pub mae: Decimal,
    /// Best open PnL seen on any tick.
    pub mfe: Decimal,
}

/// One trading day of captured chains, each paired with the tick it was
/// looked up at, plus the bias bars available before the open.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionChains {
    pub ticks: Vec<(DateTime<Utc>, ChainSlice)>,
    pub bars: Vec<Bar>,
}

/// Chain captures for a date range, keyed by trading day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntradayChains {
    days: BTreeMap<NaiveDate, SessionChains>,
}

impl IntradayChains {
    #[must_use]
    pub fn from_days(days: impl IntoIterator<Item = (NaiveDate, SessionChains)>) -> Self {
        Self {
            days: days.into_iter().collect(),
        }
    }

    /// Looks up the chain at every `interval` from the open to the force-exit
    /// cutoff of each weekday in `[start, end]`. Captures from an earlier
    /// day are not reused.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::DataUnavailable` when no day has any capture, and
    /// propagates other provider failures.
    pub async fn load(
        provider: &dyn SnapshotProvider,
        variant: &StrategyVariant,
        clock: &MarketClock,
        start: NaiveDate,
        end: NaiveDate,
        interval_minutes: u32,
    ) -> CoreResult<Self> {
        let needs = variant.requirements();
        let step = Duration::minutes(i64::from(interval_minutes.max(1)));
        let mut days = BTreeMap::new();

        for day in start.iter_days().take_while(|d| *d <= end) {
            if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }
            let cutoff = clock.at(day, clock.force_exit())?;
            let mut now = clock.at(day, clock.open())?;
            let mut ticks = Vec::new();
            while now <= cutoff {
                match provider.chain(&needs.symbol, now).await {
                    Ok(chain) if clock.trading_day(chain.as_of) == day => ticks.push((now, chain)),
                    Ok(_) | Err(CoreError::DataUnavailable { .. }) => {}
                    Err(e) => return Err(e),
                }
                now += step;
            }
            if ticks.is_empty() {
                debug!(%day, underlying = %needs.symbol, "no captures");
                continue;
            }

            let bars = if needs.bars > 0 {
                let through = day.pred_opt().unwrap_or(day);
                match provider.history(&needs.symbol, through, needs.bars).await {
                    Ok(bars) => bars,
                    Err(e @ CoreError::DataUnavailable { .. }) => {
                        warn!(%day, error = %e, "no bias bars");
                        Vec::new()
                    }
                    Err(e) => return Err(e),
                }
            } else {
                Vec::new()
            };
            days.insert(day, SessionChains { ticks, bars });
        }

        if days.is_empty() {
            return Err(CoreError::unavailable(
                needs.symbol,
                format!("no option chains captured between {start} and {end}"),
            ));
        }
        Ok(Self { days })
    }

    pub fn days(&self) -> impl Iterator<Item = (&NaiveDate, &SessionChains)> {
        self.days.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[derive(Debug, Clone)]
struct OpenSpread {
    spread: SpreadProposal,
    entry_time: DateTime<Utc>,
    /// Entry fill per share.
    credit: Decimal,
    quantity: Decimal,
    /// Latest mark per share, the entry mid until a chain prices it.
    mark: Decimal,
    mark_time: DateTime<Utc>,
}

pub struct SpreadBacktest {
    config: SpreadBacktestConfig,
    variant: StrategyVariant,
    fill_model: FillModel,
    clock: MarketClock,
}

impl SpreadBacktest {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for invalid settings or strategy
    /// parameters.
    pub fn new(config: SpreadBacktestConfig) -> CoreResult<Self> {
        config.validate()?;
        let variant = StrategyVariant::parse(zero_dte::NAME, &config.params)?;
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
    pub const fn variant(&self) -> &StrategyVariant {
        &self.variant
    }

    #[must_use]
    pub const fn config(&self) -> &SpreadBacktestConfig {
        &self.config
    }

    /// Runs the simulation. Identical inputs give identical results.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Cancelled` when `cancel` fires between days,
    /// `CoreError::DataUnavailable` without captures, or the evaluator's
    /// error for malformed chains.
    pub fn run(&self, chains: &IntradayChains, cancel: &CancelFlag) -> CoreResult<SpreadBacktestResult> {
        let (Some(first), Some(last)) = (
            chains.days.keys().next().copied(),
            chains.days.keys().next_back().copied(),
        ) else {
            return Err(CoreError::unavailable(
                self.variant.symbol(),
                "no option chains to backtest",
            ));
        };
        info!(
            underlying = %self.variant.symbol(),
            start = %first,
            end = %last,
            days = chains.days.len(),
            "spread backtest started"
        );

        let mut cash = self.config.initial_cash;
        let mut trades = Vec::new();
        let mut curve = Vec::with_capacity(chains.days.len());
        let mut metrics = MetricsCalculator::new(self.config.initial_cash, (last - first).num_days());
        let (mut mae, mut mfe) = (Decimal::ZERO, Decimal::ZERO);

        for (&date, session) in &chains.days {
            cancel.checkpoint()?;
            let mut open: Option<OpenSpread> = None;
            let mut traded = false;

            for (tick, chain) in &session.ticks {
                let Some(position) = open.as_mut() else {
                    if !traded {
                        open = self.try_entry(*tick, chain, &session.bars, &mut cash)?;
                        traded = open.is_some();
                    }
                    continue;
                };

                if let Some(mark) = chain.spread_mark(&position.spread) {
                    position.mark = mark;
                }
                position.mark_time = *tick;
                let open_pnl = (position.credit - position.mark) * position.quantity;
                mae = mae.min(open_pnl);
                mfe = mfe.max(open_pnl);

                let target = position.credit * position.quantity;
                let exit = if open_pnl >= target * self.config.profit_take_pct {
                    Some(SpreadExit::ProfitTake)
                } else if open_pnl <= -target * self.config.stop_loss_pct {
                    Some(SpreadExit::StopLoss)
                } else if self.clock.is_past_force_exit(*tick) {
                    Some(SpreadExit::ForceExit)
                } else {
                    None
                };
                if let Some(reason) = exit {
                    if let Some(position) = open.take() {
                        let trade = self.close(date, position, reason, &mut cash);
                        metrics.add_trade(trade.pnl);
                        trades.push(trade);
                    }
                }
            }

            if let Some(position) = open.take() {
                let trade = self.close(date, position, SpreadExit::EndOfData, &mut cash);
                metrics.add_trade(trade.pnl);
                trades.push(trade);
            }

            metrics.push_equity(cash);
            curve.push(EquityPoint { date, equity: cash });
        }

        let result = SpreadBacktestResult {
            strategy: self.variant.name().to_string(),
            underlying: self.variant.symbol().to_string(),
            equity_curve: curve,
            metrics: metrics.calculate(cash),
            trades,
            mae,
            mfe,
        };
        info!(
            underlying = %result.underlying,
            final_equity = %result.metrics.final_equity,
            trades = result.metrics.num_trades,
            win_rate = result.metrics.win_rate,
            "spread backtest finished"
        );
        Ok(result)
    }

    fn try_entry(
        &self,
        tick: DateTime<Utc>,
        chain: &ChainSlice,
        bars: &[Bar],
        cash: &mut Decimal,
    ) -> CoreResult<Option<OpenSpread>> {
        let snapshot = MarketSnapshot {
            ticker: self.variant.symbol().to_string(),
            as_of: tick,
            bars: bars.to_vec(),
            chain: Some(chain.clone()),
        };
        let ctx = EvalContext {
            clock: &self.clock,
            holding: false,
        };
        let Evaluation::Spread(spread) = self.variant.evaluate(&snapshot, &ctx)? else {
            return Ok(None);
        };

        let quantity = Decimal::from(spread.contracts) * self.config.contract_multiplier;
        let quote = self.fill_model.quote(Side::Sell, spread.credit);
        *cash += quote.cash_delta(Side::Sell, quantity);
        debug!(
            %tick,
            short = %spread.short_strike,
            long = %spread.long_strike,
            credit = %quote.price,
            "spread opened"
        );
        Ok(Some(OpenSpread {
            mark: spread.credit,
            spread,
            entry_time: tick,
            credit: quote.price,
            quantity,
            mark_time: tick,
        }))
    }

    fn close(
        &self,
        date: NaiveDate,
        position: OpenSpread,
        reason: SpreadExit,
        cash: &mut Decimal,
    ) -> SpreadTrade {
        let quote = self.fill_model.quote(Side::Buy, position.mark.max(Decimal::ZERO));
        *cash += quote.cash_delta(Side::Buy, position.quantity);
        let pnl = (position.credit - quote.price) * position.quantity
            - quote.commission * Decimal::TWO;
        debug!(%date, ?reason, debit = %quote.price, %pnl, "spread closed");
        SpreadTrade {
            date,
            entry_time: position.entry_time,
            exit_time: position.mark_time,
            short_strike: position.spread.short_strike,
            long_strike: position.spread.long_strike,
            contracts: position.spread.contracts,
            entry_credit: position.credit,
            exit_debit: quote.price,
            pnl,
            exit_reason: reason,
            minutes_held: (position.mark_time - position.entry_time).num_minutes(),
        }
    }
}
