//! Walk-forward validation of the moving-average crossover: pick the best
//! (fast, slow) pair on a training window, score it on the window after, then
//! slide forward by the test length.

use chrono::NaiveDate;
use deltadesk_core::{CancelFlag, CoreError, CoreResult, MarketClock};
use deltadesk_strategy::sma;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data_provider::HistoricalBars;
use crate::portfolio::{self, BacktestResult, PortfolioBacktest, PortfolioConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Trading dates per training window.
    #[serde(default = "default_train_days")]
    pub train_days: usize,
    /// Trading dates per test window, also the slide between folds.
    #[serde(default = "default_test_days")]
    pub test_days: usize,
    #[serde(default = "default_fast_values")]
    pub fast_values: Vec<usize>,
    #[serde(default = "default_slow_values")]
    pub slow_values: Vec<usize>,
    #[serde(default = "portfolio::default_initial_cash")]
    pub initial_cash: Decimal,
    #[serde(default = "portfolio::default_commission")]
    pub commission_per_trade: Decimal,
    #[serde(default = "portfolio::default_slippage_bps")]
    pub slippage_bps: Decimal,
}

const fn default_train_days() -> usize {
    504
}

const fn default_test_days() -> usize {
    63
}

fn default_fast_values() -> Vec<usize> {
    vec![5, 10, 20]
}

fn default_slow_values() -> Vec<usize> {
    vec![30, 50, 100]
}

impl WalkForwardConfig {
    #[must_use]
    pub fn new(tickers: Vec<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            tickers,
            start,
            end,
            train_days: default_train_days(),
            test_days: default_test_days(),
            fast_values: default_fast_values(),
            slow_values: default_slow_values(),
            initial_cash: portfolio::default_initial_cash(),
            commission_per_trade: portfolio::default_commission(),
            slippage_bps: portfolio::default_slippage_bps(),
        }
    }

    /// Every usable (fast, slow) pair in grid order.
    #[must_use]
    pub fn grid(&self) -> Vec<(usize, usize)> {
        self.fast_values
            .iter()
            .flat_map(|&fast| self.slow_values.iter().map(move |&slow| (fast, slow)))
            .filter(|(fast, slow)| fast < slow)
            .collect()
    }

    /// # Errors
    ///
    /// Returns `CoreError::Configuration` describing the first invalid field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.train_days < 2 || self.test_days == 0 {
            return Err(CoreError::config(
                "walk-forward needs train_days >= 2 and test_days >= 1",
            ));
        }
        if self.fast_values.contains(&0) || self.slow_values.contains(&0) {
            return Err(CoreError::config("moving-average windows must be at least 1"));
        }
        if self.grid().is_empty() {
            return Err(CoreError::config(
                "parameter grid has no pair with fast < slow",
            ));
        }
        self.portfolio(self.start, self.end, 1, 2).validate()
    }

    fn portfolio(&self, start: NaiveDate, end: NaiveDate, fast: usize, slow: usize) -> PortfolioConfig {
        let mut config = PortfolioConfig::new(self.tickers.clone(), start, end);
        config.strategy = sma::NAME.to_string();
        config.params.insert("fast".to_string(), fast.into());
        config.params.insert("slow".to_string(), slow.into());
        config.initial_cash = self.initial_cash;
        config.commission_per_trade = self.commission_per_trade;
        config.slippage_bps = self.slippage_bps;
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardFold {
    pub fold: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub fast: usize,
    pub slow: usize,
    pub train_sharpe: f64,
    pub test_sharpe: f64,
    pub test_return: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardMetrics {
    pub num_folds: usize,
    pub avg_train_sharpe: f64,
    pub avg_test_sharpe: f64,
    /// Out-of-sample over in-sample sharpe; zero when training averaged zero.
    pub train_test_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub strategy: String,
    pub folds: Vec<WalkForwardFold>,
    pub metrics: WalkForwardMetrics,
}

pub struct WalkForward {
    config: WalkForwardConfig,
    clock: MarketClock,
}

impl WalkForward {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for invalid settings.
    pub fn new(config: WalkForwardConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: MarketClock::new_york(),
        })
    }

    #[must_use]
    pub const fn with_clock(mut self, clock: MarketClock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Returns `CoreError::DataUnavailable` when the bars cover fewer dates
    /// than one train plus test window, `CoreError::Cancelled` when `cancel`
    /// fires, or the first backtest failure other than missing data.
    pub fn run(&self, bars: &HistoricalBars, cancel: &CancelFlag) -> CoreResult<WalkForwardResult> {
        let dates = bars.dates();
        let (train, test) = (self.config.train_days, self.config.test_days);
        if dates.len() < train + test {
            return Err(CoreError::unavailable(
                self.config.tickers.join(","),
                format!("walk-forward needs {} dates, have {}", train + test, dates.len()),
            ));
        }
        info!(
            tickers = ?bars.tickers(),
            dates = dates.len(),
            train,
            test,
            "walk-forward started"
        );

        let mut folds = Vec::new();
        let mut cursor = 0;
        while cursor + train + test <= dates.len() {
            cancel.checkpoint()?;
            let train_window = (dates[cursor], dates[cursor + train - 1]);
            let test_window = (dates[cursor + train], dates[cursor + train + test - 1]);
            cursor += test;

            let Some((fast, slow, train_sharpe)) = self.best_on(bars, train_window, cancel)? else {
                warn!(train_start = %train_window.0, "no parameter pair could be scored, fold skipped");
                continue;
            };
            let (test_sharpe, test_return) = match self.backtest(bars, test_window, fast, slow, cancel) {
                Ok(result) => (result.metrics.sharpe_like, result.metrics.total_return),
                Err(CoreError::DataUnavailable { .. }) => (0.0, Decimal::ZERO),
                Err(e) => return Err(e),
            };
            debug!(fold = folds.len(), fast, slow, train_sharpe, test_sharpe, "fold scored");
            folds.push(WalkForwardFold {
                fold: folds.len(),
                train_start: train_window.0,
                train_end: train_window.1,
                test_start: test_window.0,
                test_end: test_window.1,
                fast,
                slow,
                train_sharpe,
                test_sharpe,
                test_return,
            });
        }

        if folds.is_empty() {
            return Err(CoreError::unavailable(
                self.config.tickers.join(","),
                "no fold could be scored",
            ));
        }

        #[allow(clippy::cast_precision_loss)]
        let n = folds.len() as f64;
        let avg_train_sharpe = folds.iter().map(|f| f.train_sharpe).sum::<f64>() / n;
        let avg_test_sharpe = folds.iter().map(|f| f.test_sharpe).sum::<f64>() / n;
        let metrics = WalkForwardMetrics {
            num_folds: folds.len(),
            avg_train_sharpe,
            avg_test_sharpe,
            train_test_ratio: if avg_train_sharpe == 0.0 {
                0.0
            } else {
                avg_test_sharpe / avg_train_sharpe
            },
        };
        info!(
            folds = metrics.num_folds,
            avg_train_sharpe = metrics.avg_train_sharpe,
            avg_test_sharpe = metrics.avg_test_sharpe,
            "walk-forward finished"
        );
        Ok(WalkForwardResult {
            strategy: sma::NAME.to_string(),
            folds,
            metrics,
        })
    }

    /// Highest-sharpe grid pair on the window; earlier pairs win ties.
    fn best_on(
        &self,
        bars: &HistoricalBars,
        window: (NaiveDate, NaiveDate),
        cancel: &CancelFlag,
    ) -> CoreResult<Option<(usize, usize, f64)>> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (fast, slow) in self.config.grid() {
            let sharpe = match self.backtest(bars, window, fast, slow, cancel) {
                Ok(result) => result.metrics.sharpe_like,
                Err(CoreError::DataUnavailable { .. }) => continue,
                Err(e) => return Err(e),
            };
            if best.map_or(true, |(_, _, s)| sharpe > s) {
                best = Some((fast, slow, sharpe));
            }
        }
        Ok(best)
    }

    fn backtest(
        &self,
        bars: &HistoricalBars,
        (start, end): (NaiveDate, NaiveDate),
        fast: usize,
        slow: usize,
        cancel: &CancelFlag,
    ) -> CoreResult<BacktestResult> {
        PortfolioBacktest::new(self.config.portfolio(start, end, fast, slow))?
            .with_clock(self.clock)
            .run(&bars.between(start, end), cancel)
    }
}
