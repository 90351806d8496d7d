//! Portfolio, credit-spread and walk-forward backtest commands.

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use clap::Args;
use deltadesk_backtest::{PortfolioConfig, SpreadBacktestConfig, WalkForwardConfig};
use deltadesk_core::{RunRecord, RunStatus};
use rust_decimal::Decimal;
use tracing::info;

use super::context::{cancel_on_ctrl_c, parse_params, print_json, Context};

#[derive(Args, Debug, Clone)]
pub struct BacktestArgs {
    /// Comma-separated tickers, e.g. SPY,QQQ,IWM
    #[arg(long, value_delimiter = ',')]
    pub tickers: Vec<String>,

    /// First session (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last session (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// sma_crossover or buy_hold
    #[arg(long, default_value = "sma_crossover")]
    pub strategy: String,

    /// Strategy parameter as key=value, repeatable
    #[arg(long = "param")]
    pub params: Vec<String>,

    #[arg(long, default_value = "100000")]
    pub initial_cash: Decimal,

    #[arg(long, default_value = "3")]
    pub max_positions: usize,

    /// Fraction of equity per new position
    #[arg(long, default_value = "0.02")]
    pub risk_per_trade: Decimal,

    /// Defaults to the broker commission from configuration
    #[arg(long)]
    pub commission: Option<Decimal>,

    /// Defaults to the broker slippage from configuration
    #[arg(long)]
    pub slippage_bps: Option<Decimal>,

    /// Also write the run record to this file
    #[arg(long)]
    pub output: Option<String>,
}

impl BacktestArgs {
    fn portfolio_config(&self, ctx: &Context) -> Result<PortfolioConfig> {
        let mut config = PortfolioConfig::new(
            self.tickers.iter().map(|t| t.trim().to_uppercase()).collect(),
            self.start,
            self.end,
        );
        config.strategy = self.strategy.clone();
        config.params = parse_params(&self.params)?;
        config.initial_cash = self.initial_cash;
        config.max_positions = self.max_positions;
        config.risk_per_trade = self.risk_per_trade;
        config.commission_per_trade = self.commission.unwrap_or(ctx.config.broker.commission_per_trade);
        config.slippage_bps = self.slippage_bps.unwrap_or(ctx.config.broker.slippage_bps);
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct SpreadBacktestArgs {
    /// First session (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last session (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Credit spread parameter as key=value, repeatable
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Minutes between chain lookups
    #[arg(long, default_value = "5")]
    pub interval: u32,

    /// Close at this fraction of the credit in profit
    #[arg(long, default_value = "0.50")]
    pub profit_take: Decimal,

    /// Close at this multiple of the credit in loss
    #[arg(long, default_value = "2.00")]
    pub stop_loss: Decimal,

    #[arg(long, default_value = "100000")]
    pub initial_cash: Decimal,

    /// Also write the run record to this file
    #[arg(long)]
    pub output: Option<String>,
}

impl SpreadBacktestArgs {
    fn spread_config(&self, ctx: &Context) -> Result<SpreadBacktestConfig> {
        let mut config = SpreadBacktestConfig::new(self.start, self.end);
        config.params = parse_params(&self.params)?;
        config.interval_minutes = self.interval;
        config.profit_take_pct = self.profit_take;
        config.stop_loss_pct = self.stop_loss;
        config.initial_cash = self.initial_cash;
        config.commission_per_trade = ctx.config.broker.commission_per_trade;
        config.slippage_bps = ctx.config.broker.slippage_bps;
        config.contract_multiplier = ctx.config.broker.contract_multiplier;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct WalkForwardArgs {
    /// Comma-separated tickers
    #[arg(long, value_delimiter = ',')]
    pub tickers: Vec<String>,

    #[arg(long)]
    pub start: NaiveDate,

    #[arg(long)]
    pub end: NaiveDate,

    /// Trading dates per training window
    #[arg(long, default_value = "504")]
    pub train_days: usize,

    /// Trading dates per test window
    #[arg(long, default_value = "63")]
    pub test_days: usize,

    /// Fast windows to try
    #[arg(long, value_delimiter = ',', default_value = "5,10,20")]
    pub fast: Vec<usize>,

    /// Slow windows to try
    #[arg(long, value_delimiter = ',', default_value = "30,50,100")]
    pub slow: Vec<usize>,

    #[arg(long)]
    pub output: Option<String>,
}

impl WalkForwardArgs {
    fn walk_forward_config(&self, ctx: &Context) -> WalkForwardConfig {
        let mut config = WalkForwardConfig::new(
            self.tickers.iter().map(|t| t.trim().to_uppercase()).collect(),
            self.start,
            self.end,
        );
        config.train_days = self.train_days;
        config.test_days = self.test_days;
        config.fast_values = self.fast.clone();
        config.slow_values = self.slow.clone();
        config.commission_per_trade = ctx.config.broker.commission_per_trade;
        config.slippage_bps = ctx.config.broker.slippage_bps;
        config
    }
}

/// Runs the backtest and prints its run record.
///
/// # Errors
///
/// Returns an error for invalid settings. A failed or cancelled run is
/// printed, not returned as an error.
pub async fn run_backtest(ctx: &Context, args: BacktestArgs) -> Result<()> {
    let config = args.portfolio_config(ctx)?;
    let cancel = cancel_on_ctrl_c();
    let run = ctx.runtime.run_backtest(config, &cancel).await?;
    report(&run, args.output.as_deref())
}

/// # Errors
///
/// See [`run_backtest`].
pub async fn run_spread_backtest(ctx: &Context, args: SpreadBacktestArgs) -> Result<()> {
    let config = args.spread_config(ctx)?;
    let cancel = cancel_on_ctrl_c();
    let run = ctx.runtime.run_spread_backtest(config, &cancel).await?;
    report(&run, args.output.as_deref())
}

/// # Errors
///
/// See [`run_backtest`].
pub async fn run_walk_forward(ctx: &Context, args: WalkForwardArgs) -> Result<()> {
    let config = args.walk_forward_config(ctx);
    let cancel = cancel_on_ctrl_c();
    let run = ctx.runtime.run_walk_forward(config, &cancel).await?;
    report(&run, args.output.as_deref())
}

fn report(run: &RunRecord, output: Option<&str>) -> Result<()> {
    info!(run_id = %run.id, run_type = ?run.run_type, status = ?run.status, "run finished");
    if run.status == RunStatus::Success {
        if let Some(metrics) = run.result.as_ref().and_then(|r| r.get("metrics")) {
            info!(metrics = %metrics, "run metrics");
        }
    }
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_vec_pretty(run)?)
            .with_context(|| format!("writing {path}"))?;
    }
    print_json(run)
}
