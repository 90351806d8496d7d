//! Live ticks and operator orders.

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use clap::Args;
use deltadesk_agent::TickMode;
use deltadesk_core::{parse_clock_time, Side};
use rust_decimal::Decimal;

use super::context::{print_json, Context};

#[derive(Args, Debug, Clone)]
pub struct TickArgs {
    #[arg(long)]
    pub agent: String,

    /// Trading day (YYYY-MM-DD); defaults to now
    #[arg(long, requires = "time")]
    pub date: Option<NaiveDate>,

    /// Exchange-local HH:MM
    #[arg(long, requires = "date")]
    pub time: Option<String>,

    /// plan_only or live
    #[arg(long, default_value = "plan_only")]
    pub mode: String,
}

#[derive(Args, Debug, Clone)]
pub struct OrderArgs {
    #[arg(long)]
    pub agent: String,

    /// Binding the order is attributed to
    #[arg(long)]
    pub strategy: String,

    #[arg(long)]
    pub ticker: String,

    /// buy or sell
    #[arg(long)]
    pub side: String,

    #[arg(long)]
    pub quantity: Decimal,

    /// Client order id; resubmitting the same id fills at most once
    #[arg(long)]
    pub order_id: Option<String>,
}

/// # Errors
///
/// Returns an error for an unknown agent, a bad time, or storage failures.
pub async fn run_tick(ctx: &Context, args: TickArgs) -> Result<()> {
    let mode: TickMode = args.mode.parse().map_err(|e: String| anyhow!(e))?;
    let now = match (args.date, args.time.as_deref()) {
        (Some(date), Some(time)) => ctx.runtime.clock().at(date, parse_clock_time(time)?)?,
        _ => Utc::now(),
    };
    let outcomes = ctx.runtime.tick_at(&args.agent, now, mode).await?;
    print_json(&outcomes)
}

/// # Errors
///
/// Returns an error for invalid input. Risk denials and broker rejections
/// are printed as part of the outcome.
pub async fn run_order(ctx: &Context, args: OrderArgs) -> Result<()> {
    let side: Side = args.side.parse().map_err(|e: String| anyhow!(e))?;
    let outcome = ctx
        .runtime
        .submit_order(
            &args.agent,
            &args.strategy,
            &args.ticker,
            side,
            args.quantity,
            args.order_id.as_deref(),
        )
        .await?;
    print_json(&outcome)
}
