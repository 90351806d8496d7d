//! Day replay and run inspection.

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::Args;
use deltadesk_agent::ReplayParams;
use deltadesk_core::parse_clock_time;

use super::context::{cancel_on_ctrl_c, print_json, Context};

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    #[arg(long)]
    pub agent: String,

    /// Trading day to replay (YYYY-MM-DD)
    #[arg(long)]
    pub date: NaiveDate,

    /// First tick, exchange-local HH:MM
    #[arg(long, default_value = "09:30")]
    pub start: String,

    /// Last tick, exchange-local HH:MM
    #[arg(long, default_value = "16:00")]
    pub end: String,

    #[arg(long, default_value = "5")]
    pub interval: u32,

    /// Only replay this binding
    #[arg(long)]
    pub strategy: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RunsArgs {
    /// Show a single run instead of listing all
    #[arg(long)]
    pub id: Option<String>,
}

fn clock_time(raw: &str) -> Result<NaiveTime> {
    Ok(parse_clock_time(raw)?)
}

/// # Errors
///
/// Returns an error for invalid parameters or an unknown agent/strategy.
pub async fn run_replay(ctx: &Context, args: ReplayArgs) -> Result<()> {
    let params = ReplayParams {
        date: args.date,
        start: clock_time(&args.start)?,
        end: clock_time(&args.end)?,
        interval_minutes: args.interval,
        strategy_id: args.strategy,
    };
    let cancel = cancel_on_ctrl_c();
    let run = ctx.runtime.run_replay(&args.agent, params, &cancel).await?;
    print_json(&run)
}

/// # Errors
///
/// Returns an error if the run does not exist or storage fails.
pub async fn run_runs(ctx: &Context, args: RunsArgs) -> Result<()> {
    let store = ctx.runtime.store();
    match args.id {
        Some(id) => {
            let run = store.run(&id)?.ok_or_else(|| anyhow!("run not found: {id}"))?;
            print_json(&run)
        }
        None => print_json(&store.runs()?),
    }
}
