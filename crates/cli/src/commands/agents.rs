//! Agent and strategy-binding administration.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use deltadesk_core::{Agent, ExecutionMode, RiskLimits, RiskProfile, StrategyBinding};
use rust_decimal::Decimal;

use super::context::{parse_params, print_json, Context};

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub action: AgentAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AgentAction {
    /// Register a new agent
    Create {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// CONSERVATIVE, BALANCED or SUPER_RISKY
        #[arg(long, default_value = "BALANCED")]
        profile: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Override the profile's daily trade cap
        #[arg(long)]
        max_trades: Option<u32>,
        /// Override the profile's daily notional cap
        #[arg(long)]
        max_notional: Option<Decimal>,
        /// Override the profile's daily loss cap
        #[arg(long)]
        max_loss: Option<Decimal>,
    },
    /// List agents
    List,
    /// Show an agent with its bindings, ledger and latest risk state
    Show {
        #[arg(long)]
        id: String,
    },
    Enable {
        #[arg(long)]
        id: String,
    },
    Disable {
        #[arg(long)]
        id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct StrategyArgs {
    #[arg(long)]
    pub agent: String,
    /// Binding id, unique per store
    #[arg(long)]
    pub id: String,
    /// sma_crossover, buy_hold or zero_dte_credit_spread
    #[arg(long)]
    pub name: String,
    /// Strategy parameter as key=value, repeatable
    #[arg(long = "param")]
    pub params: Vec<String>,
    /// DISABLED, PAPER_LIVE or APPROVED
    #[arg(long, default_value = "PAPER_LIVE")]
    pub mode: String,
    /// Bind the strategy but keep it switched off
    #[arg(long)]
    pub disabled: bool,
}

/// # Errors
///
/// Returns an error for invalid input or storage failures.
pub async fn run_agent(ctx: &Context, args: AgentArgs) -> Result<()> {
    let runtime = &ctx.runtime;
    match args.action {
        AgentAction::Create {
            id,
            name,
            profile,
            description,
            max_trades,
            max_notional,
            max_loss,
        } => {
            let profile: RiskProfile = profile.parse().map_err(|e: String| anyhow!(e))?;
            let mut agent = Agent::new(id, name, profile);
            agent.description = description;
            if max_trades.is_some() || max_notional.is_some() || max_loss.is_some() {
                let base = profile.default_limits();
                agent.risk_limits = Some(RiskLimits {
                    max_trades_per_day: max_trades.unwrap_or(base.max_trades_per_day),
                    max_notional_per_day: max_notional.unwrap_or(base.max_notional_per_day),
                    max_loss_per_day: max_loss.unwrap_or(base.max_loss_per_day),
                });
            }
            print_json(&runtime.create_agent(agent)?)
        }
        AgentAction::List => print_json(&runtime.store().agents()?),
        AgentAction::Show { id } => {
            let store = runtime.store();
            let agent = store
                .agent(&id)?
                .ok_or_else(|| anyhow!("agent not found: {id}"))?;
            print_json(&serde_json::json!({
                "agent": agent,
                "limits": agent.limits(),
                "bindings": store.bindings(&id)?,
                "ledger": store.ledger(&id)?,
                "risk_state": store.latest_risk_state(&id)?,
            }))
        }
        AgentAction::Enable { id } => print_json(&runtime.set_agent_enabled(&id, true).await?),
        AgentAction::Disable { id } => print_json(&runtime.set_agent_enabled(&id, false).await?),
    }
}

/// # Errors
///
/// Returns an error for invalid parameters or an unknown agent.
pub async fn run_strategy(ctx: &Context, args: StrategyArgs) -> Result<()> {
    let mode: ExecutionMode = args.mode.parse().map_err(|e: String| anyhow!(e))?;
    let mut binding = StrategyBinding::new(
        args.id,
        args.agent,
        args.name,
        parse_params(&args.params)?,
        mode,
    );
    binding.enabled = !args.disabled;
    print_json(&ctx.runtime.put_strategy(binding).await?)
}
