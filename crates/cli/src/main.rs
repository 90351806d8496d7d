use clap::{Parser, Subcommand};

mod commands;

use commands::{
    print_json, run_agent, run_backtest, run_order, run_replay, run_runs, run_spread_backtest,
    run_strategy, run_tick, run_walk_forward, AgentArgs, BacktestArgs, Context, OrderArgs,
    ReplayArgs, RunsArgs, SpreadBacktestArgs, StrategyArgs, TickArgs, WalkForwardArgs,
};

#[derive(Parser)]
#[command(name = "deltadesk")]
#[command(about = "Paper-trading agents with daily risk limits, backtests and day replays", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    /// Overlay config/Config.<profile>.toml
    #[arg(long, global = true, env = "DELTADESK_PROFILE")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a multi-ticker portfolio backtest
    Backtest(BacktestArgs),
    /// Backtest same-day credit spreads over captured option chains
    SpreadBacktest(SpreadBacktestArgs),
    /// Walk-forward validation of the crossover parameter grid
    WalkForward(WalkForwardArgs),
    /// Replay an agent's day without touching live state
    Replay(ReplayArgs),
    /// Evaluate every strategy of an agent once
    Tick(TickArgs),
    /// Submit an operator order through risk checks and the paper broker
    Order(OrderArgs),
    /// Manage agents
    Agent(AgentArgs),
    /// Bind a strategy to an agent (replaces a binding with the same id)
    Strategy(StrategyArgs),
    /// List or show backtest and replay runs
    Runs(RunsArgs),
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON results.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::open(&cli.config, cli.profile.as_deref())?;

    match cli.command {
        Commands::Backtest(args) => run_backtest(&ctx, args).await?,
        Commands::SpreadBacktest(args) => run_spread_backtest(&ctx, args).await?,
        Commands::WalkForward(args) => run_walk_forward(&ctx, args).await?,
        Commands::Replay(args) => run_replay(&ctx, args).await?,
        Commands::Tick(args) => run_tick(&ctx, args).await?,
        Commands::Order(args) => run_order(&ctx, args).await?,
        Commands::Agent(args) => run_agent(&ctx, args).await?,
        Commands::Strategy(args) => run_strategy(&ctx, args).await?,
        Commands::Runs(args) => run_runs(&ctx, args).await?,
        Commands::Config => print_json(&ctx.config)?,
    }

    Ok(())
}
