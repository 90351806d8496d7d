//! CLI commands for the deltadesk agents.

pub mod agents;
pub mod backtest;
pub mod context;
pub mod replay;
pub mod trading;

pub use agents::{run_agent, run_strategy, AgentArgs, StrategyArgs};
pub use backtest::{
    run_backtest, run_spread_backtest, run_walk_forward, BacktestArgs, SpreadBacktestArgs,
    WalkForwardArgs,
};
pub use context::{print_json, Context};
pub use replay::{run_replay, run_runs, ReplayArgs, RunsArgs};
pub use trading::{run_order, run_tick, OrderArgs, TickArgs};
