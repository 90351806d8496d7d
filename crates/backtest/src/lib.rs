pub mod data_provider;
pub mod metrics;
pub mod portfolio;
pub mod spread;
pub mod walk_forward;

pub use data_provider::HistoricalBars;
pub use metrics::{MetricsCalculator, PerformanceMetrics};
pub use portfolio::{
    BacktestResult, ClosedTrade, EquityPoint, PortfolioBacktest, PortfolioConfig, CLOSED_AT_END,
};
pub use spread::{
    IntradayChains, SessionChains, SpreadBacktest, SpreadBacktestConfig, SpreadBacktestResult,
    SpreadExit, SpreadTrade,
};
pub use walk_forward::{
    WalkForward, WalkForwardConfig, WalkForwardFold, WalkForwardMetrics, WalkForwardResult,
};
