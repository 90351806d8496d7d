pub mod account;
pub mod agent;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod market;
pub mod position;
pub mod provider;
pub mod risk_state;
pub mod run;
pub mod store;
pub mod traits;

pub use account::{Account, AgentLedger};
pub use agent::{Agent, ExecutionMode, RiskLimits, RiskProfile, StrategyBinding, StrategyParams};
pub use cancel::CancelFlag;
pub use clock::{parse_clock_time, MarketClock};
pub use config::{AppConfig, BrokerConfig, MarketConfig, StorageConfig};
pub use config_loader::ConfigLoader;
pub use error::{CoreError, CoreResult};
pub use events::{
    Decision, DecisionPayload, DecisionValue, Fill, OrderIntent, Side, Signal, SignalValue,
    SpreadProposal, TradeRecord,
};
pub use market::{Bar, ChainSlice, MarketSnapshot, OptionQuote, OptionRight};
pub use position::{Position, PositionTracker};
pub use provider::StaticSnapshotProvider;
pub use risk_state::RiskState;
pub use run::{RunRecord, RunStatus, RunType};
pub use store::{MemoryStore, StoreTables};
pub use traits::{SnapshotProvider, Store};
