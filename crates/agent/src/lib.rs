//! Live side of deltadesk: one decision per (agent, strategy, tick), paper
//! execution of accepted decisions, and plan-only day replays.

pub mod decision;
pub mod replay;
pub mod runtime;

pub use decision::{fetch_snapshot, DecisionEngine, TickContext, DATA_UNAVAILABLE, DISABLED, MANUAL_ORDER};
pub use replay::{ReplayParams, ReplayRunner, Timeline, TimelineEntry};
pub use runtime::{AgentRuntime, DecisionOutcome, TickMode};
