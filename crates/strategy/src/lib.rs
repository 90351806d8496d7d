pub mod buy_hold;
pub mod evaluator;
pub mod params;
pub mod risk_governor;
pub mod sma;
pub mod zero_dte;

pub use buy_hold::BuyHold;
pub use evaluator::{reasons, DataRequirements, EvalContext, Evaluation, StrategyVariant};
pub use risk_governor::{DenyReason, ProposedTrade, RiskGovernor, RiskVerdict};
pub use sma::SmaCrossover;
pub use zero_dte::{SpreadType, ZeroDteCreditSpread};
