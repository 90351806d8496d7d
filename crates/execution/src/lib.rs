pub mod fill_model;
pub mod kill_switch;
pub mod paper_broker;

pub use fill_model::{FillModel, FillQuote};
pub use kill_switch::KillSwitch;
pub use paper_broker::{BrokerOutcome, PaperBroker, RejectReason};
