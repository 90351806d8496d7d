//! Simulated broker: turns accepted decisions into fills against an
//! [`AgentLedger`].

use std::collections::BTreeMap;

use deltadesk_core::{
    AgentLedger, Decision, DecisionValue, ExecutionMode, Fill, OrderIntent, Side,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fill_model::FillModel;
use crate::kill_switch::KillSwitch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    TradingDisabled,
    NotExecutable,
    InsufficientCash,
    DuplicateDecision,
}

impl RejectReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TradingDisabled => "TRADING_DISABLED",
            Self::NotExecutable => "NOT_EXECUTABLE",
            Self::InsufficientCash => "INSUFFICIENT_CASH",
            Self::DuplicateDecision => "DUPLICATE_DECISION",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum BrokerOutcome {
    /// One fill for an order; one per open position for a force exit (possibly none).
    Filled(Vec<Fill>),
    Rejected(RejectReason),
}

impl BrokerOutcome {
    #[must_use]
    pub fn fills(&self) -> &[Fill] {
        match self {
            Self::Filled(fills) => fills,
            Self::Rejected(_) => &[],
        }
    }
}

pub struct PaperBroker {
    fill_model: FillModel,
    kill_switch: KillSwitch,
}

impl PaperBroker {
    #[must_use]
    pub const fn new(fill_model: FillModel, kill_switch: KillSwitch) -> Self {
        Self {
            fill_model,
            kill_switch,
        }
    }

    #[must_use]
    pub const fn fill_model(&self) -> &FillModel {
        &self.fill_model
    }

    #[must_use]
    pub const fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    /// Executes `decision` against `ledger`.
    ///
    /// The ledger is only touched when the outcome is `Filled`. `marks` prices
    /// force-exit flattening; instruments without a mark close at their last
    /// fill price.
    pub fn submit(
        &self,
        ledger: &mut AgentLedger,
        mode: ExecutionMode,
        decision: &Decision,
        marks: &BTreeMap<String, Decimal>,
    ) -> BrokerOutcome {
        let agent_id = ledger.account.agent_id.clone();

        if !self.kill_switch.is_enabled() || mode != ExecutionMode::PaperLive {
            warn!(
                agent_id = %agent_id,
                decision_id = %decision.id,
                mode = ?mode,
                "order rejected: trading disabled"
            );
            return BrokerOutcome::Rejected(RejectReason::TradingDisabled);
        }
        if ledger.applied_decisions.contains(&decision.id) {
            info!(agent_id = %agent_id, decision_id = %decision.id, "decision already applied");
            return BrokerOutcome::Rejected(RejectReason::DuplicateDecision);
        }

        let fills = match (decision.value, &decision.payload) {
            (DecisionValue::ForceExit, _) => self.flatten(ledger, decision, marks),
            (DecisionValue::Buy, Some(payload)) => {
                match self.fill_order(ledger, decision, &payload.order) {
                    Ok(fill) => {
                        if let Some(spread) = &payload.spread {
                            ledger.spreads.insert(fill.ticker.clone(), spread.clone());
                        }
                        vec![fill]
                    }
                    Err(reason) => return BrokerOutcome::Rejected(reason),
                }
            }
            _ => return BrokerOutcome::Rejected(RejectReason::NotExecutable),
        };

        ledger.applied_decisions.insert(decision.id.clone());
        BrokerOutcome::Filled(fills)
    }

    fn fill_order(
        &self,
        ledger: &mut AgentLedger,
        decision: &Decision,
        order: &OrderIntent,
    ) -> Result<Fill, RejectReason> {
        if order.quantity <= Decimal::ZERO || order.reference_price <= Decimal::ZERO {
            return Err(RejectReason::NotExecutable);
        }
        let quote = self.fill_model.quote(order.side, order.reference_price);
        let cash_delta = quote.cash_delta(order.side, order.quantity);
        if ledger.account.cash + cash_delta < Decimal::ZERO && order.side == Side::Buy {
            warn!(
                agent_id = %ledger.account.agent_id,
                ticker = %order.ticker,
                cost = %(-cash_delta),
                cash = %ledger.account.cash,
                "order rejected: insufficient cash"
            );
            return Err(RejectReason::InsufficientCash);
        }
        Ok(self.book(ledger, decision, &order.ticker, order.side, order.quantity, order.reference_price))
    }

    fn flatten(
        &self,
        ledger: &mut AgentLedger,
        decision: &Decision,
        marks: &BTreeMap<String, Decimal>,
    ) -> Vec<Fill> {
        let closing: Vec<(String, Decimal, Decimal)> = ledger
            .positions
            .open_positions()
            .map(|p| {
                let mark = ledger.mark_for(&p.ticker, p.avg_cost, marks);
                (p.ticker.clone(), p.quantity, mark)
            })
            .collect();

        if !closing.is_empty() {
            info!(
                agent_id = %ledger.account.agent_id,
                positions = closing.len(),
                "force exit: flattening open positions"
            );
        }

        closing
            .into_iter()
            .map(|(ticker, quantity, mark)| {
                let side = if quantity.is_sign_positive() { Side::Sell } else { Side::Buy };
                self.book(ledger, decision, &ticker, side, quantity.abs(), mark)
            })
            .collect()
    }

    /// Applies one execution to positions and cash.
    fn book(
        &self,
        ledger: &mut AgentLedger,
        decision: &Decision,
        ticker: &str,
        side: Side,
        quantity: Decimal,
        reference_price: Decimal,
    ) -> Fill {
        let quote = self.fill_model.quote(side, reference_price);
        let realized = ledger
            .positions
            .apply_fill(ticker, side, quantity, quote.price)
            .map(|gross| gross - quote.commission);

        let account = &mut ledger.account;
        account.cash += quote.cash_delta(side, quantity);
        account.commissions_paid += quote.commission;
        account.realized_pnl += realized.unwrap_or(-quote.commission);
        ledger.last_prices.insert(ticker.to_string(), quote.price);
        if ledger.positions.quantity(ticker).is_zero() {
            ledger.spreads.remove(ticker);
        }

        let fill = Fill {
            decision_id: decision.id.clone(),
            ticker: ticker.to_string(),
            side,
            quantity,
            price: quote.price,
            commission: quote.commission,
            slippage: quote.slippage,
            timestamp: decision.tick,
            realized_pnl: realized,
        };
        info!(
            agent_id = %account.agent_id,
            decision_id = %fill.decision_id,
            ticker = %fill.ticker,
            side = ?fill.side,
            quantity = %fill.quantity,
            price = %fill.price,
            realized_pnl = ?fill.realized_pnl,
            "paper fill"
        );
        fill
    }
}
