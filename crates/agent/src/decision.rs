//! Strategy output plus risk checks and the session cutoff, reduced to one
//! [`Decision`] per (agent, strategy, tick).

use chrono::{DateTime, Utc};
use deltadesk_core::{
    Agent, CoreError, CoreResult, Decision, DecisionPayload, DecisionValue, MarketClock,
    MarketSnapshot, OrderIntent, RiskState, Side, SignalValue, SnapshotProvider, StrategyBinding,
};
use deltadesk_strategy::{
    DenyReason, EvalContext, Evaluation, ProposedTrade, RiskGovernor, RiskVerdict, StrategyVariant,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

pub const DISABLED: &str = "disabled";
pub const DATA_UNAVAILABLE: &str = "DATA_UNAVAILABLE";
pub const MANUAL_ORDER: &str = "MANUAL_ORDER";

/// Everything a single evaluation needs besides the risk state.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    pub agent: &'a Agent,
    pub binding: &'a StrategyBinding,
    pub now: DateTime<Utc>,
    /// Whether the agent already holds the strategy's symbol.
    pub holding: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    clock: MarketClock,
    contract_multiplier: Decimal,
}

impl DecisionEngine {
    #[must_use]
    pub const fn new(clock: MarketClock, contract_multiplier: Decimal) -> Self {
        Self {
            clock,
            contract_multiplier,
        }
    }

    #[must_use]
    pub const fn clock(&self) -> &MarketClock {
        &self.clock
    }

    #[must_use]
    pub fn governor(&self, agent: &Agent) -> RiskGovernor {
        RiskGovernor::for_agent(agent, self.clock)
    }

    /// Gates that apply before any strategy work: disabled bindings, then the
    /// force-exit cutoff.
    fn gate(&self, ctx: &TickContext<'_>, state: &mut RiskState) -> Option<Decision> {
        let (agent, binding) = (ctx.agent, ctx.binding);
        if !agent.enabled || binding.is_inactive() {
            return Some(Decision::new(
                &agent.id,
                &binding.id,
                ctx.now,
                DecisionValue::Skip,
                DISABLED,
            ));
        }
        self.governor(agent)
            .check_session(state, ctx.now)
            .map(|reason| self.session_close(ctx, reason))
    }

    /// Only the cutoff trigger itself flattens; once the day is closed,
    /// later ticks are plain skips.
    fn session_close(&self, ctx: &TickContext<'_>, reason: DenyReason) -> Decision {
        let value = match reason {
            DenyReason::ForceExit => DecisionValue::ForceExit,
            _ => DecisionValue::Skip,
        };
        Decision::new(&ctx.agent.id, &ctx.binding.id, ctx.now, value, reason.as_str())
    }

    /// Evaluates one binding at `ctx.now`.
    ///
    /// Snapshot retrieval only happens once the binding is active and the
    /// session is still open. Market-driven outcomes are decisions, never
    /// errors.
    pub async fn tick(
        &self,
        ctx: TickContext<'_>,
        state: &mut RiskState,
        provider: &dyn SnapshotProvider,
    ) -> Decision {
        if let Some(decision) = self.gate(&ctx, state) {
            return log_decision(decision);
        }

        let variant = match StrategyVariant::from_binding(ctx.binding) {
            Ok(v) => v,
            Err(e) => return log_decision(self.error(&ctx, &e)),
        };

        let snapshot = match fetch_snapshot(provider, &variant, &self.clock, ctx.now).await {
            Ok(s) => s,
            Err(CoreError::DataUnavailable { subject, detail }) => {
                warn!(
                    agent_id = %ctx.agent.id,
                    strategy_id = %ctx.binding.id,
                    subject = %subject,
                    detail = %detail,
                    "snapshot unavailable"
                );
                return log_decision(Decision::new(
                    &ctx.agent.id,
                    &ctx.binding.id,
                    ctx.now,
                    DecisionValue::Skip,
                    DATA_UNAVAILABLE,
                ));
            }
            Err(e) => return log_decision(self.error(&ctx, &e)),
        };

        log_decision(self.decide(&ctx, &variant, &snapshot, state))
    }

    /// Evaluation and risk steps over an already-fetched snapshot.
    pub fn decide(
        &self,
        ctx: &TickContext<'_>,
        variant: &StrategyVariant,
        snapshot: &MarketSnapshot,
        state: &mut RiskState,
    ) -> Decision {
        if let Some(decision) = self.gate(ctx, state) {
            return decision;
        }

        let eval_ctx = EvalContext {
            clock: &self.clock,
            holding: ctx.holding,
        };
        let evaluation = match variant.evaluate(snapshot, &eval_ctx) {
            Ok(e) => e,
            Err(e) => return self.error(ctx, &e),
        };
        let signal = evaluation.signal_value();
        let skip = |reason: &str| {
            Decision::new(&ctx.agent.id, &ctx.binding.id, ctx.now, DecisionValue::Skip, reason)
                .with_signal(signal)
        };

        let payload = match &evaluation {
            Evaluation::Skip { reason } => return skip(reason.as_str()),
            Evaluation::Signal(s) if s.value != SignalValue::Buy => return skip(s.reason.as_str()),
            Evaluation::Signal(s) => {
                let Some(price) = s.price.filter(|p| *p > Decimal::ZERO) else {
                    return self.error(
                        ctx,
                        &CoreError::MalformedSnapshot(format!("no reference price for {}", s.ticker)),
                    );
                };
                let order = OrderIntent {
                    ticker: s.ticker.clone(),
                    side: Side::Buy,
                    quantity: variant.order_quantity(),
                    reference_price: price,
                };
                DecisionPayload {
                    notional: order.notional(),
                    order,
                    spread: None,
                }
            }
            Evaluation::Spread(spread) => DecisionPayload {
                order: OrderIntent {
                    ticker: spread.symbol(),
                    side: Side::Sell,
                    quantity: Decimal::from(spread.contracts) * self.contract_multiplier,
                    reference_price: spread.credit,
                },
                notional: spread.notional(self.contract_multiplier),
                spread: Some(spread.clone()),
            },
        };

        self.approve(ctx, state, payload, evaluation.reason())
            .with_signal(signal)
    }

    /// Decision for an operator-submitted order, identified by `order_id`.
    /// `order` is the order priced at the latest reference, or the pricing
    /// failure.
    pub fn decide_order(
        &self,
        ctx: &TickContext<'_>,
        state: &mut RiskState,
        order_id: &str,
        order: CoreResult<OrderIntent>,
    ) -> Decision {
        let id = Decision::order_identity(&ctx.agent.id, &ctx.binding.id, order_id);
        log_decision(self.order_decision(ctx, state, order).with_id(id))
    }

    fn order_decision(
        &self,
        ctx: &TickContext<'_>,
        state: &mut RiskState,
        order: CoreResult<OrderIntent>,
    ) -> Decision {
        if let Some(decision) = self.gate(ctx, state) {
            return decision;
        }
        let order = match order {
            Ok(o) => o,
            Err(CoreError::DataUnavailable { .. }) => {
                return Decision::new(
                    &ctx.agent.id,
                    &ctx.binding.id,
                    ctx.now,
                    DecisionValue::Skip,
                    DATA_UNAVAILABLE,
                );
            }
            Err(e) => return self.error(ctx, &e),
        };
        let payload = DecisionPayload {
            notional: order.notional(),
            order,
            spread: None,
        };
        self.approve(ctx, state, payload, MANUAL_ORDER)
    }

    /// Runs the risk check for a ready order. BUY carries the payload; a deny
    /// becomes SKIP, or FORCE_EXIT when it is the cutoff trigger.
    pub fn approve(
        &self,
        ctx: &TickContext<'_>,
        state: &mut RiskState,
        payload: DecisionPayload,
        reason: &str,
    ) -> Decision {
        let trade = ProposedTrade {
            notional: payload.notional,
        };
        match self.governor(ctx.agent).check(state, &trade, ctx.now) {
            RiskVerdict::Allow => {
                Decision::new(&ctx.agent.id, &ctx.binding.id, ctx.now, DecisionValue::Buy, reason)
                    .with_payload(payload)
            }
            RiskVerdict::Deny(deny) if deny.is_session_close() => self.session_close(ctx, deny),
            RiskVerdict::Deny(deny) => Decision::new(
                &ctx.agent.id,
                &ctx.binding.id,
                ctx.now,
                DecisionValue::Skip,
                deny.as_str(),
            ),
        }
    }

    fn error(&self, ctx: &TickContext<'_>, error: &CoreError) -> Decision {
        Decision::new(
            &ctx.agent.id,
            &ctx.binding.id,
            ctx.now,
            DecisionValue::Error,
            error.to_string(),
        )
    }
}

fn log_decision(decision: Decision) -> Decision {
    match decision.value {
        DecisionValue::Error => warn!(
            agent_id = %decision.agent_id,
            strategy_id = %decision.strategy_id,
            tick = %decision.tick,
            reason = %decision.reason,
            "evaluation failed"
        ),
        DecisionValue::Skip => debug!(
            agent_id = %decision.agent_id,
            strategy_id = %decision.strategy_id,
            tick = %decision.tick,
            reason = %decision.reason,
            "skip"
        ),
        DecisionValue::Buy | DecisionValue::ForceExit => info!(
            agent_id = %decision.agent_id,
            strategy_id = %decision.strategy_id,
            tick = %decision.tick,
            decision = %decision.value,
            reason = %decision.reason,
            "decision"
        ),
    }
    decision
}

/// Builds the snapshot a variant asks for, as of `now`: the latest chain at
/// or before `now` and trailing daily bars. Bar strategies see bars through
/// the trading day; chain strategies trade intraday, so their bars end the
/// day before.
///
/// # Errors
///
/// Propagates provider failures, `DataUnavailable` included.
pub async fn fetch_snapshot(
    provider: &dyn SnapshotProvider,
    variant: &StrategyVariant,
    clock: &MarketClock,
    now: DateTime<Utc>,
) -> CoreResult<MarketSnapshot> {
    let needs = variant.requirements();
    let day = clock.trading_day(now);
    let through = if needs.chain {
        day.pred_opt().unwrap_or(day)
    } else {
        day
    };
    let bars = if needs.bars > 0 {
        provider.history(&needs.symbol, through, needs.bars).await?
    } else {
        Vec::new()
    };
    let chain = if needs.chain {
        Some(provider.chain(&needs.symbol, now).await?)
    } else {
        None
    };
    Ok(MarketSnapshot {
        ticker: needs.symbol,
        as_of: now,
        bars,
        chain,
    })
}
