use chrono::{DateTime, NaiveDate, Utc};
use deltadesk_core::{Agent, MarketClock, RiskLimits, RiskState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    ForceExitAlreadyTriggered,
    ForceExit,
    MaxTradesExceeded,
    MaxNotionalExceeded,
    MaxLossExceeded,
}

impl DenyReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ForceExitAlreadyTriggered => "FORCE_EXIT_ALREADY_TRIGGERED",
            Self::ForceExit => "FORCE_EXIT",
            Self::MaxTradesExceeded => "MAX_TRADES_EXCEEDED",
            Self::MaxNotionalExceeded => "MAX_NOTIONAL_EXCEEDED",
            Self::MaxLossExceeded => "MAX_LOSS_EXCEEDED",
        }
    }

    /// Both cutoff reasons mean "flatten and stop for the day".
    #[must_use]
    pub const fn is_session_close(self) -> bool {
        matches!(self, Self::ForceExit | Self::ForceExitAlreadyTriggered)
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskVerdict {
    Allow,
    Deny(DenyReason),
}

impl RiskVerdict {
    #[must_use]
    pub const fn is_allow(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// A trade the governor is asked to approve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposedTrade {
    /// Absolute dollar value.
    pub notional: Decimal,
}

/// Per-agent daily limits over an explicit [`RiskState`].
///
/// Checks never touch the counters; the only transition a check performs is
/// closing the day at the force-exit cutoff. Counters move through
/// [`RiskGovernor::record_fill`] once a fill is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskGovernor {
    limits: RiskLimits,
    clock: MarketClock,
}

impl RiskGovernor {
    #[must_use]
    pub const fn new(limits: RiskLimits, clock: MarketClock) -> Self {
        Self { limits, clock }
    }

    #[must_use]
    pub fn for_agent(agent: &Agent, clock: MarketClock) -> Self {
        Self::new(agent.limits(), clock)
    }

    #[must_use]
    pub const fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Exchange-local trading day, whatever zone `now` was produced in.
    #[must_use]
    pub fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate {
        self.clock.trading_day(now)
    }

    /// Brings `state` to the trading day of `now`, resetting every counter in
    /// one step if the day changed.
    pub fn roll(&self, state: &mut RiskState, now: DateTime<Utc>) -> bool {
        let day = self.trading_day(now);
        let reset = state.reset_for(day);
        if reset {
            tracing::info!(agent_id = %state.agent_id, day = %day, "risk counters reset for new trading day");
        }
        reset
    }

    /// Cutoff part of the check: already closed, or closing now.
    pub fn check_session(&self, state: &mut RiskState, now: DateTime<Utc>) -> Option<DenyReason> {
        self.roll(state, now);
        if state.day_closed {
            return Some(DenyReason::ForceExitAlreadyTriggered);
        }
        if self.clock.is_past_force_exit(now) {
            state.day_closed = true;
            tracing::warn!(
                agent_id = %state.agent_id,
                day = %state.day,
                cutoff = %self.clock.force_exit(),
                "force-exit cutoff reached, closing the day"
            );
            return Some(DenyReason::ForceExit);
        }
        None
    }

    pub fn check(&self, state: &mut RiskState, trade: &ProposedTrade, now: DateTime<Utc>) -> RiskVerdict {
        if let Some(reason) = self.check_session(state, now) {
            return RiskVerdict::Deny(reason);
        }
        if state.trades_today + 1 > self.limits.max_trades_per_day {
            return RiskVerdict::Deny(DenyReason::MaxTradesExceeded);
        }
        if state.notional_today + trade.notional.abs() > self.limits.max_notional_per_day {
            return RiskVerdict::Deny(DenyReason::MaxNotionalExceeded);
        }
        if state.loss_today >= self.limits.max_loss_per_day {
            return RiskVerdict::Deny(DenyReason::MaxLossExceeded);
        }
        RiskVerdict::Allow
    }

    /// Applies a confirmed fill to the day's counters. Only realized losses
    /// count toward `loss_today`.
    pub fn record_fill(
        &self,
        state: &mut RiskState,
        notional: Decimal,
        realized_pnl: Option<Decimal>,
        now: DateTime<Utc>,
    ) {
        self.roll(state, now);
        state.trades_today += 1;
        state.notional_today += notional.abs();
        if let Some(pnl) = realized_pnl.filter(|p| p.is_sign_negative()) {
            state.loss_today += pnl.abs();
        }
        tracing::debug!(
            agent_id = %state.agent_id,
            trades_today = state.trades_today,
            notional_today = %state.notional_today,
            loss_today = %state.loss_today,
            "risk counters updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use deltadesk_core::RiskProfile;
    use rust_decimal_macros::dec;

    fn governor() -> RiskGovernor {
        RiskGovernor::new(RiskProfile::Balanced.default_limits(), MarketClock::new_york())
    }

    /// 2025-01-10 at the given New York wall-clock time (EST, UTC-5).
    fn ny(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, hour + 5, minute, 0).unwrap()
    }

    fn trade(notional: Decimal) -> ProposedTrade {
        ProposedTrade { notional }
    }

    #[test]
    fn sixth_trade_exceeds_daily_count() {
        let g = governor();
        let mut state = RiskState::new("a1", g.trading_day(ny(10, 0)));
        let mut verdicts = Vec::new();
        for i in 0..6 {
            let now = ny(10, i * 5);
            let verdict = g.check(&mut state, &trade(dec!(100)), now);
            if verdict.is_allow() {
                g.record_fill(&mut state, dec!(100), None, now);
            }
            verdicts.push(verdict);
        }
        assert!(verdicts[..5].iter().all(|v| v.is_allow()));
        assert_eq!(verdicts[5], RiskVerdict::Deny(DenyReason::MaxTradesExceeded));
    }

    #[test]
    fn force_exit_is_terminal_for_the_day() {
        let g = governor();
        let mut state = RiskState::new("a1", g.trading_day(ny(10, 0)));
        assert_eq!(
            g.check(&mut state, &trade(dec!(100)), ny(15, 45)),
            RiskVerdict::Deny(DenyReason::ForceExit)
        );
        assert!(state.day_closed);
        for now in [ny(15, 50), ny(10, 0), ny(16, 30)] {
            assert_eq!(
                g.check(&mut state, &trade(dec!(100)), now),
                RiskVerdict::Deny(DenyReason::ForceExitAlreadyTriggered)
            );
        }
    }

    #[test]
    fn checks_do_not_move_counters() {
        let g = governor();
        let mut state = RiskState::new("a1", g.trading_day(ny(10, 0)));
        let before = state.clone();
        for _ in 0..10 {
            g.check(&mut state, &trade(dec!(100)), ny(11, 0));
        }
        assert_eq!(state, before);
    }

    #[test]
    fn notional_then_loss_limits() {
        let g = governor();
        let mut state = RiskState::new("a1", g.trading_day(ny(10, 0)));
        g.record_fill(&mut state, dec!(19500), None, ny(10, 0));
        assert_eq!(
            g.check(&mut state, &trade(dec!(600)), ny(10, 5)),
            RiskVerdict::Deny(DenyReason::MaxNotionalExceeded)
        );
        assert!(g.check(&mut state, &trade(dec!(500)), ny(10, 5)).is_allow());

        g.record_fill(&mut state, dec!(100), Some(dec!(-1500)), ny(10, 10));
        g.record_fill(&mut state, Decimal::ZERO, Some(dec!(250)), ny(10, 11));
        assert_eq!(state.loss_today, dec!(1500));
        assert_eq!(
            g.check(&mut state, &trade(dec!(10)), ny(10, 15)),
            RiskVerdict::Deny(DenyReason::MaxLossExceeded)
        );
    }

    #[test]
    fn counters_reset_once_on_a_new_day() {
        let g = governor();
        let mut state = RiskState::new("a1", g.trading_day(ny(10, 0)));
        g.record_fill(&mut state, dec!(1000), Some(dec!(-50)), ny(10, 0));
        g.check(&mut state, &trade(dec!(1)), ny(15, 50));
        assert!(state.day_closed);

        // 00:30 UTC on the 11th is still the 10th in New York.
        let late = Utc.with_ymd_and_hms(2025, 1, 11, 0, 30, 0).unwrap();
        assert_eq!(
            g.check(&mut state, &trade(dec!(1)), late),
            RiskVerdict::Deny(DenyReason::ForceExitAlreadyTriggered)
        );

        let next_morning = Utc.with_ymd_and_hms(2025, 1, 13, 15, 0, 0).unwrap();
        assert!(g.check(&mut state, &trade(dec!(1)), next_morning).is_allow());
        assert_eq!(state.trades_today, 0);
        assert_eq!(state.notional_today, Decimal::ZERO);
        assert_eq!(state.loss_today, Decimal::ZERO);
        assert!(!state.day_closed);
        assert!(!g.roll(&mut state, next_morning));
    }
}
