//! Same-day-expiry credit spreads on an index ETF.

use chrono::NaiveTime;
use deltadesk_core::config::hhmm;
use deltadesk_core::{
    CoreError, CoreResult, MarketClock, MarketSnapshot, OptionQuote, OptionRight, SpreadProposal,
    StrategyParams,
};
use rust_decimal::Decimal;

use crate::evaluator::{reasons, Evaluation};
use crate::params::ParamReader;

pub const NAME: &str = "zero_dte_credit_spread";

/// Largest gap between the wanted long strike and the one actually used.
const LONG_LEG_TOLERANCE: Decimal = Decimal::ONE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadType {
    /// Short put above a long put; profits when the underlying holds up.
    BullPut,
    /// Short call below a long call; profits when the underlying stays down.
    BearCall,
}

impl SpreadType {
    #[must_use]
    pub const fn right(self) -> OptionRight {
        match self {
            Self::BullPut => OptionRight::Put,
            Self::BearCall => OptionRight::Call,
        }
    }
}

impl std::str::FromStr for SpreadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bull_put" => Ok(Self::BullPut),
            "bear_call" => Ok(Self::BearCall),
            other => Err(format!("unknown spread type '{other}' (bull_put | bear_call)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZeroDteCreditSpread {
    pub underlying: String,
    pub spread_type: SpreadType,
    pub target_delta: f64,
    pub width: Decimal,
    pub contracts: u32,
    pub entry_start: NaiveTime,
    pub entry_end: NaiveTime,
    pub min_volume: u64,
    pub max_bid_ask_pct: Decimal,
    /// Daily bars for the directional-bias check; zero disables it.
    pub bias_lookback: usize,
}

impl ZeroDteCreditSpread {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for unknown keys, out-of-range values
    /// or an empty entry window.
    pub fn from_params(params: &StrategyParams) -> CoreResult<Self> {
        let reader = ParamReader::new(
            NAME,
            params,
            &[
                "underlying",
                "spread_type",
                "target_delta",
                "width",
                "contracts",
                "entry_start",
                "entry_end",
                "min_volume",
                "max_bid_ask_pct",
                "bias_lookback",
            ],
        )?;
        let entry_start = reader.clock_time("entry_start", hhmm(10, 0))?;
        let entry_end = reader.clock_time("entry_end", hhmm(14, 15))?;
        if entry_start >= entry_end {
            return Err(CoreError::config(format!(
                "{NAME}: entry_start {entry_start} must be before entry_end {entry_end}"
            )));
        }
        let contracts = reader.count("contracts", 1, 1)?;
        Ok(Self {
            underlying: reader.symbol("underlying", "QQQ")?,
            spread_type: reader.choice("spread_type", SpreadType::BullPut)?,
            target_delta: reader.fraction("target_delta", 0.20)?,
            width: reader.positive_decimal("width", Decimal::TWO)?,
            contracts: u32::try_from(contracts).map_err(|e| CoreError::config(e.to_string()))?,
            entry_start,
            entry_end,
            min_volume: reader.count("min_volume", 100, 0)?,
            max_bid_ask_pct: reader.positive_decimal("max_bid_ask_pct", Decimal::new(20, 2))?,
            bias_lookback: usize::try_from(reader.count("bias_lookback", 0, 0)?)
                .map_err(|e| CoreError::config(e.to_string()))?,
        })
    }

    fn in_entry_window(&self, local: NaiveTime) -> bool {
        self.entry_start <= local && local <= self.entry_end
    }

    /// Directional bias: price above its trailing average for bull puts,
    /// below it for bear calls.
    fn bias_holds(&self, snapshot: &MarketSnapshot) -> bool {
        if self.bias_lookback == 0 {
            return true;
        }
        if snapshot.bars.len() < self.bias_lookback {
            return false;
        }
        let window = &snapshot.bars[snapshot.bars.len() - self.bias_lookback..];
        let average =
            window.iter().map(|b| b.close).sum::<Decimal>() / Decimal::from(window.len());
        let price = snapshot
            .chain
            .as_ref()
            .and_then(|c| c.underlying_price)
            .or_else(|| snapshot.last_close());
        match (price, self.spread_type) {
            (Some(p), SpreadType::BullPut) => p > average,
            (Some(p), SpreadType::BearCall) => p < average,
            (None, _) => false,
        }
    }

    fn is_liquid(&self, quote: &OptionQuote) -> bool {
        quote.volume >= self.min_volume
            && quote.ask >= quote.bid
            && quote
                .spread_pct()
                .is_some_and(|pct| pct <= self.max_bid_ask_pct)
    }

    /// Contract whose |delta| is closest to the target. Without any quoted
    /// deltas, falls back to ranking by distance from the money.
    fn pick_short<'q>(&self, candidates: &[&'q OptionQuote]) -> Option<&'q OptionQuote> {
        let with_delta: Vec<&OptionQuote> = candidates
            .iter()
            .copied()
            .filter(|q| q.delta.is_some())
            .collect();
        if !with_delta.is_empty() {
            return with_delta.into_iter().min_by(|a, b| {
                let da = (a.delta.unwrap_or_default().abs() - self.target_delta).abs();
                let db = (b.delta.unwrap_or_default().abs() - self.target_delta).abs();
                da.total_cmp(&db).then(a.strike.cmp(&b.strike))
            });
        }

        // Out-of-the-money end first: low strikes for puts, high for calls.
        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| match self.spread_type {
            SpreadType::BullPut => a.strike.cmp(&b.strike),
            SpreadType::BearCall => b.strike.cmp(&a.strike),
        });
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let idx = ((ranked.len() as f64) * self.target_delta) as usize;
        ranked.get(idx.min(ranked.len().saturating_sub(1))).copied()
    }

    fn pick_long<'q>(
        &self,
        candidates: &[&'q OptionQuote],
        short: &OptionQuote,
    ) -> Option<&'q OptionQuote> {
        let wanted = match self.spread_type {
            SpreadType::BullPut => short.strike - self.width,
            SpreadType::BearCall => short.strike + self.width,
        };
        candidates
            .iter()
            .copied()
            .filter(|q| q.strike != short.strike)
            .filter(|q| (q.strike - wanted).abs() <= LONG_LEG_TOLERANCE)
            .min_by(|a, b| {
                (a.strike - wanted)
                    .abs()
                    .cmp(&(b.strike - wanted).abs())
                    .then(a.strike.cmp(&b.strike))
            })
    }

    /// # Errors
    ///
    /// Returns `CoreError::MalformedSnapshot` when the snapshot carries no
    /// chain or a chain for another underlying.
    pub fn evaluate(&self, snapshot: &MarketSnapshot, clock: &MarketClock) -> CoreResult<Evaluation> {
        let local = clock.local_time(snapshot.as_of);
        if !self.in_entry_window(local) {
            return Ok(Evaluation::skip(reasons::OUTSIDE_ENTRY_WINDOW));
        }

        let chain = snapshot.chain.as_ref().ok_or_else(|| {
            CoreError::MalformedSnapshot(format!("no options chain for {}", self.underlying))
        })?;
        if !chain.underlying.eq_ignore_ascii_case(&self.underlying) {
            return Err(CoreError::MalformedSnapshot(format!(
                "chain is for {}, expected {}",
                chain.underlying, self.underlying
            )));
        }

        if !self.bias_holds(snapshot) {
            return Ok(Evaluation::skip(reasons::NO_SIGNAL));
        }

        let today = clock.trading_day(snapshot.as_of);
        let right = self.spread_type.right();
        let liquid: Vec<&OptionQuote> = chain
            .quotes
            .iter()
            .filter(|q| q.right == right && q.expiration == today)
            .filter(|q| self.is_liquid(q))
            .collect();

        let Some(short) = self.pick_short(&liquid) else {
            return Ok(Evaluation::skip(reasons::NO_LIQUID_STRIKES));
        };
        let Some(long) = self.pick_long(&liquid, short) else {
            return Ok(Evaluation::skip(reasons::NO_LIQUID_STRIKES));
        };

        let short_mid = short.mid();
        let long_mid = long.mid();
        let credit = short_mid - long_mid;
        if credit <= Decimal::ZERO {
            return Ok(Evaluation::skip(reasons::NEGATIVE_CREDIT));
        }

        tracing::debug!(
            underlying = %self.underlying,
            short = %short.strike,
            long = %long.strike,
            credit = %credit,
            short_delta = ?short.delta,
            "spread selected"
        );

        Ok(Evaluation::Spread(SpreadProposal {
            underlying: self.underlying.clone(),
            right,
            expiration: today,
            short_strike: short.strike,
            long_strike: long.strike,
            short_mid,
            long_mid,
            credit,
            contracts: self.contracts,
        }))
    }
}
