use deltadesk_core::{
    CoreError, CoreResult, MarketClock, MarketSnapshot, Signal, SignalValue, SpreadProposal,
    StrategyBinding, StrategyParams,
};
use rust_decimal::Decimal;

use crate::buy_hold::{self, BuyHold};
use crate::sma::{self, SmaCrossover};
use crate::zero_dte::{self, ZeroDteCreditSpread};

/// Fixed skip reasons shared by the evaluators.
pub mod reasons {
    pub const INSUFFICIENT_HISTORY: &str = "INSUFFICIENT_HISTORY";
    pub const OUTSIDE_ENTRY_WINDOW: &str = "OUTSIDE_ENTRY_WINDOW";
    pub const NO_SIGNAL: &str = "NO_SIGNAL";
    pub const NO_LIQUID_STRIKES: &str = "NO_LIQUID_STRIKES";
    pub const NEGATIVE_CREDIT: &str = "NEGATIVE_CREDIT";
}

/// Raw output of one evaluation, before any risk checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Signal(Signal),
    Spread(SpreadProposal),
    Skip { reason: String },
}

impl Evaluation {
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: reason.into(),
        }
    }

    /// Directional reading of the outcome; a spread proposal is an entry.
    #[must_use]
    pub fn signal_value(&self) -> SignalValue {
        match self {
            Self::Signal(s) => s.value,
            Self::Spread(_) => SignalValue::Buy,
            Self::Skip { .. } => SignalValue::Hold,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Signal(s) => &s.reason,
            Self::Spread(_) => "SPREAD_PROPOSED",
            Self::Skip { reason } => reason,
        }
    }
}

/// Market data a variant needs for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequirements {
    pub symbol: String,
    /// Trailing daily bars, zero when none are needed.
    pub bars: usize,
    pub chain: bool,
}

/// Per-evaluation facts that do not live in the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub clock: &'a MarketClock,
    /// Whether the caller already holds a position in the variant's symbol.
    pub holding: bool,
}

/// The closed set of strategies. Parsing validates the parameters once; the
/// resulting value is immutable.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyVariant {
    SmaCrossover(SmaCrossover),
    BuyHold(BuyHold),
    ZeroDteCreditSpread(ZeroDteCreditSpread),
}

impl StrategyVariant {
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for an unknown strategy name or
    /// invalid parameters.
    pub fn parse(name: &str, params: &StrategyParams) -> CoreResult<Self> {
        match name {
            sma::NAME => SmaCrossover::from_params(params).map(Self::SmaCrossover),
            buy_hold::NAME => BuyHold::from_params(params).map(Self::BuyHold),
            zero_dte::NAME | "0dte_credit_spread" => {
                ZeroDteCreditSpread::from_params(params).map(Self::ZeroDteCreditSpread)
            }
            other => Err(CoreError::config(format!(
                "unknown strategy '{other}' (expected {}, {} or {})",
                sma::NAME,
                buy_hold::NAME,
                zero_dte::NAME
            ))),
        }
    }

    /// # Errors
    ///
    /// See [`StrategyVariant::parse`].
    pub fn from_binding(binding: &StrategyBinding) -> CoreResult<Self> {
        Self::parse(&binding.strategy_name, &binding.params)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SmaCrossover(_) => sma::NAME,
            Self::BuyHold(_) => buy_hold::NAME,
            Self::ZeroDteCreditSpread(_) => zero_dte::NAME,
        }
    }

    /// Ticker traded (or underlying, for spreads).
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::SmaCrossover(s) => &s.ticker,
            Self::BuyHold(s) => &s.ticker,
            Self::ZeroDteCreditSpread(s) => &s.underlying,
        }
    }

    /// Same parameters applied to another symbol, for multi-ticker runs.
    #[must_use]
    pub fn for_symbol(&self, symbol: &str) -> Self {
        let symbol = symbol.to_uppercase();
        match self {
            Self::SmaCrossover(s) => Self::SmaCrossover(SmaCrossover {
                ticker: symbol,
                ..s.clone()
            }),
            Self::BuyHold(s) => Self::BuyHold(BuyHold {
                ticker: symbol,
                ..s.clone()
            }),
            Self::ZeroDteCreditSpread(s) => Self::ZeroDteCreditSpread(ZeroDteCreditSpread {
                underlying: symbol,
                ..s.clone()
            }),
        }
    }

    #[must_use]
    pub fn requirements(&self) -> DataRequirements {
        let (bars, chain) = match self {
            Self::SmaCrossover(s) => (s.lookback(), false),
            Self::BuyHold(_) => (1, false),
            Self::ZeroDteCreditSpread(s) => (s.bias_lookback, true),
        };
        DataRequirements {
            symbol: self.symbol().to_string(),
            bars,
            chain,
        }
    }

    /// Units per live order for stock strategies, contracts for spreads.
    #[must_use]
    pub fn order_quantity(&self) -> Decimal {
        match self {
            Self::SmaCrossover(s) => s.quantity,
            Self::BuyHold(s) => s.quantity,
            Self::ZeroDteCreditSpread(s) => Decimal::from(s.contracts),
        }
    }

    /// Whether the variant runs on daily bars alone.
    #[must_use]
    pub const fn is_bar_strategy(&self) -> bool {
        !matches!(self, Self::ZeroDteCreditSpread(_))
    }

    /// # Errors
    ///
    /// Returns `CoreError::MalformedSnapshot` when the snapshot does not fit
    /// the variant (wrong ticker, unordered bars, missing chain).
    pub fn evaluate(&self, snapshot: &MarketSnapshot, ctx: &EvalContext<'_>) -> CoreResult<Evaluation> {
        validate_bars(snapshot, self.symbol())?;
        match self {
            Self::SmaCrossover(s) => Ok(Evaluation::Signal(s.evaluate(snapshot))),
            Self::BuyHold(s) => Ok(Evaluation::Signal(s.evaluate(snapshot, ctx.holding))),
            Self::ZeroDteCreditSpread(s) => s.evaluate(snapshot, ctx.clock),
        }
    }
}

fn validate_bars(snapshot: &MarketSnapshot, symbol: &str) -> CoreResult<()> {
    if let Some(bar) = snapshot
        .bars
        .iter()
        .find(|b| !b.ticker.eq_ignore_ascii_case(symbol))
    {
        return Err(CoreError::MalformedSnapshot(format!(
            "bar for {} in a {symbol} snapshot",
            bar.ticker
        )));
    }
    if snapshot.bars.windows(2).any(|w| w[0].date >= w[1].date) {
        return Err(CoreError::MalformedSnapshot(format!(
            "{symbol} bars are not in ascending date order"
        )));
    }
    Ok(())
}
