//! Trade Types
//!
//! Long-premium option trades, the signals that open them and the premium
//! observations that close them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::EngineError;

use super::OptionContract;

// =============================================================================
// Enums
// =============================================================================

/// Option kind. Accepts the exchange codes CE/PE as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionKind {
    #[serde(alias = "CE")]
    Call,
    #[serde(alias = "PE")]
    Put,
}

impl OptionKind {
    /// Exchange suffix used in contract names.
    pub fn exchange_code(&self) -> &'static str {
        match self {
            OptionKind::Call => "CE",
            OptionKind::Put => "PE",
        }
    }
}

impl FromStr for OptionKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CALL" | "CE" => Ok(OptionKind::Call),
            "PUT" | "PE" => Ok(OptionKind::Put),
            other => Err(EngineError::InvalidSignal(format!(
                "unrecognized signal type '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionKind::Call => write!(f, "CALL"),
            OptionKind::Put => write!(f, "PUT"),
        }
    }
}

/// Trade lifecycle status. Every status other than `Open` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Open,
    TargetHit,
    StopLossHit,
    ManualExit,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Open)
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::TargetHit => write!(f, "TARGET_HIT"),
            TradeStatus::StopLossHit => write!(f, "STOP_LOSS_HIT"),
            TradeStatus::ManualExit => write!(f, "MANUAL_EXIT"),
        }
    }
}

// =============================================================================
// Signals
// =============================================================================

/// Raw entry signal as produced by a strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    /// "CALL"/"PUT" (or "CE"/"PE")
    #[serde(default)]
    pub signal_type: String,
    /// Originating strategy name
    #[serde(default)]
    pub strategy: String,
    /// Underlying price the signal was generated at
    #[serde(default)]
    pub reference_price: Option<f64>,
    /// ATR-like volatility measure
    #[serde(default)]
    pub volatility_measure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Signal {
    pub fn new(
        signal_type: impl Into<String>,
        strategy: impl Into<String>,
        reference_price: f64,
        volatility_measure: f64,
    ) -> Self {
        Self {
            signal_type: signal_type.into(),
            strategy: strategy.into(),
            reference_price: Some(reference_price),
            volatility_measure: Some(volatility_measure),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Check the signal's shape. Numeric ranges are left to the pricing steps.
    pub fn validate(&self) -> Result<ValidSignal, EngineError> {
        let kind = OptionKind::from_str(&self.signal_type)?;

        let strategy = self.strategy.trim();
        if strategy.is_empty() {
            return Err(EngineError::InvalidSignal("missing strategy".to_string()));
        }

        let reference_price = self
            .reference_price
            .ok_or_else(|| EngineError::InvalidSignal("missing reference price".to_string()))?;
        let volatility_measure = self
            .volatility_measure
            .ok_or_else(|| EngineError::InvalidSignal("missing volatility measure".to_string()))?;

        Ok(ValidSignal {
            kind,
            strategy: strategy.to_string(),
            reference_price,
            volatility_measure,
            notes: self.notes.clone().unwrap_or_default(),
        })
    }
}

/// A signal whose shape has been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSignal {
    pub kind: OptionKind,
    pub strategy: String,
    pub reference_price: f64,
    pub volatility_measure: f64,
    pub notes: String,
}

// =============================================================================
// Premium Observations
// =============================================================================

/// Premium range observed for a contract during one tick.
///
/// A single quote is a zero-width bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PremiumBar {
    pub low: f64,
    pub high: f64,
    pub last: f64,
}

impl PremiumBar {
    pub fn at(price: f64) -> Self {
        Self {
            low: price,
            high: price,
            last: price,
        }
    }

    pub fn new(low: f64, high: f64, last: f64) -> Result<Self, EngineError> {
        let finite = low.is_finite() && high.is_finite() && last.is_finite();
        if !finite || low < 0.0 || low > high || last < low || last > high {
            return Err(EngineError::InvalidInput(format!(
                "inconsistent premium bar low={} high={} last={}",
                low, high, last
            )));
        }
        Ok(Self { low, high, last })
    }
}

impl From<f64> for PremiumBar {
    fn from(price: f64) -> Self {
        PremiumBar::at(price)
    }
}

// =============================================================================
// Trade
// =============================================================================

/// Everything needed to open a trade, computed before any state changes.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTicket {
    pub strategy: String,
    pub contract: OptionContract,
    pub reference_price: f64,
    pub entry_premium: f64,
    pub quantity: u32,
    pub stop_loss_premium: f64,
    pub target_premium: f64,
    pub notes: String,
}

impl TradeTicket {
    /// Cash debited when the ticket is filled.
    pub fn cost(&self) -> f64 {
        self.entry_premium * self.quantity as f64
    }
}

/// A long option premium position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub strategy: String,
    pub underlying: String,
    pub kind: OptionKind,
    pub strike: f64,
    pub reference_price_at_entry: f64,
    pub entry_premium: f64,
    pub entry_time: DateTime<Utc>,
    pub quantity: u32,
    pub stop_loss_premium: f64,
    pub target_premium: f64,
    pub status: TradeStatus,
    #[serde(default)]
    pub exit_premium: Option<f64>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pnl: Option<f64>,
    /// Last observed premium; frozen once the trade closes
    pub mark_premium: f64,
    #[serde(default)]
    pub notes: String,
}

impl Trade {
    pub fn from_ticket(id: String, ticket: TradeTicket, entry_time: DateTime<Utc>) -> Self {
        Self {
            id,
            strategy: ticket.strategy,
            underlying: ticket.contract.underlying,
            kind: ticket.contract.kind,
            strike: ticket.contract.strike,
            reference_price_at_entry: ticket.reference_price,
            entry_premium: ticket.entry_premium,
            entry_time,
            quantity: ticket.quantity,
            stop_loss_premium: ticket.stop_loss_premium,
            target_premium: ticket.target_premium,
            status: TradeStatus::Open,
            exit_premium: None,
            exit_time: None,
            pnl: None,
            mark_premium: ticket.entry_premium,
            notes: ticket.notes,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn contract(&self) -> OptionContract {
        OptionContract::new(self.underlying.clone(), self.strike, self.kind)
    }

    /// Premium paid at entry.
    pub fn entry_cost(&self) -> f64 {
        self.entry_premium * self.quantity as f64
    }

    /// P&L of the position if it were closed at `premium`.
    pub fn pnl_at(&self, premium: f64) -> f64 {
        (premium - self.entry_premium) * self.quantity as f64
    }

    /// Decide whether a bar closes the trade, and at what premium.
    ///
    /// The stop is checked first: a bar that breaches both thresholds is a
    /// stop-loss. Exits are pinned to the threshold, not the observed price.
    pub fn exit_trigger(&self, bar: &PremiumBar) -> Option<(TradeStatus, f64)> {
        if !self.is_open() {
            return None;
        }
        if bar.low <= self.stop_loss_premium {
            Some((TradeStatus::StopLossHit, self.stop_loss_premium))
        } else if bar.high >= self.target_premium {
            Some((TradeStatus::TargetHit, self.target_premium))
        } else {
            None
        }
    }

    /// Record the latest observed premium. Ignored once terminal.
    pub fn update_mark(&mut self, premium: f64) {
        if self.is_open() {
            self.mark_premium = premium;
        }
    }

    /// Transition to a terminal status. Fails if already terminal.
    pub fn close(
        &mut self,
        status: TradeStatus,
        exit_premium: f64,
        exit_time: DateTime<Utc>,
    ) -> Result<f64, EngineError> {
        if !self.is_open() {
            return Err(EngineError::TradeNotFound(format!(
                "{} is already {}",
                self.id, self.status
            )));
        }
        if !status.is_terminal() {
            return Err(EngineError::InvalidInput(
                "cannot close a trade into OPEN".to_string(),
            ));
        }

        let pnl = self.pnl_at(exit_premium);
        self.status = status;
        self.exit_premium = Some(exit_premium);
        self.exit_time = Some(exit_time);
        self.pnl = Some(pnl);
        self.mark_premium = exit_premium;
        Ok(pnl)
    }
}
