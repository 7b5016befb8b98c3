//! Instrument Types
//!
//! Per-instrument constants used by strike selection, premium estimation and
//! position sizing, plus the option contract a trade is opened on.

use serde::{Deserialize, Serialize};

use super::OptionKind;

/// Estimation and sizing parameters for one underlying.
///
/// These are configuration, not state: a profile never changes while trades
/// referencing it are open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentProfile {
    /// Profile key (e.g. "nifty")
    pub id: String,
    /// Underlying symbol used in contract names (e.g. "NIFTY")
    pub underlying: String,
    /// Distance between listed strikes
    pub strike_interval: f64,
    /// Contract multiplier
    pub lot_size: u32,
    /// ATM time value as a fraction of the reference price
    pub base_premium_fraction: f64,
    /// Volatility measure at which the multiplier equals `volatility_scale`
    pub reference_volatility: f64,
    /// Multiplier applied at the reference volatility
    pub volatility_scale: f64,
    /// Lower bound of the volatility multiplier
    pub min_volatility_multiplier: f64,
    /// Exchange tick size for premiums
    pub tick_size: f64,
    /// Premium floor
    pub min_premium: f64,
    /// Stop-loss distance as a fraction of entry premium
    pub stop_loss_fraction: f64,
    /// Reward multiple of the stop distance used for the target
    pub reward_ratio: f64,
}

impl InstrumentProfile {
    /// NIFTY 50 weekly options.
    pub fn nifty() -> Self {
        Self {
            id: "nifty".to_string(),
            underlying: "NIFTY".to_string(),
            strike_interval: 50.0,
            lot_size: 65,
            base_premium_fraction: 0.004,     // ~100 for a 25000 index
            reference_volatility: 50.0,       // 5-min ATR baseline
            volatility_scale: 1.2,
            min_volatility_multiplier: 0.5,
            tick_size: 0.05,
            min_premium: 5.0,
            stop_loss_fraction: 0.10,
            reward_ratio: 2.0,                // 1:2 risk:reward
        }
    }

    /// BANKNIFTY weekly options.
    pub fn banknifty() -> Self {
        Self {
            id: "banknifty".to_string(),
            underlying: "BANKNIFTY".to_string(),
            strike_interval: 100.0,
            lot_size: 30,
            base_premium_fraction: 0.004,
            reference_volatility: 120.0,
            volatility_scale: 1.2,
            min_volatility_multiplier: 0.5,
            tick_size: 0.05,
            min_premium: 5.0,
            stop_loss_fraction: 0.10,
            reward_ratio: 2.0,
        }
    }

    /// MCX crude oil options.
    pub fn crude() -> Self {
        Self {
            id: "crude".to_string(),
            underlying: "CRUDEOIL".to_string(),
            strike_interval: 50.0,
            lot_size: 100,
            base_premium_fraction: 0.03,
            reference_volatility: 100.0,
            volatility_scale: 1.2,
            min_volatility_multiplier: 0.5,
            tick_size: 0.10,
            min_premium: 5.0,
            stop_loss_fraction: 0.40,
            reward_ratio: 1.25,               // +50% target
        }
    }

    /// MCX gold mini options.
    pub fn gold() -> Self {
        Self {
            id: "gold".to_string(),
            underlying: "GOLDM".to_string(),
            strike_interval: 100.0,
            lot_size: 10,
            base_premium_fraction: 0.025,
            reference_volatility: 200.0,
            volatility_scale: 1.2,
            min_volatility_multiplier: 0.5,
            tick_size: 0.50,
            min_premium: 5.0,
            stop_loss_fraction: 0.40,
            reward_ratio: 1.25,
        }
    }

    /// Look up a preset by key, case-insensitively.
    pub fn by_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "nifty" => Some(Self::nifty()),
            "banknifty" => Some(Self::banknifty()),
            "crude" | "crudeoil" => Some(Self::crude()),
            "gold" | "goldm" => Some(Self::gold()),
            _ => None,
        }
    }
}

impl Default for InstrumentProfile {
    fn default() -> Self {
        Self::nifty()
    }
}

/// An option contract identified by underlying, strike and kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContract {
    pub underlying: String,
    pub strike: f64,
    pub kind: OptionKind,
}

impl OptionContract {
    pub fn new(underlying: impl Into<String>, strike: f64, kind: OptionKind) -> Self {
        Self {
            underlying: underlying.into(),
            strike,
            kind,
        }
    }

    /// Exchange-style display name, e.g. "NIFTY 25250 CE".
    pub fn symbol(&self) -> String {
        format!("{} {} {}", self.underlying, self.strike, self.kind.exchange_code())
    }
}

impl std::fmt::Display for OptionContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
