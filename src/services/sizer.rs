//! Position sizing and exit levels for long premium trades.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Result of sizing a trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sizing {
    /// Capital allowed to be lost on this trade
    pub risk_amount: f64,
    /// Loss of one lot if the stop is hit
    pub risk_per_lot: f64,
    pub lots: u32,
    pub quantity: u32,
}

/// Fixed-fraction risk sizer.
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    risk_fraction: f64,
}

impl PositionSizer {
    pub fn new(risk_fraction: f64) -> Result<Self, EngineError> {
        if !risk_fraction.is_finite() || risk_fraction <= 0.0 || risk_fraction > 1.0 {
            return Err(EngineError::InvalidInput(format!(
                "risk fraction must be in (0, 1], got {}",
                risk_fraction
            )));
        }
        Ok(Self { risk_fraction })
    }

    pub fn risk_fraction(&self) -> f64 {
        self.risk_fraction
    }

    /// Number of whole lots whose stop-loss risk fits the risk budget.
    pub fn size(
        &self,
        available_capital: f64,
        entry_premium: f64,
        stop_loss_fraction: f64,
        lot_size: u32,
    ) -> Result<Sizing, EngineError> {
        if !available_capital.is_finite() || available_capital < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "available capital must be non-negative, got {}",
                available_capital
            )));
        }
        if !entry_premium.is_finite() || entry_premium <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "entry premium must be positive, got {}",
                entry_premium
            )));
        }
        if !stop_loss_fraction.is_finite() || stop_loss_fraction <= 0.0 || stop_loss_fraction >= 1.0
        {
            return Err(EngineError::InvalidInput(format!(
                "stop-loss fraction must be in (0, 1), got {}",
                stop_loss_fraction
            )));
        }
        if lot_size == 0 {
            return Err(EngineError::InvalidInput("lot size must be positive".to_string()));
        }

        let risk_amount = available_capital * self.risk_fraction;
        let risk_per_lot = entry_premium * stop_loss_fraction * lot_size as f64;
        if risk_per_lot > risk_amount {
            return Err(EngineError::InsufficientCapital {
                needed: risk_per_lot,
                available: risk_amount,
            });
        }

        let whole_lots = (risk_amount / risk_per_lot).floor().max(1.0);
        let too_large = || {
            EngineError::InvalidInput(format!(
                "{} lots of {} exceeds the maximum position quantity",
                whole_lots, lot_size
            ))
        };
        if whole_lots > u32::MAX as f64 {
            return Err(too_large());
        }
        let lots = whole_lots as u32;
        let quantity = lots.checked_mul(lot_size).ok_or_else(too_large)?;
        let cost = quantity as f64 * entry_premium;
        if cost > available_capital {
            return Err(EngineError::InsufficientCapital {
                needed: cost,
                available: available_capital,
            });
        }

        Ok(Sizing {
            risk_amount,
            risk_per_lot,
            lots,
            quantity,
        })
    }
}

/// Stop-loss and target premiums for a long position.
///
/// The target sits `reward_ratio` stop-distances above entry.
pub fn exit_levels(
    entry_premium: f64,
    stop_loss_fraction: f64,
    reward_ratio: f64,
) -> Result<(f64, f64), EngineError> {
    if !entry_premium.is_finite() || entry_premium <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "entry premium must be positive, got {}",
            entry_premium
        )));
    }
    if !stop_loss_fraction.is_finite() || stop_loss_fraction <= 0.0 || stop_loss_fraction >= 1.0 {
        return Err(EngineError::InvalidInput(format!(
            "stop-loss fraction must be in (0, 1), got {}",
            stop_loss_fraction
        )));
    }
    if !reward_ratio.is_finite() || reward_ratio <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "reward ratio must be positive, got {}",
            reward_ratio
        )));
    }

    let stop_loss = entry_premium * (1.0 - stop_loss_fraction);
    let target = entry_premium + (entry_premium - stop_loss) * reward_ratio;
    Ok((stop_loss, target))
}
