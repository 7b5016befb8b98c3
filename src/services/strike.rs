//! ATM strike selection.

use crate::error::EngineError;

/// Round a reference price to the nearest listed strike.
///
/// Ties round up (`f64::round` rounds half away from zero and both inputs are
/// positive).
pub fn atm_strike(reference_price: f64, strike_interval: f64) -> Result<f64, EngineError> {
    if !reference_price.is_finite() || reference_price <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "reference price must be positive, got {}",
            reference_price
        )));
    }
    if !strike_interval.is_finite() || strike_interval <= 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "strike interval must be positive, got {}",
            strike_interval
        )));
    }

    Ok((reference_price / strike_interval).round() * strike_interval)
}
