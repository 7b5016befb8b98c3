//! Option Premium Estimator
//!
//! Prices an option when no live quote is available:
//! - Intrinsic value from the reference price and strike
//! - Time value from a fraction of the reference price, scaled by volatility
//! - Piecewise-linear decay of time value with distance from the strike
//! - Rounding to the exchange tick and a minimum premium floor
//!
//! The estimate is a pure function of its inputs so backtests replay exactly.

use crate::error::EngineError;
use crate::types::{InstrumentProfile, OptionContract, OptionKind};
use tracing::debug;

/// Time value retained at distances from the strike, in strike intervals.
/// Linear between breakpoints, flat after the last one.
const DECAY_BANDS: [(f64, f64); 4] = [(0.0, 1.0), (1.0, 0.7), (3.0, 0.3), (6.0, 0.1)];

/// Deterministic premium model for one instrument profile.
#[derive(Debug, Clone)]
pub struct PremiumEstimator {
    profile: InstrumentProfile,
}

impl PremiumEstimator {
    pub fn new(profile: InstrumentProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &InstrumentProfile {
        &self.profile
    }

    /// In-the-money part of the premium.
    pub fn intrinsic_value(reference_price: f64, strike: f64, kind: OptionKind) -> f64 {
        match kind {
            OptionKind::Call => (reference_price - strike).max(0.0),
            OptionKind::Put => (strike - reference_price).max(0.0),
        }
    }

    /// Volatility scaling of the ATM time value, floored by the profile.
    pub fn volatility_multiplier(&self, volatility_measure: f64) -> f64 {
        let p = &self.profile;
        (volatility_measure / p.reference_volatility * p.volatility_scale)
            .max(p.min_volatility_multiplier)
    }

    /// Share of ATM time value kept at `distance` from the strike.
    pub fn decay_factor(&self, distance: f64) -> f64 {
        let units = distance.abs() / self.profile.strike_interval;

        for window in DECAY_BANDS.windows(2) {
            let (start, from) = window[0];
            let (end, to) = window[1];
            if units <= end {
                return from + (to - from) * (units - start) / (end - start);
            }
        }
        DECAY_BANDS[DECAY_BANDS.len() - 1].1
    }

    /// Unrounded time value. Non-increasing in distance.
    pub fn time_value(&self, reference_price: f64, strike: f64, volatility_measure: f64) -> f64 {
        let base = self.profile.base_premium_fraction * reference_price;
        base * self.volatility_multiplier(volatility_measure)
            * self.decay_factor(reference_price - strike)
    }

    /// Estimate the premium of a contract.
    pub fn estimate(
        &self,
        reference_price: f64,
        strike: f64,
        kind: OptionKind,
        volatility_measure: f64,
    ) -> Result<f64, EngineError> {
        if !reference_price.is_finite() || reference_price <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "reference price must be positive, got {}",
                reference_price
            )));
        }
        if !volatility_measure.is_finite() || volatility_measure <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "volatility measure must be positive, got {}",
                volatility_measure
            )));
        }
        if !strike.is_finite() || strike <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "strike must be positive, got {}",
                strike
            )));
        }

        let intrinsic = Self::intrinsic_value(reference_price, strike, kind);
        let time_value = self.time_value(reference_price, strike, volatility_measure);
        let premium = round_to_tick(intrinsic + time_value, self.profile.tick_size)
            .max(self.profile.min_premium);

        debug!(
            "Estimated {} {} {} @ ref {:.2}, vol {:.2}: intrinsic {:.2} + time {:.2} -> {:.2}",
            self.profile.underlying, strike, kind, reference_price, volatility_measure,
            intrinsic, time_value, premium
        );

        Ok(premium)
    }

    /// Estimate the premium of `contract` at the given market state.
    pub fn estimate_contract(
        &self,
        contract: &OptionContract,
        reference_price: f64,
        volatility_measure: f64,
    ) -> Result<f64, EngineError> {
        self.estimate(reference_price, contract.strike, contract.kind, volatility_measure)
    }
}

/// Round to the nearest multiple of `tick`.
pub fn round_to_tick(value: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return value;
    }
    (value / tick).round() * tick
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nifty() -> PremiumEstimator {
        PremiumEstimator::new(InstrumentProfile::nifty())
    }

    #[test]
    fn test_reference_example() {
        let est = nifty();
        let intrinsic = PremiumEstimator::intrinsic_value(25254.30, 25250.0, OptionKind::Call);
        assert!((intrinsic - 4.30).abs() < 1e-6);

        let time_value = est.time_value(25254.30, 25250.0, 50.0);
        assert!((time_value - 118.10).abs() < 0.01, "time value {}", time_value);

        let premium = est.estimate(25254.30, 25250.0, OptionKind::Call, 50.0).unwrap();
        assert!((premium - 122.40).abs() < 1e-6, "premium {}", premium);
    }

    #[test]
    fn test_put_at_same_strike_has_no_intrinsic() {
        let est = nifty();
        let put = est.estimate(25254.30, 25250.0, OptionKind::Put, 50.0).unwrap();
        let call = est.estimate(25254.30, 25250.0, OptionKind::Call, 50.0).unwrap();
        assert!((call - put - 4.30).abs() < 0.051);
    }

    #[test]
    fn test_decay_bands() {
        let est = nifty();
        assert!((est.decay_factor(0.0) - 1.0).abs() < 1e-12);
        assert!((est.decay_factor(50.0) - 0.7).abs() < 1e-12);
        assert!((est.decay_factor(100.0) - 0.5).abs() < 1e-12);
        assert!((est.decay_factor(150.0) - 0.3).abs() < 1e-12);
        assert!((est.decay_factor(300.0) - 0.1).abs() < 1e-12);
        assert!((est.decay_factor(5_000.0) - 0.1).abs() < 1e-12);
        assert_eq!(est.decay_factor(-75.0), est.decay_factor(75.0));
    }

    #[test]
    fn test_volatility_multiplier_floor() {
        let est = nifty();
        assert!((est.volatility_multiplier(50.0) - 1.2).abs() < 1e-12);
        assert!((est.volatility_multiplier(100.0) - 2.4).abs() < 1e-12);
        assert_eq!(est.volatility_multiplier(1.0), 0.5);
    }

    #[test]
    fn test_otm_premium_non_increasing_in_distance() {
        let est = nifty();
        let reference = 25_000.0;
        for kind in [OptionKind::Call, OptionKind::Put] {
            let mut previous = f64::INFINITY;
            for step in 0..=80 {
                let offset = step as f64 * 12.5;
                let strike = match kind {
                    OptionKind::Call => reference + offset,
                    OptionKind::Put => reference - offset,
                };
                let premium = est.estimate(reference, strike, kind, 35.0).unwrap();
                assert!(premium >= 0.0);
                assert!(premium <= previous + 1e-9, "{} at {} rose", kind, strike);
                previous = premium;
            }
        }
    }

    #[test]
    fn test_time_value_non_increasing_for_any_volatility() {
        let est = PremiumEstimator::new(InstrumentProfile::gold());
        for vol in [1.0, 50.0, 200.0, 900.0] {
            let mut previous = f64::INFINITY;
            for step in 0..200 {
                let tv = est.time_value(71_000.0, 71_000.0 + step as f64 * 7.0, vol);
                assert!(tv <= previous + 1e-9);
                previous = tv;
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let est = nifty();
        let a = est.estimate(24_987.65, 25_100.0, OptionKind::Put, 63.2).unwrap();
        let b = est.estimate(24_987.65, 25_100.0, OptionKind::Put, 63.2).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_floor_and_tick() {
        let est = nifty();
        // Far OTM with tiny volatility still pays the floor
        let premium = est.estimate(1_000.0, 5_000.0, OptionKind::Call, 0.1).unwrap();
        assert_eq!(premium, 5.0);

        let p = est.estimate(24_321.0, 24_300.0, OptionKind::Call, 41.0).unwrap();
        let ticks = p / 0.05;
        assert!((ticks - ticks.round()).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_inputs() {
        let est = nifty();
        assert!(est.estimate(0.0, 25_000.0, OptionKind::Call, 50.0).is_err());
        assert!(est.estimate(25_000.0, 25_000.0, OptionKind::Call, 0.0).is_err());
        assert!(est.estimate(25_000.0, 25_000.0, OptionKind::Call, -3.0).is_err());
        assert!(est.estimate(25_000.0, 0.0, OptionKind::Put, 50.0).is_err());
    }

    #[test]
    fn test_round_to_tick() {
        assert!((round_to_tick(122.394, 0.05) - 122.40).abs() < 1e-9);
        assert!((round_to_tick(122.374, 0.05) - 122.35).abs() < 1e-9);
        assert_eq!(round_to_tick(3.3, 0.0), 3.3);
    }
}
