use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::types::InstrumentProfile;

/// Seed values for the simulated quote feed.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Starting price of the underlying.
    pub reference_price: f64,
    /// Starting ATR-like volatility measure.
    pub volatility_measure: f64,
    /// RNG seed; entropy when absent.
    pub seed: Option<u64>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Instrument profile the engine trades.
    pub instrument: InstrumentProfile,
    /// Starting capital of each strategy portfolio.
    pub initial_capital: f64,
    /// Share of available capital risked per trade.
    pub risk_fraction: f64,
    /// Directory holding one JSON checkpoint per strategy.
    pub data_dir: PathBuf,
    /// Seconds between evaluation ticks.
    pub tick_secs: u64,
    /// Seconds a fetched quote stays fresh.
    pub quote_ttl_secs: u64,
    /// Persistence retries after the first failed attempt.
    pub persist_retries: u32,
    /// Simulated feed, enabled when both seed prices are set.
    pub simulation: Option<SimulationConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| parse_var::<_, f64>(&lookup, key);

        let instrument_id = lookup("PAPER_INSTRUMENT").unwrap_or_else(|| "nifty".to_string());
        let instrument = InstrumentProfile::by_id(&instrument_id).unwrap_or_else(|| {
            warn!("Unknown instrument '{}', falling back to nifty", instrument_id);
            InstrumentProfile::nifty()
        });

        let simulation = match (
            parsed("PAPER_SIM_REFERENCE"),
            parsed("PAPER_SIM_VOLATILITY"),
        ) {
            (Some(reference_price), Some(volatility_measure)) => Some(SimulationConfig {
                reference_price,
                volatility_measure,
                seed: parse_var(&lookup, "PAPER_SIM_SEED"),
            }),
            _ => None,
        };

        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var(&lookup, "PORT").unwrap_or(3002),
            instrument,
            initial_capital: parsed("PAPER_INITIAL_CAPITAL").unwrap_or(100_000.0),
            risk_fraction: parsed("PAPER_RISK_FRACTION").unwrap_or(0.02),
            data_dir: lookup("PAPER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(crate::services::store::DATA_DIR)),
            tick_secs: parse_var::<_, u64>(&lookup, "PAPER_TICK_SECS")
                .filter(|s| *s > 0)
                .unwrap_or(60),
            quote_ttl_secs: parse_var(&lookup, "PAPER_QUOTE_TTL_SECS").unwrap_or(5),
            persist_retries: parse_var(&lookup, "PAPER_PERSIST_RETRIES").unwrap_or(3),
            simulation,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}='{}'", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3002);
        assert_eq!(config.instrument.id, "nifty");
        assert_eq!(config.initial_capital, 100_000.0);
        assert_eq!(config.risk_fraction, 0.02);
        assert_eq!(config.data_dir, PathBuf::from(".paperstrike"));
        assert_eq!(config.tick_secs, 60);
        assert_eq!(config.quote_ttl_secs, 5);
        assert_eq!(config.persist_retries, 3);
        assert!(config.simulation.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("PAPER_INSTRUMENT", "GoldM"),
            ("PAPER_INITIAL_CAPITAL", "250000"),
            ("PAPER_DATA_DIR", "/var/lib/paper"),
            ("PAPER_TICK_SECS", "15"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.instrument.underlying, "GOLDM");
        assert_eq!(config.initial_capital, 250_000.0);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/paper"));
        assert_eq!(config.tick_secs, 15);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[
            ("PORT", "eighty"),
            ("PAPER_INSTRUMENT", "bitcoin"),
            ("PAPER_TICK_SECS", "0"),
        ]);
        assert_eq!(config.port, 3002);
        assert_eq!(config.instrument.id, "nifty");
        assert_eq!(config.tick_secs, 60);
    }

    #[test]
    fn test_simulation_needs_both_seeds() {
        let partial = config_from(&[("PAPER_SIM_REFERENCE", "25000")]);
        assert!(partial.simulation.is_none());

        let full = config_from(&[
            ("PAPER_SIM_REFERENCE", "25000"),
            ("PAPER_SIM_VOLATILITY", "48.5"),
            ("PAPER_SIM_SEED", "42"),
        ]);
        assert_eq!(
            full.simulation,
            Some(SimulationConfig {
                reference_price: 25_000.0,
                volatility_measure: 48.5,
                seed: Some(42),
            })
        );
    }
}
