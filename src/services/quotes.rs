//! Market Data Boundary
//!
//! The engine never fetches prices itself. A `QuoteSource` supplies the
//! underlying's reference price, its volatility measure and, when a venue
//! lists one, a live option premium. `QuoteCache` memoises those lookups for a
//! short TTL and `SimulatedFeed` is a seeded random walk for paper sessions
//! without a venue.

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::types::OptionContract;

pub type QuoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// Source of market observations for one underlying.
pub trait QuoteSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Current price of the underlying
    fn fetch_reference_price<'a>(&'a self, underlying: &'a str) -> QuoteFuture<'a, f64>;

    /// Current ATR-like volatility measure of the underlying
    fn fetch_volatility_measure<'a>(&'a self, underlying: &'a str) -> QuoteFuture<'a, f64>;

    /// Live premium for a contract; `None` when the source has no quote
    fn fetch_current_premium<'a>(
        &'a self,
        contract: &'a OptionContract,
    ) -> QuoteFuture<'a, Option<f64>>;
}

// =============================================================================
// Cache
// =============================================================================

struct CacheEntry {
    value: f64,
    expires_at: Instant,
}

/// Thread-safe TTL cache of quote values keyed by symbol.
pub struct QuoteCache {
    data: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: DashMap::new(),
            ttl,
        }
    }

    /// Cached value if present and fresh.
    pub fn get(&self, key: &str) -> Option<f64> {
        let entry = self.data.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.value)
        } else {
            drop(entry);
            self.data.remove(key);
            None
        }
    }

    pub fn set(&self, key: impl Into<String>, value: f64) {
        self.data.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop expired entries.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.data.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub async fn reference_price(
        &self,
        source: &dyn QuoteSource,
        underlying: &str,
    ) -> Result<f64, EngineError> {
        let key = format!("ref:{}", underlying);
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = source.fetch_reference_price(underlying).await?;
        self.set(key, value);
        Ok(value)
    }

    pub async fn volatility_measure(
        &self,
        source: &dyn QuoteSource,
        underlying: &str,
    ) -> Result<f64, EngineError> {
        let key = format!("vol:{}", underlying);
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = source.fetch_volatility_measure(underlying).await?;
        self.set(key, value);
        Ok(value)
    }

    /// Live premium, cached only when the source returned one.
    pub async fn premium(
        &self,
        source: &dyn QuoteSource,
        contract: &OptionContract,
    ) -> Result<Option<f64>, EngineError> {
        let key = format!("opt:{}", contract.symbol());
        if let Some(value) = self.get(&key) {
            return Ok(Some(value));
        }
        let value = source.fetch_current_premium(contract).await?;
        if let Some(premium) = value {
            self.set(key, premium);
        }
        Ok(value)
    }
}

// =============================================================================
// Simulated Feed
// =============================================================================

struct WalkState {
    rng: StdRng,
    reference_price: f64,
    volatility_measure: f64,
}

/// Random-walk underlying with no option quotes, so every premium comes from
/// the estimator. Each reference fetch advances the walk by one step.
pub struct SimulatedFeed {
    underlying: String,
    state: Mutex<WalkState>,
}

impl SimulatedFeed {
    pub fn new(
        underlying: impl Into<String>,
        reference_price: f64,
        volatility_measure: f64,
        seed: Option<u64>,
    ) -> Result<Self, EngineError> {
        if !reference_price.is_finite() || reference_price <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "simulated reference price must be positive, got {}",
                reference_price
            )));
        }
        if !volatility_measure.is_finite() || volatility_measure <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "simulated volatility must be positive, got {}",
                volatility_measure
            )));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            underlying: underlying.into(),
            state: Mutex::new(WalkState {
                rng,
                reference_price,
                volatility_measure,
            }),
        })
    }

    fn check_underlying(&self, underlying: &str) -> Result<(), EngineError> {
        if underlying.eq_ignore_ascii_case(&self.underlying) {
            Ok(())
        } else {
            Err(EngineError::InvalidInput(format!(
                "simulated feed serves {}, not {}",
                self.underlying, underlying
            )))
        }
    }

    fn step(&self) -> Result<f64, EngineError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EngineError::InvalidInput("simulated feed poisoned".to_string()))?;

        // Move up to a quarter of the volatility measure per step
        let range = state.volatility_measure * 0.25;
        let delta = state.rng.gen_range(-range..=range);
        state.reference_price = (state.reference_price + delta).max(1.0);

        let drift: f64 = state.rng.gen_range(0.95..=1.05);
        state.volatility_measure = (state.volatility_measure * drift).max(1.0);

        Ok(state.reference_price)
    }

    fn volatility(&self) -> Result<f64, EngineError> {
        self.state
            .lock()
            .map(|s| s.volatility_measure)
            .map_err(|_| EngineError::InvalidInput("simulated feed poisoned".to_string()))
    }
}

impl QuoteSource for SimulatedFeed {
    fn name(&self) -> &str {
        "simulated"
    }

    fn fetch_reference_price<'a>(&'a self, underlying: &'a str) -> QuoteFuture<'a, f64> {
        Box::pin(async move {
            self.check_underlying(underlying)?;
            self.step()
        })
    }

    fn fetch_volatility_measure<'a>(&'a self, underlying: &'a str) -> QuoteFuture<'a, f64> {
        Box::pin(async move {
            self.check_underlying(underlying)?;
            self.volatility()
        })
    }

    fn fetch_current_premium<'a>(
        &'a self,
        _contract: &'a OptionContract,
    ) -> QuoteFuture<'a, Option<f64>> {
        Box::pin(async { Ok(None) })
    }
}
