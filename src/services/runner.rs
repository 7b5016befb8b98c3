//! Tick Runner
//!
//! Drives the engine on a fixed interval: pull the underlying's reference
//! price and volatility from the quote boundary, value every open trade
//! (live quote first, estimate otherwise), apply stop-loss/target rules and
//! checkpoint the result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::services::engine::{write_checkpoints, TradingEngine};
use crate::services::quotes::{QuoteCache, QuoteSource};
use crate::services::store::PortfolioStore;
use crate::types::Trade;

/// Base delay before the first persistence retry
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Outcome of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub reference_price: f64,
    pub volatility_measure: f64,
    /// Open trades valued this tick
    pub marked: usize,
    /// Trades closed by stop-loss or target this tick
    pub closed: Vec<Trade>,
    /// Portfolios written to the store
    pub persisted: usize,
}

/// Interval driver for a shared engine.
pub struct TickRunner {
    engine: Arc<Mutex<TradingEngine>>,
    store: PortfolioStore,
    source: Arc<dyn QuoteSource>,
    cache: QuoteCache,
    tick_interval: Duration,
    persist_retries: u32,
    shutdown_tx: broadcast::Sender<()>,
    stopped: AtomicBool,
}

impl TickRunner {
    pub fn new(
        engine: Arc<Mutex<TradingEngine>>,
        store: PortfolioStore,
        source: Arc<dyn QuoteSource>,
        tick_interval: Duration,
        quote_ttl: Duration,
        persist_retries: u32,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            engine,
            store,
            source,
            cache: QuoteCache::new(quote_ttl),
            tick_interval,
            persist_retries,
            shutdown_tx,
            stopped: AtomicBool::new(false),
        }
    }

    /// Run until `stop` is called.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        info!(
            "Tick runner started: {}s interval, quotes from {}",
            self.tick_interval.as_secs(),
            self.source.name()
        );
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if !report.closed.is_empty() => {
                            info!("Tick closed {} trade(s)", report.closed.len());
                        }
                        Ok(_) => {}
                        Err(e) => error!("Tick error: {}", e),
                    }
                    self.cache.cleanup();
                }
                _ = shutdown_rx.recv() => {
                    info!("Tick runner received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Signal the run loop to exit.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Run a single tick.
    pub async fn tick(&self) -> Result<TickReport, EngineError> {
        let (underlying, contracts) = {
            let engine = self.engine.lock().await;
            let contracts: Vec<_> = engine
                .open_trades()
                .into_iter()
                .map(|t| t.contract())
                .collect();
            (engine.profile().underlying.clone(), contracts)
        };

        let source = self.source.as_ref();
        let reference_price = self.cache.reference_price(source, &underlying).await?;
        let volatility_measure = self.cache.volatility_measure(source, &underlying).await?;

        let mut live = HashMap::new();
        for contract in contracts {
            match self.cache.premium(source, &contract).await {
                Ok(Some(premium)) => {
                    live.insert(contract.symbol(), premium);
                }
                Ok(None) => {}
                Err(e) => warn!("No live quote for {}: {}", contract, e),
            }
        }

        // Held for the whole evaluate pass
        let mut engine = self.engine.lock().await;
        let marks = engine.mark_to_market(reference_price, volatility_measure, |c| {
            live.get(&c.symbol()).copied()
        })?;
        debug!(
            "Tick @ {:.2} (vol {:.2}): {} open trade(s) marked",
            reference_price,
            volatility_measure,
            marks.len()
        );

        let closed = engine.evaluate_all(&marks);
        let marked = marks.len();
        drop(engine);

        let persisted = self.persist_with_retry().await?;

        Ok(TickReport {
            reference_price,
            volatility_measure,
            marked,
            closed,
            persisted,
        })
    }

    /// Persist with exponential backoff. Files are written and retries wait
    /// without holding the engine lock. State in memory stays authoritative
    /// when every attempt fails.
    pub async fn persist_with_retry(&self) -> Result<usize, EngineError> {
        let mut written = 0;
        let mut attempt = 0;
        loop {
            let pending = self.engine.lock().await.pending_checkpoints();
            if pending.is_empty() {
                return Ok(written);
            }

            let (saved, result) = write_checkpoints(&self.store, pending);
            written += saved.len();
            self.engine.lock().await.mark_persisted(&saved);

            match result {
                Ok(()) => {
                    debug!("Persisted {} portfolio(s)", written);
                    return Ok(written);
                }
                Err(e) if attempt < self.persist_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    warn!(
                        "Persist attempt {} failed: {}, retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Persist failed after {} attempt(s): {}", attempt + 1, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::quotes::QuoteFuture;
    use crate::types::{InstrumentProfile, OptionContract, Signal, TradeStatus};
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    /// Fixed market with a settable option premium.
    struct ScriptedSource {
        premium: StdMutex<Option<f64>>,
    }

    impl QuoteSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch_reference_price<'a>(&'a self, _underlying: &'a str) -> QuoteFuture<'a, f64> {
            Box::pin(async { Ok(25254.30) })
        }

        fn fetch_volatility_measure<'a>(&'a self, _underlying: &'a str) -> QuoteFuture<'a, f64> {
            Box::pin(async { Ok(50.0) })
        }

        fn fetch_current_premium<'a>(
            &'a self,
            _contract: &'a OptionContract,
        ) -> QuoteFuture<'a, Option<f64>> {
            let premium = self.premium.lock().map(|p| *p).unwrap_or(None);
            Box::pin(async move { Ok(premium) })
        }
    }

    fn create_test_store(name: &str) -> PortfolioStore {
        let dir = PathBuf::from(format!(".test_store_{}", name));
        if dir.exists() {
            let _ = std::fs::remove_dir_all(&dir);
        }
        PortfolioStore::open(dir).unwrap()
    }

    fn runner(store: PortfolioStore, premium: Option<f64>) -> (TickRunner, Arc<Mutex<TradingEngine>>) {
        let engine = TradingEngine::new(InstrumentProfile::nifty(), 100_000.0, 0.02).unwrap();
        let engine = Arc::new(Mutex::new(engine));
        let source = Arc::new(ScriptedSource {
            premium: StdMutex::new(premium),
        });
        let runner = TickRunner::new(
            engine.clone(),
            store,
            source,
            Duration::from_millis(20),
            Duration::from_millis(0),
            2,
        );
        (runner, engine)
    }

    #[tokio::test]
    async fn test_tick_closes_on_stop_and_persists() {
        let store = create_test_store("runner_stop");
        let (runner, engine) = runner(store.clone(), Some(65.0));

        let trade = engine
            .lock()
            .await
            .open(&Signal::new("CALL", "orb", 25254.30, 50.0), |_| Some(77.70))
            .unwrap();

        let report = runner.tick().await.unwrap();
        assert_eq!(report.marked, 1);
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].id, trade.id);
        assert_eq!(report.closed[0].status, TradeStatus::StopLossHit);
        assert_eq!(report.persisted, 1);

        let saved = store.load("orb").unwrap().unwrap();
        assert_eq!(saved.open_count(), 0);
        assert_eq!(saved.closed_trades().len(), 1);
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn test_tick_uses_estimate_without_live_quote() {
        let store = create_test_store("runner_estimate");
        let (runner, engine) = runner(store.clone(), None);

        let trade = engine
            .lock()
            .await
            .open(&Signal::new("PUT", "orb", 25254.30, 50.0), |_| Some(110.0))
            .unwrap();

        let report = runner.tick().await.unwrap();
        assert!(report.closed.is_empty());
        // Estimated put premium at the same reference is 118.10
        let marked = engine.lock().await.find_trade(&trade.id).unwrap().mark_premium;
        assert!((marked - 118.10).abs() < 1e-6);
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn test_idle_tick_writes_nothing() {
        let store = create_test_store("runner_idle");
        let (runner, _engine) = runner(store.clone(), None);
        let report = runner.tick().await.unwrap();
        assert_eq!(report.marked, 0);
        assert_eq!(report.persisted, 0);
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn test_persist_retries_then_fails() {
        let store = create_test_store("runner_retry");
        let (runner, engine) = runner(store.clone(), None);
        engine
            .lock()
            .await
            .open_estimated(&Signal::new("CALL", "orb", 25254.30, 50.0))
            .unwrap();

        // Removing the directory makes every write fail
        std::fs::remove_dir_all(store.dir()).unwrap();
        let result = runner.persist_with_retry().await;
        assert!(matches!(result, Err(EngineError::Persistence(_))));

        let guard = engine.lock().await;
        assert!(guard.has_unsaved_changes());
        assert_eq!(guard.open_trades().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_stays_available_during_retry_backoff() {
        let store = create_test_store("runner_backoff");
        let (runner, engine) = runner(store.clone(), None);
        engine
            .lock()
            .await
            .open_estimated(&Signal::new("CALL", "orb", 25254.30, 50.0))
            .unwrap();
        std::fs::remove_dir_all(store.dir()).unwrap();

        let runner = Arc::new(runner);
        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.persist_with_retry().await })
        };

        // First attempt has failed and the runner is waiting 100ms to retry
        sleep(Duration::from_millis(40)).await;
        {
            let mut guard = engine.try_lock().expect("engine locked during backoff");
            guard
                .open_estimated(&Signal::new("PUT", "vwap", 25254.30, 50.0))
                .unwrap();
        }
        std::fs::create_dir_all(store.dir()).unwrap();

        let written = handle.await.unwrap().unwrap();
        assert_eq!(written, 2);
        assert!(!engine.lock().await.has_unsaved_changes());
        assert!(store.load("vwap").unwrap().is_some());
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = create_test_store("runner_shutdown");
        let (runner, _engine) = runner(store.clone(), None);
        let runner = Arc::new(runner);

        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run().await })
        };
        sleep(Duration::from_millis(50)).await;
        runner.stop();

        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.is_ok());
        let _ = std::fs::remove_dir_all(store.dir());
    }
}
