//! PaperStrike - Paper trading engine for ATM index and commodity options

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

use std::sync::Arc;
use tokio::sync::Mutex;

use config::Config;
use services::{PortfolioStore, TradingEngine};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<Mutex<TradingEngine>>,
    pub store: PortfolioStore,
}

impl AppState {
    pub fn new(config: Config, engine: TradingEngine, store: PortfolioStore) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(Mutex::new(engine)),
            store,
        }
    }
}

// Re-export commonly used types
pub use error::{AppError, EngineError};
pub use types::*;
