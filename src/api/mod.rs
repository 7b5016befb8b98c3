pub mod desk;
pub mod health;
pub mod trades;

use crate::AppState;
use axum::Router;
use serde::Serialize;

/// Envelope for successful responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api", desk::router().merge(trades::router()))
}

#[cfg(test)]
pub(crate) fn test_state(name: &str) -> (AppState, std::path::PathBuf) {
    use crate::config::Config;
    use crate::services::{PortfolioStore, TradingEngine};
    use crate::types::InstrumentProfile;

    let dir = std::path::PathBuf::from(format!(".test_store_api_{}", name));
    if dir.exists() {
        let _ = std::fs::remove_dir_all(&dir);
    }
    let store = PortfolioStore::open(dir.clone()).unwrap();
    let engine = TradingEngine::new(InstrumentProfile::nifty(), 100_000.0, 0.02).unwrap();
    (AppState::new(Config::default(), engine, store), dir)
}
