//! Desk API
//!
//! - GET /api/desk - Snapshot of every strategy and open trade
//! - GET /api/strategies/:strategy - Full portfolio record
//! - GET /api/strategies/:strategy/stats - Performance statistics
//! - POST /api/strategies/:strategy/reset - Reset to initial capital

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use tracing::warn;

use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::types::{DeskSnapshot, Portfolio, PortfolioStats};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/desk", get(get_desk))
        .route("/strategies/:strategy", get(get_strategy))
        .route("/strategies/:strategy/stats", get(get_strategy_stats))
        .route("/strategies/:strategy/reset", post(reset_strategy))
}

/// GET /api/desk
///
/// Open trades are valued at their last observed premium.
async fn get_desk(State(state): State<AppState>) -> Json<ApiResponse<DeskSnapshot>> {
    let engine = state.engine.lock().await;
    Json(ApiResponse {
        data: engine.snapshot(&HashMap::new()),
    })
}

/// GET /api/strategies/:strategy
async fn get_strategy(
    State(state): State<AppState>,
    Path(strategy): Path<String>,
) -> Result<Json<ApiResponse<Portfolio>>> {
    let engine = state.engine.lock().await;
    let portfolio = engine
        .portfolio(&strategy)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Strategy not found: {}", strategy)))?;
    Ok(Json(ApiResponse { data: portfolio }))
}

/// GET /api/strategies/:strategy/stats
async fn get_strategy_stats(
    State(state): State<AppState>,
    Path(strategy): Path<String>,
) -> Result<Json<ApiResponse<PortfolioStats>>> {
    let engine = state.engine.lock().await;
    let stats = engine
        .stats(&strategy, &HashMap::new())
        .ok_or_else(|| AppError::NotFound(format!("Strategy not found: {}", strategy)))?;
    Ok(Json(ApiResponse { data: stats }))
}

/// POST /api/strategies/:strategy/reset
async fn reset_strategy(
    State(state): State<AppState>,
    Path(strategy): Path<String>,
) -> Result<Json<ApiResponse<Portfolio>>> {
    let mut engine = state.engine.lock().await;
    if engine.portfolio(&strategy).is_none() {
        return Err(AppError::NotFound(format!("Strategy not found: {}", strategy)));
    }
    engine.reset(&strategy)?;
    if let Err(e) = engine.persist(&state.store) {
        warn!("Reset of {} not yet persisted: {}", strategy, e);
    }

    let portfolio = engine
        .portfolio(&strategy)
        .cloned()
        .ok_or_else(|| AppError::Internal(format!("Strategy vanished: {}", strategy)))?;
    Ok(Json(ApiResponse { data: portfolio }))
}
