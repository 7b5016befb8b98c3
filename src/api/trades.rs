//! Trades API
//!
//! - GET /api/trades?status=open|closed&strategy= - List trades
//! - GET /api/trades/:id - Get one trade
//! - POST /api/signals - Open a trade from a strategy signal
//! - POST /api/trades/:id/close?premium= - Manual exit

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::api::ApiResponse;
use crate::error::{AppError, Result};
use crate::services::TradingEngine;
use crate::types::{Signal, Trade};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trades", get(list_trades))
        .route("/trades/:id", get(get_trade))
        .route("/trades/:id/close", post(close_trade))
        .route("/signals", post(submit_signal))
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListTradesQuery {
    pub status: Option<String>,
    pub strategy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseTradeQuery {
    /// Exit premium; the trade's last mark when absent
    pub premium: Option<f64>,
}

/// A signal plus an optional live premium for the ATM contract.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    #[serde(flatten)]
    pub signal: Signal,
    #[serde(default)]
    pub premium: Option<f64>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/trades
async fn list_trades(
    State(state): State<AppState>,
    Query(query): Query<ListTradesQuery>,
) -> Result<Json<ApiResponse<Vec<Trade>>>> {
    let engine = state.engine.lock().await;
    let trades = match query.status.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("all") => engine
            .open_trades()
            .into_iter()
            .chain(engine.closed_trades())
            .cloned()
            .collect::<Vec<_>>(),
        Some("open") => engine.open_trades().into_iter().cloned().collect(),
        Some("closed") => engine.closed_trades().into_iter().cloned().collect(),
        Some(other) => {
            return Err(AppError::BadRequest(format!(
                "Unknown status '{}', expected open or closed",
                other
            )))
        }
    };

    let trades = match query.strategy {
        Some(strategy) => trades.into_iter().filter(|t| t.strategy == strategy).collect(),
        None => trades,
    };
    Ok(Json(ApiResponse { data: trades }))
}

/// GET /api/trades/:id
async fn get_trade(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Trade>>> {
    let engine = state.engine.lock().await;
    let trade = engine
        .find_trade(&id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Trade not found: {}", id)))?;
    Ok(Json(ApiResponse { data: trade }))
}

/// POST /api/signals
async fn submit_signal(
    State(state): State<AppState>,
    Json(request): Json<SignalRequest>,
) -> Result<Json<ApiResponse<Trade>>> {
    let mut engine = state.engine.lock().await;
    let live = request.premium;
    let trade = engine.open(&request.signal, |_| live)?;
    checkpoint(&mut engine, &state);
    Ok(Json(ApiResponse { data: trade }))
}

/// POST /api/trades/:id/close
async fn close_trade(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CloseTradeQuery>,
) -> Result<Json<ApiResponse<Trade>>> {
    let mut engine = state.engine.lock().await;
    let trade = match query.premium {
        Some(premium) => engine.close_manual_at(&id, premium)?,
        None => engine.close_manual(&id)?,
    };
    checkpoint(&mut engine, &state);
    Ok(Json(ApiResponse { data: trade }))
}

/// Persist right away; on failure the next tick retries.
fn checkpoint(engine: &mut TradingEngine, state: &AppState) {
    if let Err(e) = engine.persist(&state.store) {
        warn!("Checkpoint deferred: {}", e);
    }
}
