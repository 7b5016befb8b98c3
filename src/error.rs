use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Engine error types.
///
/// Every mutating engine operation validates before it changes state, so any of
/// these leaves the portfolio exactly as it was.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient capital: need {needed:.2}, have {available:.2}")]
    InsufficientCapital { needed: f64, available: f64 },

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Persistence(e.to_string())
    }
}

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            AppError::Engine(e) => match e {
                EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                EngineError::InsufficientCapital { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_CAPITAL")
                }
                EngineError::InvalidSignal(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNAL"),
                EngineError::TradeNotFound(_) => (StatusCode::NOT_FOUND, "TRADE_NOT_FOUND"),
                EngineError::Persistence(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::NotFound(msg) | AppError::BadRequest(msg) | AppError::Internal(msg) => {
                msg.clone()
            }
            AppError::Engine(e) => e.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
