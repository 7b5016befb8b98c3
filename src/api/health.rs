use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    instrument: String,
    risk_fraction: f64,
    tick_secs: u64,
    simulated_feed: bool,
    strategies: usize,
    open_trades: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.engine.lock().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        instrument: engine.profile().id.clone(),
        risk_fraction: state.config.risk_fraction,
        tick_secs: state.config.tick_secs,
        simulated_feed: state.config.simulation.is_some(),
        strategies: engine.strategies().len(),
        open_trades: engine.open_trades().len(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok",
            version: "1.0.0",
            instrument: "nifty".to_string(),
            risk_fraction: 0.02,
            tick_secs: 60,
            simulated_feed: false,
            strategies: 0,
            open_trades: 0,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"openTrades\":0"));
        assert!(json.contains("\"riskFraction\":0.02"));
        assert!(json.contains("\"simulatedFeed\":false"));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let (state, dir) = test_state("health");
        let Json(response) = health(State(state)).await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(response.instrument, "nifty");
        assert_eq!(response.risk_fraction, 0.02);
        assert_eq!(response.tick_secs, 60);
        assert!(!response.simulated_feed);
        let _ = std::fs::remove_dir_all(dir);
    }
}
