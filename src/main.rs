use paperstrike::api;
use paperstrike::config::Config;
use paperstrike::services::{PortfolioStore, SimulatedFeed, TickRunner, TradingEngine};
use paperstrike::AppState;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paperstrike=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!(
        "Starting PaperStrike on {}:{} trading {} ({} per strategy, {:.1}% risk)",
        config.host,
        config.port,
        config.instrument.underlying,
        config.initial_capital,
        config.risk_fraction * 100.0
    );

    // Restore portfolios from the last checkpoint
    let store = PortfolioStore::open(config.data_dir.clone())?;
    let engine = TradingEngine::restore(
        config.instrument.clone(),
        config.initial_capital,
        config.risk_fraction,
        &store,
    )?;
    info!(
        "Restored {} strategy portfolio(s) from {:?}",
        engine.strategies().len(),
        store.dir()
    );

    let state = AppState::new(config.clone(), engine, store.clone());

    // Start the tick runner when a quote feed is configured
    let runner = match &config.simulation {
        Some(sim) => {
            let feed = SimulatedFeed::new(
                config.instrument.underlying.clone(),
                sim.reference_price,
                sim.volatility_measure,
                sim.seed,
            )?;
            let runner = Arc::new(TickRunner::new(
                state.engine.clone(),
                store.clone(),
                Arc::new(feed),
                Duration::from_secs(config.tick_secs),
                Duration::from_secs(config.quote_ttl_secs),
                config.persist_retries,
            ));
            {
                let runner = runner.clone();
                tokio::spawn(async move { runner.run().await });
            }
            Some(runner)
        }
        None => {
            warn!("No quote feed configured, trades close only through the API");
            None
        }
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("PaperStrike listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    if let Some(runner) = runner {
        runner.stop();
    }

    // Final checkpoint
    let mut engine = state.engine.lock().await;
    match engine.persist(&store) {
        Ok(written) => info!("Final checkpoint wrote {} portfolio(s)", written),
        Err(e) => warn!("Final checkpoint failed: {}", e),
    }

    Ok(())
}
