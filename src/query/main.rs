//! Query server for Baltic containment checks.
//!
//! Thin HTTP adapter over [`ContainmentEngine`]: parses query-string
//! coordinates and returns the containment flags as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use baltic_pip::config::Config;
use baltic_pip::pip::{Containment, ContainmentEngine, IndexStatus};

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Baltic containment query server")]
struct Args {
    /// Optional TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Index artifact path (overrides config)
    #[arg(long)]
    index: Option<PathBuf>,
}

/// Application state shared across handlers
struct AppState {
    engine: ContainmentEngine,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(index) = args.index {
        config.engine.index_path = index;
    }

    info!("Baltic Query Server");

    let engine = ContainmentEngine::from_config(&config.engine);
    // Load up front so /health reflects the index state from the start
    let engine = tokio::task::spawn_blocking(move || {
        engine.load_index();
        engine
    })
    .await?;
    if engine.status() == IndexStatus::Unavailable {
        warn!("Serving in degraded mode: polygon containment answers will be false");
    }

    let state = Arc::new(AppState { engine });

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/contains", get(contains_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", config.server.listen);

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (index_loaded, items) = match state.engine.status() {
        IndexStatus::Loaded { items } => (true, items),
        IndexStatus::NotLoaded | IndexStatus::Unavailable => (false, 0),
    };

    Json(HealthResponse {
        status: if index_loaded { "ok" } else { "degraded" },
        index_loaded,
        items,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    index_loaded: bool,
    items: usize,
}

/// Containment check for a single point
async fn contains_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ContainsParams>,
) -> Result<Json<Containment>, (StatusCode, String)> {
    state
        .engine
        .check_containment(params.lon, params.lat)
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

#[derive(Deserialize)]
struct ContainsParams {
    /// Longitude in degrees
    lon: f64,
    /// Latitude in degrees
    lat: f64,
}
