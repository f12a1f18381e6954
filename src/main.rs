//! tradestack service binary
//!
//! Loads the local HS-code dataset, then serves the lookup API:
//! searching codes, reading tariff/gain details, selecting a code to
//! start an incremental Comtrade fetch sequence, and polling the chart
//! snapshot as it fills in.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tradestack::{
    AppState, ComtradeClient, Config, HsDataset, IncrementalLoader, SharedChart,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = Arc::new(Config::from_env());
    info!(
        dataset = %config.dataset_path,
        reporter = config.reporter,
        "configuration loaded"
    );

    let dataset = Arc::new(
        HsDataset::load(&config.dataset_path)
            .with_context(|| format!("loading HS dataset from {}", config.dataset_path))?,
    );

    let chart = Arc::new(SharedChart::new());
    let client = ComtradeClient::new(&config);
    let loader = Arc::new(IncrementalLoader::new(client, chart.clone(), &config));

    // Bookmark restore: selecting via the environment must reproduce
    // the same state as selecting through the API.
    if let Some(hs6) = &config.startup_hs6 {
        if dataset.lookup(hs6).is_some() {
            let epoch = loader.select(hs6.clone());
            info!(hs6 = %hs6, epoch, "restored selection from environment");
        } else {
            warn!(hs6 = %hs6, "startup HS6 not covered by local dataset, ignoring");
        }
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        dataset,
        chart,
        loader,
    });

    let app = Router::new()
        // Health
        .route("/health", get(api_health))
        // Lookup
        .route("/api/search", get(api_search))
        .route("/api/product/{hs6}", get(api_product))
        // Chart
        .route("/api/select/{hs6}", post(api_select))
        .route("/api/chart", get(api_chart))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!(addr = %addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// API Handlers
// =============================================================================

async fn api_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "tradestack",
        "codes": state.dataset.len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

/// Autocomplete source: case-insensitive prefix/substring filter
async fn api_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<serde_json::Value> {
    let hits = state.dataset.search(&params.q);
    Json(serde_json::json!(hits
        .iter()
        .map(|r| {
            serde_json::json!({
                "hs6": r.hs6,
                "description": r.description,
            })
        })
        .collect::<Vec<_>>()))
}

async fn api_product(
    State(state): State<Arc<AppState>>,
    Path(hs6): Path<String>,
) -> Json<serde_json::Value> {
    match state.dataset.lookup(&hs6) {
        Some(record) => Json(serde_json::json!({
            "hs6": record.hs6,
            "description": record.description,
            "tariff_rate": record.tariff_rate,
            "canada_gain": tradestack::dataset::gain_label(record.canada_gain),
            "canada_gain_percent": record.canada_gain_percent,
            "provincial_gains": record.provincial_lines(),
        })),
        None => Json(not_covered(&hs6)),
    }
}

/// Confirm a selection: validates against the local dataset, then
/// starts a new fetch epoch. An unknown code never reaches the remote
/// API.
async fn api_select(
    State(state): State<Arc<AppState>>,
    Path(hs6): Path<String>,
) -> Json<serde_json::Value> {
    if state.dataset.lookup(&hs6).is_none() {
        return Json(not_covered(&hs6));
    }
    let epoch = state.loader.select(hs6.clone());
    Json(serde_json::json!({
        "status": "loading",
        "hs6": hs6,
        "epoch": epoch,
    }))
}

async fn api_chart(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.chart.snapshot()))
}

fn not_covered(hs6: &str) -> serde_json::Value {
    serde_json::json!({
        "status": "not_covered",
        "hs6": hs6,
        "message": "This product code is not covered by the local dataset; try the Canada Tariff Finder for other codes.",
    })
}
