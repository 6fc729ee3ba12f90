use axum::{extract::State, Json};
use std::sync::Arc;

use crate::AppState;
use breakout_scanner::{ScanStats, ScoredCoin, SourceHealth};

/// GET /health - Upstream health and scanner state
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sources = vec![state.coinbase.health().await];
    let all_healthy = sources.iter().all(|h| h.is_healthy);

    Json(HealthResponse {
        status: if all_healthy { "healthy".to_string() } else { "degraded".to_string() },
        scanning: state.scanner.is_scanning(),
        sources,
    })
}

/// GET /stats - Current scan loop counters
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ScanStats> {
    Json(state.scanner.stats())
}

/// GET /top-coins - Shortlist the scanner was started with
pub async fn get_top_coins(State(state): State<Arc<AppState>>) -> Json<TopCoinsResponse> {
    let coins = state.shortlist.clone();
    Json(TopCoinsResponse {
        count: coins.len(),
        coins,
    })
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub scanning: bool,
    pub sources: Vec<SourceHealth>,
}

#[derive(Debug, serde::Serialize)]
pub struct TopCoinsResponse {
    pub count: usize,
    pub coins: Vec<ScoredCoin>,
}
