//! Health handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;
use auditlens_core::ai::AnalysisBackend;
use auditlens_core::models::Phase;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub phase: Phase,
    pub analysis: AnalysisHealth,
    pub persistence: PersistenceHealth,
}

#[derive(Debug, Serialize)]
pub struct AnalysisHealth {
    pub model: String,
    pub host: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct PersistenceHealth {
    pub enabled: bool,
    pub endpoint: Option<String>,
}

/// GET /api/health - Server liveness plus backend reachability
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let analysis = state.orchestrator.analysis();
    let persistence = state.orchestrator.persistence();

    Json(HealthResponse {
        status: "ok",
        phase: state.orchestrator.phase(),
        analysis: AnalysisHealth {
            model: analysis.model().to_string(),
            host: analysis.host().to_string(),
            available: analysis.health_check().await,
        },
        persistence: PersistenceHealth {
            enabled: persistence.is_enabled(),
            endpoint: persistence.endpoint().map(|s| s.to_string()),
        },
    })
}
