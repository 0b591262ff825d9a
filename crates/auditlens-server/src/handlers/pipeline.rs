//! Upload, session, and dashboard handlers

use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{AppError, AppState, MAX_UPLOAD_SIZE};
use auditlens_core::error::{Error, ErrorCategory};
use auditlens_core::pipeline::SessionStatus;
use auditlens_core::view::Dashboard;

/// Query parameters for uploads
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    /// Block until the run settles instead of returning once it starts
    #[serde(default)]
    pub wait: bool,
}

/// Map pipeline errors onto HTTP statuses
///
/// Ingestion problems are the caller's to fix and carry their message;
/// anything else is logged and sanitized.
pub(crate) fn pipeline_error(err: Error) -> AppError {
    if matches!(err, Error::PipelineBusy(_)) {
        return AppError::conflict(&err.to_string());
    }
    match err.category() {
        ErrorCategory::Ingestion => AppError::bad_request(&err.to_string()),
        _ => err.into(),
    }
}

/// POST /api/upload - Upload a transaction CSV and start a pipeline run
///
/// Returns 202 with the session once the run is claimed; save and analysis
/// continue in the background. With `?wait=true` the response is sent after
/// the run settles.
pub async fn upload_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SessionStatus>), AppError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|_| AppError::bad_request("Failed to read file data"))?;

            if bytes.len() > MAX_UPLOAD_SIZE {
                return Err(AppError::payload_too_large(&format!(
                    "File too large. Maximum size is {} MB",
                    MAX_UPLOAD_SIZE / 1024 / 1024
                )));
            }

            file_data = Some(bytes.to_vec());
        }
    }

    let file_data = file_data.ok_or_else(|| AppError::bad_request("Missing file field"))?;

    let rows = state
        .orchestrator
        .upload(file_data.as_slice())
        .map_err(pipeline_error)?;
    info!(
        file = file_name.as_deref().unwrap_or("<unnamed>"),
        rows, "Accepted upload"
    );

    if params.wait {
        state.orchestrator.process().await;
        return Ok((StatusCode::OK, Json(state.orchestrator.status())));
    }

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.process().await;
    });

    Ok((StatusCode::ACCEPTED, Json(state.orchestrator.status())))
}

/// GET /api/session - Current phase, status text, and last error
pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(state.orchestrator.status())
}

/// POST /api/reset - Discard the current upload ("New Analysis")
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionStatus>, AppError> {
    state.orchestrator.reset().map_err(pipeline_error)?;
    Ok(Json(state.orchestrator.status()))
}

/// GET /api/dashboard - Scatter series and ranked anomaly table
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Dashboard>, AppError> {
    state
        .orchestrator
        .dashboard()
        .map(Json)
        .ok_or_else(|| AppError::not_found("No analysis results available"))
}
