//! Health check and metrics handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: ReadyChecks,
}

#[derive(Serialize)]
pub struct ReadyChecks {
    pub llm_model: String,
    pub embedding_model: String,
    pub web_search: WebSearchCheck,
    pub active_sessions: usize,
}

#[derive(Serialize)]
pub struct WebSearchCheck {
    pub provider: String,
    pub configured: bool,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: askdocs_common::VERSION.to_string(),
    })
}

/// Readiness probe - reports which adapters the pipeline was built with.
///
/// An unconfigured web search is not a failure: web and hybrid questions
/// degrade to documents only.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let web = state.pipeline.web_search();

    Json(ReadyResponse {
        status: "ready".to_string(),
        checks: ReadyChecks {
            llm_model: state.pipeline.model_name().to_string(),
            embedding_model: state.pipeline.embedder().model_name().to_string(),
            web_search: WebSearchCheck {
                provider: web.provider_name().to_string(),
                configured: web.is_configured(),
            },
            active_sessions: state.sessions.len().await,
        },
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}
