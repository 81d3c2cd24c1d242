//! Session management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use askdocs_common::{
    errors::{AppError, Result},
    pipeline::{IndexedDocument, SessionState},
};
use askdocs_ingestion::{prepare_directory, ChunkingConfig};

/// Create session response
#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<IndexedDocument>,
}

/// Session state response
#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<IndexedDocument>,
    pub chunk_count: usize,
    pub indexed: bool,
    pub history_length: usize,
}

impl From<&SessionState> for SessionResponse {
    fn from(session: &SessionState) -> Self {
        Self {
            session_id: session.id,
            created_at: session.created_at,
            documents: session.documents.clone(),
            chunk_count: session.chunks.len(),
            indexed: session.has_index(),
            history_length: session.history.len(),
        }
    }
}

/// Create a new session, seeded from `retrieval.seed_dir` when configured
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>)> {
    let mut session = SessionState::new();

    if let Some(dir) = state.config.retrieval.seed_dir.clone() {
        let chunking = ChunkingConfig::from(&state.config.retrieval);
        let documents = tokio::task::spawn_blocking(move || {
            prepare_directory(std::path::Path::new(&dir), &chunking)
        })
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Seed loading task failed: {}", e),
        })??;

        if !documents.is_empty() {
            session = state.pipeline.index_documents(&session, documents).await?;
        }
    }

    let response = CreateSessionResponse {
        session_id: session.id,
        created_at: session.created_at,
        documents: session.documents.clone(),
    };
    state.sessions.insert(session).await;

    tracing::info!(
        session_id = %response.session_id,
        seeded_documents = response.documents.len(),
        "Session created"
    );

    Ok((StatusCode::CREATED, Json(response)))
}

/// Get session state
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>> {
    let handle = state.sessions.get(session_id).await?;
    let session = handle.lock().await;

    Ok(Json(SessionResponse::from(&*session)))
}

/// Drop a session with its index and history
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.sessions.remove(session_id).await?;

    tracing::info!(session_id = %session_id, "Session deleted");

    Ok(StatusCode::NO_CONTENT)
}
