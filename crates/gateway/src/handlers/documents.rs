//! Document upload handler

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use askdocs_common::{
    errors::{AppError, Result},
    pipeline::{IndexedDocument, PreparedDocument},
};
use askdocs_ingestion::{prepare_document, ChunkingConfig};

/// Upload response
#[derive(Serialize)]
pub struct UploadResponse {
    pub session_id: Uuid,
    pub uploaded: Vec<String>,
    pub documents: Vec<IndexedDocument>,
    pub chunk_count: usize,
}

/// Accept `pdf`, `txt` and `md` files and rebuild the session index.
///
/// Every file must load before anything is indexed; a rejected file leaves
/// the session unchanged.
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let handle = state.sessions.get(session_id).await?;
    let limit = state.config.server.max_upload_bytes;
    let chunking = ChunkingConfig::from(&state.config.retrieval);

    let mut prepared: Vec<PreparedDocument> = Vec::new();
    let mut total_bytes = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation {
        message: format!("Invalid multipart body: {}", e),
        field: None,
    })? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = field.bytes().await.map_err(|e| AppError::Validation {
            message: format!("Failed to read {}: {}", name, e),
            field: Some(name.clone()),
        })?;

        total_bytes += bytes.len();
        if total_bytes > limit {
            return Err(AppError::PayloadTooLarge {
                size: total_bytes,
                limit,
            });
        }
        if bytes.is_empty() {
            return Err(AppError::Validation {
                message: format!("{} is empty", name),
                field: Some(name),
            });
        }

        let chunking = chunking.clone();
        let document = tokio::task::spawn_blocking(move || prepare_document(&name, &bytes, &chunking))
            .await
            .map_err(|e| AppError::Internal {
                message: format!("Document processing task failed: {}", e),
            })??;

        prepared.push(document);
    }

    if prepared.is_empty() {
        return Err(AppError::Validation {
            message: "Upload contained no files".to_string(),
            field: Some("files".to_string()),
        });
    }

    let uploaded: Vec<String> = prepared.iter().map(|d| d.name.clone()).collect();

    let mut session = handle.lock().await;
    let updated = state.pipeline.index_documents(&session, prepared).await?;
    *session = updated;

    tracing::info!(
        session_id = %session_id,
        uploaded = uploaded.len(),
        documents = session.documents.len(),
        chunks = session.chunks.len(),
        "Documents indexed"
    );

    Ok(Json(UploadResponse {
        session_id,
        uploaded,
        documents: session.documents.clone(),
        chunk_count: session.chunks.len(),
    }))
}
