//! Question answering handler

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::AppState;
use askdocs_common::{
    context::{AnswerResult, ModeFlags},
    errors::{AppError, Result},
    pipeline::AskRequest,
};

/// Ask request
#[derive(Debug, Deserialize, Validate)]
pub struct AskBody {
    #[validate(length(min = 1, max = 4000), custom(function = "not_blank"))]
    pub question: String,

    #[serde(default)]
    pub web_search: bool,

    #[serde(default)]
    pub hybrid: bool,
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Ask response
#[derive(Serialize)]
pub struct AskResponse {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub answer: AnswerResult,
    pub processing_time_ms: u64,
}

/// Answer one question within a session
pub async fn ask(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<AskBody>,
) -> Result<Json<AskResponse>> {
    let start = Instant::now();

    body.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    let handle = state.sessions.get(session_id).await?;
    let request = AskRequest::new(
        body.question.trim(),
        ModeFlags {
            web_search: body.web_search,
            hybrid: body.hybrid,
        },
    );

    // Stored session is replaced only once the answer is complete
    let mut session = handle.lock().await;
    let (updated, answer) = state.pipeline.ask(session.clone(), &request).await;
    *session = updated;

    Ok(Json(AskResponse {
        session_id,
        answer,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_validation() {
        let valid = AskBody { question: "What is in chapter 2?".to_string(), web_search: false, hybrid: false };
        assert!(valid.validate().is_ok());

        let blank = AskBody { question: "   ".to_string(), web_search: false, hybrid: false };
        assert!(blank.validate().is_err());

        let empty = AskBody { question: String::new(), web_search: true, hybrid: false };
        assert!(empty.validate().is_err());

        let long = AskBody { question: "a".repeat(4001), web_search: false, hybrid: true };
        assert!(long.validate().is_err());
    }
}
