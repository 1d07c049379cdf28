//! Entailment and decomposition endpoints
//!
//! Sibling collaborators of the answer pipeline, exposed for evaluation runs.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{require_text, validate_request};
use crate::AppState;
use policyreply_common::{context::Entailment, errors::Result};

#[derive(Debug, Deserialize, Validate)]
pub struct DecomposeRequest {
    #[validate(length(min = 1, max = 4000))]
    pub question: String,
}

#[derive(Serialize)]
pub struct DecomposeResponse {
    pub question: String,
    pub sub_questions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EntailmentRequest {
    #[validate(length(min = 1, max = 4000))]
    pub question: String,

    #[validate(length(min = 1, max = 20000))]
    pub text: String,
}

/// Split a compound question into atomic ones
pub async fn decompose(
    State(state): State<AppState>,
    payload: std::result::Result<Json<DecomposeRequest>, JsonRejection>,
) -> Result<Json<DecomposeResponse>> {
    let Json(request) = payload?;
    validate_request(&request)?;
    require_text(&request.question, "question")?;

    let sub_questions = state.decomposer.decompose(request.question.trim()).await?;

    Ok(Json(DecomposeResponse {
        question: request.question,
        sub_questions,
    }))
}

/// Score whether `text` supports `question`
pub async fn entailment(
    State(state): State<AppState>,
    payload: std::result::Result<Json<EntailmentRequest>, JsonRejection>,
) -> Result<Json<Entailment>> {
    let Json(request) = payload?;
    validate_request(&request)?;
    require_text(&request.question, "question")?;
    require_text(&request.text, "text")?;

    let result = state.entailment.score(&request.question, &request.text).await?;
    tracing::debug!(label = ?result.label, confidence = result.confidence, "Entailment scored");

    Ok(Json(result))
}
