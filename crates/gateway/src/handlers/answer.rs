//! Question answering handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

use super::{require_text, validate_request};
use crate::AppState;
use policyreply_common::{
    context::{format_reply, PolicyAnswer},
    errors::Result,
    metrics::RequestMetrics,
};

/// Answer request
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerRequest {
    #[validate(length(min = 1, max = 4000))]
    pub question: String,
}

/// Structured answer plus the reply text the mail layer sends verbatim
#[derive(Serialize)]
pub struct AnswerResponse {
    pub request_id: Uuid,
    #[serde(flatten)]
    pub answer: PolicyAnswer,
    pub message: String,
    pub processing_time_ms: u64,
}

/// Answer one policy question
pub async fn answer(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>> {
    let Json(request) = payload?;
    let start = Instant::now();
    let request_metrics = RequestMetrics::start("POST", "/v1/answer");

    validate_request(&request)?;
    require_text(&request.question, "question")?;

    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, question_chars = request.question.len(), "Answer request");

    let answer = match state.pipeline.answer(request.question.trim()).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::error!(%request_id, error = %e, "Answer pipeline failed");
            request_metrics.finish(e.status_code().as_u16());
            return Err(e);
        }
    };
    let message = format_reply(state.pipeline.disclaimer(), &answer);
    request_metrics.finish(200);

    Ok(Json(AnswerResponse {
        request_id,
        answer,
        message,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
