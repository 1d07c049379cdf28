//! Inbound mail triage
//!
//! The mail poller posts every unread message here and gets back either a
//! reply to send or the reason to leave it unanswered. Transport stays with
//! the poller.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_request;
use crate::AppState;
use policyreply_common::{
    config::MailConfig,
    errors::Result,
    metrics,
};

/// Subject used when the inbound message has none
pub const NO_SUBJECT: &str = "(no subject)";

#[derive(Debug, Deserialize, Validate)]
pub struct InboundMessage {
    #[validate(length(min = 3, max = 320))]
    pub sender: String,

    #[serde(default)]
    pub subject: Option<String>,

    #[validate(length(max = 20000))]
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AutomatedSender,
    EmptyBody,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AutomatedSender => "skipped_sender",
            SkipReason::EmptyBody => "skipped_body",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InboundDecision {
    Reply {
        to: String,
        subject: String,
        body: String,
    },
    Skip {
        reason: SkipReason,
    },
}

/// Sender looks like an automated or bounce address
pub fn is_no_reply(sender: &str, blocked_keywords: &[String]) -> bool {
    let sender = sender.to_lowercase();
    blocked_keywords
        .iter()
        .any(|keyword| sender.contains(&keyword.to_lowercase()))
}

pub fn reply_subject(subject: Option<&str>) -> String {
    let subject = subject.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(NO_SUBJECT);
    format!("Re: {}", subject)
}

/// Reason to leave `message` unanswered, if any
pub fn triage(message: &InboundMessage, mail: &MailConfig) -> Option<SkipReason> {
    if is_no_reply(&message.sender, &mail.blocked_sender_keywords) {
        return Some(SkipReason::AutomatedSender);
    }
    if message.body.trim().chars().count() < mail.min_body_chars {
        return Some(SkipReason::EmptyBody);
    }
    None
}

/// Decide on and draft the reply to one inbound message
pub async fn inbound(
    State(state): State<AppState>,
    payload: std::result::Result<Json<InboundMessage>, JsonRejection>,
) -> Result<Json<InboundDecision>> {
    let Json(message) = payload?;
    validate_request(&message)?;

    if let Some(reason) = triage(&message, &state.config.mail) {
        tracing::info!(sender = %message.sender, ?reason, "Skipping inbound message");
        metrics::record_inbound(reason.as_str());
        return Ok(Json(InboundDecision::Skip { reason }));
    }

    let body = match state.pipeline.answer_question(message.body.trim()).await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(sender = %message.sender, error = %e, "Failed to answer inbound message");
            metrics::record_inbound("error");
            return Err(e);
        }
    };

    tracing::info!(sender = %message.sender, "Drafted reply");
    metrics::record_inbound("replied");

    Ok(Json(InboundDecision::Reply {
        to: message.sender.clone(),
        subject: reply_subject(message.subject.as_deref()),
        body,
    }))
}
