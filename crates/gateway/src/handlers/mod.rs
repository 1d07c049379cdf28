//! API handlers module

pub mod answer;
pub mod diagnostics;
pub mod health;
pub mod inbound;

use policyreply_common::errors::AppError;
use validator::Validate;

/// Run derive-based validation and reject blank required text.
pub(crate) fn validate_request<T: Validate>(request: &T) -> Result<(), AppError> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: e.field_errors().keys().next().map(|k| k.to_string()),
    })
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation {
            message: format!("{} must not be blank", field),
            field: Some(field.to_string()),
        });
    }
    Ok(())
}
