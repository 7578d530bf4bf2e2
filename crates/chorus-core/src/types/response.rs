//! Uniform response envelopes shared by REST handlers and socket acks.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Successful response body: `{"success": true, "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Failure body: `{"success": false, "message": ..., "code": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable error code (the [`crate::ErrorKind`] display form).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiErrorResponse {
    pub fn new(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code,
        }
    }

    /// Build the client-facing envelope for an error. Infrastructure and
    /// internal failures are reported with a generic message.
    pub fn from_error(err: &AppError) -> Self {
        let message = match err.kind {
            crate::ErrorKind::Internal | crate::ErrorKind::Serialization => {
                "An internal error occurred".to_string()
            }
            kind if kind.is_infrastructure() => "Service temporarily unavailable".to_string(),
            _ => err.message.clone(),
        };
        Self::new(message, Some(err.kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let body = ApiErrorResponse::from_error(&AppError::not_found("Room not found"));
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Room not found");
        assert_eq!(json["code"], "NOT_FOUND");
    }

    #[test]
    fn test_infrastructure_message_is_generic() {
        let body = ApiErrorResponse::from_error(&AppError::cache("redis timeout at 10.0.0.3"));
        assert_eq!(body.message, "Service temporarily unavailable");
        assert_eq!(body.code.as_deref(), Some("CACHE"));
    }
}
