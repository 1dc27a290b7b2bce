use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Top-level application error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Database errors ──────────────────────────────────────────────────────
    #[error("Database query failed: {message}")]
    DatabaseQueryFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Record not found: {entity_type} with id '{id}'")]
    RecordNotFound { entity_type: String, id: String },

    // ── Inference service errors ─────────────────────────────────────────────
    #[error("Inference service unavailable at {host}")]
    InferenceUnavailable { host: String },

    /// Non-2xx reply from `/generate` or `/train_lut`. The message is the
    /// server's `error`/`detail` field or a generic "<op> failed with <status>".
    #[error("{message}")]
    InferenceFailed { status: u16, message: String },

    #[error("{operation} request failed: {message}")]
    InferenceTransport { operation: String, message: String },

    #[error("Malformed response from {operation}: {message}")]
    MalformedResponse { operation: String, message: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("'{email}' is not a valid email address")]
    InvalidEmail { email: String },

    #[error("LUT block {block} already exists")]
    DuplicateBlock { block: i32 },

    #[error("LUT block {block} does not exist")]
    UnknownBlock { block: i32 },

    // ── LUT / session errors ─────────────────────────────────────────────────
    #[error("LUT '{lut_name}' is a pre-trained demo. Create or load another LUT to change it.")]
    ReadOnlyLut { lut_name: String },

    #[error("A {action} request is already in progress for '{scope}'")]
    Busy { scope: String, action: &'static str },

    #[error("Session '{id}' not found")]
    SessionNotFound { id: String },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn db_query(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::DatabaseQueryFailed { message: message.into(), source }
    }

    pub fn empty_field(field_name: &str) -> Self {
        AppError::EmptyField { field_name: field_name.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::SessionNotFound { .. } | AppError::RecordNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptyField { .. }
                | AppError::FieldTooLong { .. }
                | AppError::InvalidEmail { .. }
                | AppError::DuplicateBlock { .. }
                | AppError::UnknownBlock { .. }
        )
    }

    pub fn is_inference_unavailable(&self) -> bool {
        matches!(self, AppError::InferenceUnavailable { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else if self.is_inference_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            match self {
                AppError::ReadOnlyLut { .. } => StatusCode::FORBIDDEN,
                AppError::Busy { .. } => StatusCode::CONFLICT,
                AppError::InferenceFailed { .. }
                | AppError::InferenceTransport { .. }
                | AppError::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_failure_displays_server_message_verbatim() {
        let err = AppError::InferenceFailed { status: 500, message: "CUDA out of memory".into() };
        assert_eq!(err.to_string(), "CUDA out of memory");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::empty_field("message").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::SessionNotFound { id: "x".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::ReadOnlyLut { lut_name: "demo-f0d18034".into() }.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Busy { scope: "s".into(), action: "generate" }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::InferenceUnavailable { host: "http://h".into() }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
