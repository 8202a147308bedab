//! Error types for the facilitator service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use sol402::facilitator::FacilitatorError;

/// Errors surfaced by the HTTP handlers.
///
/// Protocol failures travel inside verify/settle response bodies; this
/// type only covers service-level problems, which map to HTTP 5xx.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The underlying engine failed outside the protocol contract.
    #[error("facilitator error: {0}")]
    Facilitator(#[from] FacilitatorError),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}
