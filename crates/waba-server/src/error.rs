//! Maps the core error taxonomy onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use waba_core::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

/// Newtype so `waba_core::Error` can implement `IntoResponse` without
/// `waba-core` itself depending on `axum`.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Error::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            Error::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            Error::ConversationConflict { .. } => (StatusCode::CONFLICT, self.0.to_string()),
            Error::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.0.to_string()),
            Error::MediaExpired(_) => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            Error::PolicyRejected(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string()),
            Error::Auth(_) => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            Error::Transient(_) => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            Error::Permanent(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string()),
            Error::MissingTable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string()),
            Error::Serialization(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            Error::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()),
        };

        (status, Json(ErrorResponse { error: message, status: status.as_u16() })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
