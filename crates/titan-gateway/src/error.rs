//! Gateway-local error detail, converging into `titan_primitives::ErrorKind`
//! at the HTTP and websocket boundary so clients see the same closed
//! taxonomy cells and storage report internally.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use titan_primitives::{ErrorKind, TitanError};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Titan(#[from] TitanError),
    #[error("missing or malformed Authorization header")]
    MissingSession,
    #[error("unknown auth provider: {0}")]
    UnknownProvider(String),
    #[error("malformed request body: {0}")]
    BadRequest(String),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Titan(e) => status_for_kind(e.kind()),
            GatewayError::MissingSession => StatusCode::UNAUTHORIZED,
            GatewayError::UnknownProvider(_) => StatusCode::BAD_REQUEST,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({ "error": self.to_string() });
        if let GatewayError::Titan(e) = &self {
            if let Some(retry_after) = e.retry_after {
                body["retryAfterSeconds"] = json!(retry_after.as_secs());
            }
        }
        (status, Json(body)).into_response()
    }
}
