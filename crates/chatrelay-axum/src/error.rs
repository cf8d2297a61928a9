//! Axum-specific error types and mappings.
//!
//! Maps relay, hub and request-parsing failures to HTTP status codes and a
//! JSON body: `{"error": "...", "status": 400}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatrelay_core::{ChannelIdError, SupervisorError};
use serde::Serialize;
use thiserror::Error;

use crate::pubsub::HubError;

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Bad request (invalid input).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The relay cannot take the request right now.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<ChannelIdError> for HttpError {
    fn from(err: ChannelIdError) -> Self {
        Self::BadRequest(format!("invalid channel id: {err}"))
    }
}

impl From<SupervisorError> for HttpError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::ShuttingDown => Self::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<HubError> for HttpError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Closed | HubError::CapacityExceeded { .. } => {
                Self::ServiceUnavailable(err.to_string())
            }
        }
    }
}
