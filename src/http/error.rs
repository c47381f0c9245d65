use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use crate::engine::EngineError;

/// Error returned by every handler. Renders as `{"error": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    /// Malformed request: bad JSON, query string, or path segment.
    BadRequest(String),
    NotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Engine(e) => match e {
                EngineError::NotFound(_) | EngineError::NoAssignedStaff(_) => StatusCode::NOT_FOUND,
                EngineError::AlreadyExists(_) | EngineError::HasActiveBookings(_) => {
                    StatusCode::CONFLICT
                }
                // A commit that lost the race is reported like invalid input.
                EngineError::Conflict(_)
                | EngineError::ExternalConflict(_)
                | EngineError::InvalidTransition { .. }
                | EngineError::Validation(_)
                | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
                EngineError::WalError(_) | EngineError::Calendar(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Engine(e) => write!(f, "{e}"),
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => f.write_str(msg),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("request failed: {self}");
            "internal server error".to_string()
        } else {
            if let ApiError::Engine(e @ (EngineError::Conflict(_) | EngineError::ExternalConflict(_))) = &self {
                warn!("{e}");
            }
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
