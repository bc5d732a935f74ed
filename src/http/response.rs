//! Error responses.
//!
//! Every handler error becomes a JSON body `{"error": ..., "kind": ...}`
//! with the status picked from the error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{ErrorKind, SettlementError};

#[derive(Debug)]
pub enum ApiError {
    Settlement(SettlementError),
    NotFound(String),
    Unauthorized,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        ApiError::Settlement(e)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::TransientNetwork => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::FatalInvariant => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Settlement(e) => {
                let kind = e.kind();
                if kind == ErrorKind::FatalInvariant {
                    tracing::error!(error = %e, "Request hit an invariant failure");
                }
                (
                    status_for(kind),
                    ErrorBody {
                        error: e.to_string(),
                        kind: kind.as_str(),
                    },
                )
            }
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: format!("{what} not found"),
                    kind: "not_found",
                },
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "missing or invalid bearer token".to_string(),
                    kind: "unauthorized",
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
