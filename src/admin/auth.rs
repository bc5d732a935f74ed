use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::http::server::AppState;
use crate::http::ApiError;

/// Require `Authorization: Bearer <admin.api_key>`. An empty key locks the
/// admin routes entirely.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if state.admin_api_key.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == &*state.admin_api_key);

    if authorized {
        return Ok(next.run(request).await);
    }
    tracing::warn!(path = %request.uri().path(), "Rejected admin request");
    Err(ApiError::Unauthorized)
}
