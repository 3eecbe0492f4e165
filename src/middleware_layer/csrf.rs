use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, services::csrf::CSRF_HEADER, state::AppState};

/// Rejects state-changing requests that do not carry the portal's current
/// CSRF token in the `x-csrf-token` header.
pub async fn verify_csrf(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() == Method::GET
        || req.method() == Method::HEAD
        || req.method() == Method::OPTIONS
    {
        tracing::debug!("✅ CSRF exemption: {} request", req.method());
        return next.run(req).await;
    }

    let token = match req.headers().get(CSRF_HEADER) {
        Some(value) => match value.to_str() {
            Ok(token) => token,
            Err(_) => {
                tracing::warn!("❌ CSRF: invalid header format");
                return AppError::Unauthorized.into_response();
            }
        },
        None => {
            tracing::warn!("❌ CSRF: header {} missing on {}", CSRF_HEADER, req.uri());
            return AppError::Unauthorized.into_response();
        }
    };

    if !state.csrf.verify(token) {
        tracing::warn!("❌ CSRF: token mismatch on {}", req.uri());
        return AppError::Unauthorized.into_response();
    }

    tracing::debug!("✅ CSRF token valid");
    next.run(req).await
}
