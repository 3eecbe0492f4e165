use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use garde::Validate;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::AuthStatus,
    error::Result,
    models::{role::Role, user::Credentials},
    state::AppState,
};

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub user_id: Option<Uuid>,
    /// Fresh CSRF token, issued whenever the session changes.
    pub csrf_token: Option<String>,
}

/// The response payload of a CSRF token request.
#[derive(Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

/// The response payload of a role refresh.
#[derive(Serialize)]
pub struct RoleResponse {
    pub role: Option<Role>,
    pub role_error: Option<String>,
}

/// Handles account registration. The new account is signed in right away.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt: {:?}", payload);
    payload.validate()?;

    let session = state.auth.sign_up(&payload).await?;
    tracing::info!("✅ User registered: {}", session.user_id());

    let response = AuthResponse {
        success: true,
        message: "Registration successful. Welcome!".to_string(),
        user_id: Some(session.user_id()),
        csrf_token: Some(state.csrf.rotate()),
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Handles sign-in with email and password.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt: {:?}", payload);
    payload.validate()?;

    let session = state.auth.sign_in(&payload).await?;
    tracing::info!("✅ Login successful for user: {}", session.user_id());

    let response = AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user_id: Some(session.user_id()),
        csrf_token: Some(state.csrf.rotate()),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles sign-out. Signing out without a session succeeds as well.
pub async fn logout(State(state): State<AppState>) -> Result<Response> {
    state.auth.sign_out().await?;
    tracing::info!("✅ Logout successful");

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
        user_id: None,
        csrf_token: Some(state.csrf.rotate()),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Hands out the current CSRF token.
pub async fn csrf(State(state): State<AppState>) -> Json<CsrfResponse> {
    Json(CsrfResponse {
        csrf_token: state.csrf.current(),
    })
}

/// Reports the current auth state without waiting for it to settle.
pub async fn status(State(state): State<AppState>) -> Json<AuthStatus> {
    Json(state.auth.snapshot().status())
}

/// Re-resolves the signed-in user's role.
pub async fn refresh_role(State(state): State<AppState>) -> Json<RoleResponse> {
    let role = state.auth.refresh_role().await;
    let snapshot = state.auth.snapshot();
    tracing::debug!(?role, "role refreshed on request");
    Json(RoleResponse {
        role,
        role_error: snapshot.role_error.map(|e| e.to_string()),
    })
}
