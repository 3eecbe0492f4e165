use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    error::AppError,
    guards::{RoleGate, RoleGateState, SessionGate, NOT_AUTHORIZED_PATH, SIGN_IN_PATH},
    models::{role::Role, session::Session},
    state::AppState,
};

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const MEMBER_ONLY: &[Role] = &[Role::Member];
const CHAT_ROLES: &[Role] = &[Role::Admin, Role::Member];

/// Why a gate turned a request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Denial {
    SignIn,
    NotAuthorized,
}

/// How a denial is rendered: pages redirect, API routes answer with an error.
#[derive(Debug, Clone, Copy)]
enum Surface {
    Page,
    Api,
}

impl Denial {
    fn respond(self, surface: Surface) -> Response {
        match (surface, self) {
            (Surface::Page, Denial::SignIn) => Redirect::to(SIGN_IN_PATH).into_response(),
            (Surface::Page, Denial::NotAuthorized) => {
                Redirect::to(NOT_AUTHORIZED_PATH).into_response()
            }
            (Surface::Api, Denial::SignIn) => {
                AppError::Authentication("Not signed in".to_string()).into_response()
            }
            (Surface::Api, Denial::NotAuthorized) => AppError::Unauthorized.into_response(),
        }
    }
}

/// Waits for the session gate to settle and returns the session.
async fn settle_session(state: &AppState) -> Result<Session, Denial> {
    match SessionGate::settle(&state.auth).await {
        SessionGate::Authenticated => state.auth.snapshot().session.ok_or(Denial::SignIn),
        SessionGate::Loading | SessionGate::Unauthenticated => {
            tracing::debug!("❌ No session, sending to sign-in");
            Err(Denial::SignIn)
        }
    }
}

/// Runs a fresh role gate (one per request) against `allowed`.
async fn settle_role(state: &AppState, allowed: &'static [Role]) -> Result<Role, Denial> {
    let mut gate = RoleGate::new(allowed);
    match gate.settle(&state.auth).await {
        RoleGateState::Granted(role) => Ok(role),
        other => {
            tracing::warn!(
                state = ?other,
                retried = gate.retry_attempted(),
                "❌ Role not allowed"
            );
            Err(Denial::NotAuthorized)
        }
    }
}

async fn gate(
    state: &AppState,
    allowed: Option<&'static [Role]>,
    surface: Surface,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let session = match settle_session(state).await {
        Ok(session) => session,
        Err(denial) => return denial.respond(surface),
    };

    if let Some(allowed) = allowed {
        match settle_role(state, allowed).await {
            Ok(role) => {
                request.extensions_mut().insert(role);
            }
            Err(denial) => return denial.respond(surface),
        }
    }

    tracing::debug!("✅ User authenticated: {}", session.user_id());
    request.extensions_mut().insert(session);
    next.run(request).await
}

/// Lets the request through once a session exists; otherwise redirects to
/// the sign-in page.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    gate(&state, None, Surface::Page, request, next).await
}

pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    gate(&state, Some(ADMIN_ONLY), Surface::Page, request, next).await
}

pub async fn require_member(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    gate(&state, Some(MEMBER_ONLY), Surface::Page, request, next).await
}

/// API variant for the conversation routes, open to admins and members.
pub async fn require_chat_role(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    gate(&state, Some(CHAT_ROLES), Surface::Api, request, next).await
}

/// API variant that only needs a session.
pub async fn require_api_session(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    gate(&state, None, Surface::Api, request, next).await
}
