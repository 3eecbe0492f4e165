//! Entry points of the portal. Layout is left to the client; each view
//! answers with the data it needs.

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde::Serialize;

use crate::{
    auth::AuthStatus,
    guards::{Landing, NOT_AUTHORIZED_PATH},
    models::{role::Role, session::Session},
    state::AppState,
};

/// A signed-in home view.
#[derive(Serialize)]
pub struct HomeView {
    pub view: &'static str,
    pub user_id: uuid::Uuid,
    pub email: Option<String>,
    pub role: Role,
}

/// What the sign-in view shows.
#[derive(Serialize)]
pub struct SignInView {
    pub view: &'static str,
    pub login: &'static str,
    pub register: &'static str,
    pub status: AuthStatus,
}

/// What the not-authorized view shows.
#[derive(Serialize)]
pub struct NotAuthorizedView {
    pub view: &'static str,
    pub message: &'static str,
    pub role: Option<Role>,
    pub role_error: Option<String>,
    pub sign_out: &'static str,
}

/// `/`: sends a signed-in user to the home of their role.
pub async fn landing(State(state): State<AppState>) -> Redirect {
    match Landing::settle(&state.auth).await {
        Landing::Redirect(path) => {
            tracing::debug!("landing on {}", path);
            Redirect::to(path)
        }
        Landing::Loading => Redirect::to(NOT_AUTHORIZED_PATH),
    }
}

/// `/login`: signed-in users go straight to the landing redirect.
pub async fn login_page(State(state): State<AppState>) -> Response {
    let snapshot = match state.auth.wait_for(|s| !s.session_loading).await {
        Some(snapshot) => snapshot,
        None => state.auth.snapshot(),
    };
    if snapshot.session.is_some() {
        return Redirect::to("/").into_response();
    }
    Json(SignInView {
        view: "sign-in",
        login: "/api/auth/login",
        register: "/api/auth/register",
        status: snapshot.status(),
    })
    .into_response()
}

/// `/not-authorized`: shows the role the user has, with a way to sign out.
pub async fn not_authorized(State(state): State<AppState>) -> Json<NotAuthorizedView> {
    let snapshot = state.auth.snapshot();
    Json(NotAuthorizedView {
        view: "not-authorized",
        message: "You are not authorized to view this page.",
        role: snapshot.role,
        role_error: snapshot.role_error.map(|e| e.to_string()),
        sign_out: "/api/auth/logout",
    })
}

fn home(view: &'static str, session: Session, role: Role) -> Json<HomeView> {
    Json(HomeView {
        view,
        user_id: session.user_id(),
        email: session.user.email,
        role,
    })
}

pub async fn admin_home(
    Extension(session): Extension<Session>,
    Extension(role): Extension<Role>,
) -> Json<HomeView> {
    home("admin", session, role)
}

pub async fn member_home(
    Extension(session): Extension<Session>,
    Extension(role): Extension<Role>,
) -> Json<HomeView> {
    home("member", session, role)
}
