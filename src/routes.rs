use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::{
    handlers,
    middleware_layer::{csrf, gates},
    state::AppState,
};

/// Builds the portal's router. Each group sits behind the gate its views
/// need; the public group needs none. State-changing routes outside the
/// sign-in forms also check the CSRF token, ahead of the gate.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/login", get(handlers::pages::login_page))
        .route("/not-authorized", get(handlers::pages::not_authorized))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/status", get(handlers::auth::status))
        .route("/api/auth/csrf", get(handlers::auth::csrf))
        .with_state(state.clone());

    let logout_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route_layer(from_fn_with_state(state.clone(), csrf::verify_csrf))
        .with_state(state.clone());

    let session_routes = Router::new()
        .route("/", get(handlers::pages::landing))
        .route_layer(from_fn_with_state(state.clone(), gates::require_session))
        .with_state(state.clone());

    let session_api_routes = Router::new()
        .route("/api/auth/refresh-role", post(handlers::auth::refresh_role))
        .route_layer(from_fn_with_state(state.clone(), gates::require_api_session))
        .route_layer(from_fn_with_state(state.clone(), csrf::verify_csrf))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin", get(handlers::pages::admin_home))
        .route("/admin/correspondents", get(handlers::chat::correspondents))
        .route(
            "/admin/correspondents/{profile_id}/conversation",
            post(handlers::chat::open_conversation),
        )
        .route("/admin/broadcasts", post(handlers::chat::create_broadcast))
        .route_layer(from_fn_with_state(state.clone(), gates::require_admin))
        .route_layer(from_fn_with_state(state.clone(), csrf::verify_csrf))
        .with_state(state.clone());

    let member_routes = Router::new()
        .route("/member", get(handlers::pages::member_home))
        .route("/member/inbox", get(handlers::chat::inbox))
        .route_layer(from_fn_with_state(state.clone(), gates::require_member))
        .with_state(state.clone());

    let conversation_routes = Router::new()
        .route(
            "/api/conversations/{conversation_id}/messages",
            get(handlers::chat::list_messages).post(handlers::chat::send_message),
        )
        .route(
            "/api/conversations/{conversation_id}/read",
            post(handlers::chat::mark_read),
        )
        .route_layer(from_fn_with_state(state.clone(), gates::require_chat_role))
        .route_layer(from_fn_with_state(state.clone(), csrf::verify_csrf))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(logout_routes)
        .merge(session_routes)
        .merge(session_api_routes)
        .merge(admin_routes)
        .merge(member_routes)
        .merge(conversation_routes)
}
