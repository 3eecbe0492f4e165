use crate::{
    auth::{AuthController, AuthState},
    guards::NOT_AUTHORIZED_PATH,
};

/// Where the portal root sends a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    Loading,
    Redirect(&'static str),
}

impl Landing {
    /// Decides the destination for an authenticated user.
    pub fn evaluate(state: &AuthState) -> Self {
        if state.session_loading || state.role_loading {
            return Landing::Loading;
        }
        match state.role {
            Some(role) => Landing::Redirect(role.home_path()),
            None => Landing::Redirect(NOT_AUTHORIZED_PATH),
        }
    }

    /// Waits until the destination is known.
    pub async fn settle(controller: &AuthController) -> Self {
        match controller
            .wait_for(|s| Landing::evaluate(s) != Landing::Loading)
            .await
        {
            Some(state) => Landing::evaluate(&state),
            None => Landing::Redirect(NOT_AUTHORIZED_PATH),
        }
    }
}
