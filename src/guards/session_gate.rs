use crate::auth::{AuthController, AuthState};

/// Gate on "is there a session". A pure function of the controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionGate {
    Loading,
    Authenticated,
    Unauthenticated,
}

impl SessionGate {
    pub fn evaluate(state: &AuthState) -> Self {
        if state.session_loading {
            SessionGate::Loading
        } else if state.session.is_some() {
            SessionGate::Authenticated
        } else {
            SessionGate::Unauthenticated
        }
    }

    /// Waits out `Loading` and returns the settled outcome.
    pub async fn settle(controller: &AuthController) -> Self {
        match controller.wait_for(|s| !s.session_loading).await {
            Some(state) => Self::evaluate(&state),
            None => SessionGate::Unauthenticated,
        }
    }
}
