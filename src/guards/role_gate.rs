use crate::{
    auth::{AuthController, AuthState},
    models::role::Role,
};

/// Observable states of a [`RoleGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleGateState {
    Loading,
    /// No role yet and the single retry has not been spent.
    Retrying,
    Denied,
    /// Carries the role that matched the allowlist.
    Granted(Role),
}

/// Gate on "does the resolved role match an allowlist".
///
/// One instance corresponds to one mount of the guarded view. It retries a
/// missing role at most once over its lifetime; a new instance starts fresh.
#[derive(Debug)]
pub struct RoleGate {
    allowed: &'static [Role],
    retry_attempted: bool,
    retry_in_flight: bool,
}

impl RoleGate {
    pub fn new(allowed: &'static [Role]) -> Self {
        Self {
            allowed,
            retry_attempted: false,
            retry_in_flight: false,
        }
    }

    pub fn allowed(&self) -> &'static [Role] {
        self.allowed
    }

    pub fn retry_attempted(&self) -> bool {
        self.retry_attempted
    }

    pub fn evaluate(&self, state: &AuthState) -> RoleGateState {
        if state.role_loading || self.retry_in_flight {
            return RoleGateState::Loading;
        }
        match state.role {
            None if !self.retry_attempted => RoleGateState::Retrying,
            None => RoleGateState::Denied,
            Some(role) if self.allowed.contains(&role) => RoleGateState::Granted(role),
            Some(_) => RoleGateState::Denied,
        }
    }

    /// Drives the gate until it reaches `Granted` or `Denied`, spending the
    /// retry through [`AuthController::refresh_role`] if needed.
    pub async fn settle(&mut self, controller: &AuthController) -> RoleGateState {
        let mut changes = controller.subscribe();
        loop {
            let state = changes.borrow_and_update().clone();
            match self.evaluate(&state) {
                RoleGateState::Loading => {
                    if changes.changed().await.is_err() {
                        return RoleGateState::Denied;
                    }
                }
                RoleGateState::Retrying => {
                    tracing::debug!("no role resolved, retrying once");
                    self.retry_in_flight = true;
                    let role = controller.refresh_role().await;
                    self.retry_in_flight = false;
                    self.retry_attempted = true;
                    tracing::debug!(?role, "role retry finished");
                }
                settled => return settled,
            }
        }
    }
}
