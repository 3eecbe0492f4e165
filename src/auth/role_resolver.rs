use std::{sync::Arc, time::Duration};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::DEFAULT_ROLE_TIMEOUT_MS,
    models::role::{Role, UnknownRole},
    remote::RemoteDataService,
};

/// Why a role could not be resolved. Every variant leaves the user with no role.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoleError {
    /// There was no user identity to look up.
    #[error("missing id")]
    MissingId,
    /// The lookup did not settle within the timeout.
    #[error("timeout")]
    Timeout,
    /// The role store reported an error.
    #[error("{0}")]
    Lookup(String),
    /// The stored role is not one the portal knows.
    #[error("unrecognized role '{0}'")]
    Unrecognized(String),
}

impl From<UnknownRole> for RoleError {
    fn from(unknown: UnknownRole) -> Self {
        RoleError::Unrecognized(unknown.0)
    }
}

/// The outcome of one role resolution.
pub type RoleResolution = std::result::Result<Option<Role>, RoleError>;

/// Looks up a user's role with a bounded wait.
#[derive(Clone)]
pub struct RoleResolver {
    remote: Arc<dyn RemoteDataService>,
    timeout: Duration,
}

impl RoleResolver {
    /// Creates a resolver with the default timeout.
    pub fn new(remote: Arc<dyn RemoteDataService>) -> Self {
        Self::with_timeout(remote, Duration::from_millis(DEFAULT_ROLE_TIMEOUT_MS))
    }

    pub fn with_timeout(remote: Arc<dyn RemoteDataService>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves the role for `user_id`.
    ///
    /// The lookup races the timeout; if the timeout wins the lookup future is
    /// dropped and its result never observed. A lookup settling exactly at the
    /// deadline counts as timed out.
    pub async fn resolve(&self, user_id: Option<Uuid>) -> RoleResolution {
        let Some(user_id) = user_id else {
            return Err(RoleError::MissingId);
        };

        let lookup = tokio::select! {
            biased;
            _ = tokio::time::sleep(self.timeout) => None,
            result = self.remote.query_role(user_id) => Some(result),
        };

        match lookup {
            None => {
                tracing::warn!(%user_id, timeout_ms = self.timeout.as_millis() as u64, "role lookup timed out");
                Err(RoleError::Timeout)
            }
            Some(Err(e)) => {
                tracing::warn!(%user_id, "role lookup failed: {}", e);
                Err(RoleError::Lookup(e.to_string()))
            }
            Some(Ok(None)) => Ok(None),
            Some(Ok(Some(value))) => value.parse::<Role>().map(Some).map_err(RoleError::from),
        }
    }
}
