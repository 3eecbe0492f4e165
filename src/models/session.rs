use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identity carried by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// The ID of the authenticated user.
    pub id: Uuid,
    /// The user's email address, if the identity service knows one.
    pub email: Option<String>,
}

/// Represents an authenticated session issued by the data service.
///
/// Only the auth controller holds the current session; everything else
/// reads it through a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The session identifier.
    pub id: Uuid,
    /// The user this session belongs to.
    pub user: SessionUser,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Returns the ID of the session's user.
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    /// Whether the session has passed its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// What kind of auth-state transition produced a [`SessionChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A notification that the authentication state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub event: AuthChangeEvent,
    /// The session after the change; `None` once signed out.
    pub session: Option<Session>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strict() {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user: SessionUser { id: Uuid::new_v4(), email: None },
            created_at: now,
            expires_at: now,
        };
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + chrono::Duration::seconds(1)));
    }
}
