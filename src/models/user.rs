use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_postgres::Row;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Represents an account known to the identity service.
#[derive(Clone, Debug)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's email address.
    pub email: String,
    /// The user's hashed password.
    pub password: String,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
    /// Whether the user is active.
    pub is_active: bool,
}

/// The CRM profile row attached to a user. `role` is the raw stored value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub company_id: Option<Uuid>,
}

impl From<&Row> for Profile {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            role: row.get("role"),
            company_id: row.get("company_id"),
        }
    }
}

/// Email/password credentials for sign-in and sign-up.
#[derive(Clone, Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 8, max = 128))]
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials::new("anna@example.com", "hunter2hunter2");
        let printed = format!("{:?}", credentials);
        assert!(printed.contains("anna@example.com"));
        assert!(!printed.contains("hunter2"));
    }
}
