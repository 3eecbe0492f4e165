use anyhow::{Context, Result};
use std::{env, net::SocketAddr, time::Duration};

/// The default bound on a single role lookup.
pub const DEFAULT_ROLE_TIMEOUT_MS: u64 = 8000;

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The duration of a session in days.
    pub session_duration_days: i64,
    /// How long a role lookup may take before it resolves as a timeout.
    pub role_timeout: Duration,
    /// Identifies this portal instance's persisted session slot.
    pub client_id: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Sender address for notification mail.
    pub mail_from: Option<String>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            session_duration_days: env::var("SESSION_DURATION_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("Invalid SESSION_DURATION_DAYS")?,
            role_timeout: Duration::from_millis(
                env::var("ROLE_TIMEOUT_MS")
                    .unwrap_or_else(|_| DEFAULT_ROLE_TIMEOUT_MS.to_string())
                    .parse()
                    .context("Invalid ROLE_TIMEOUT_MS")?,
            ),
            client_id: env::var("PORTAL_CLIENT_ID").unwrap_or_else(|_| "default".to_string()),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            mail_from: env::var("MAIL_FROM").ok().filter(|v| !v.trim().is_empty()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            session_duration_days: 7,
            role_timeout: Duration::from_millis(DEFAULT_ROLE_TIMEOUT_MS),
            client_id: "default".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            mail_from: None,
        }
    }
}
