use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::{
    auth::AuthController,
    chat::ChatService,
    config::Config,
    error::Result,
    remote::{postgres::PgDataService, ChatStore, Notifier, RemoteDataService},
    services::{csrf::CsrfToken, notify::LogMailer},
};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The portal's auth state, shared by every request.
    pub auth: AuthController,
    /// Chat operations for the admin and member views.
    pub chat: ChatService,
    /// The token state-changing requests must echo back.
    pub csrf: CsrfToken,
}

impl AppState {
    /// Connects to PostgreSQL and Redis and mounts the auth controller.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized");

        if config.mail_from.is_none() {
            tracing::warn!("MAIL_FROM is not set, notifications will fail");
        }

        let backend = Arc::new(PgDataService::new(db, redis, config, Arc::new(LogMailer)));
        Ok(Self::from_parts(
            config.clone(),
            backend.clone(),
            backend.clone(),
            backend,
        ))
    }

    /// Builds the state over arbitrary backends.
    pub fn from_parts(
        config: Config,
        remote: Arc<dyn RemoteDataService>,
        store: Arc<dyn ChatStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let auth = AuthController::mount_with_timeout(remote, config.role_timeout);
        tracing::info!(timeout_ms = config.role_timeout.as_millis() as u64, "✅ Auth controller mounted");
        Self {
            config,
            auth,
            chat: ChatService::new(store, notifier),
            csrf: CsrfToken::new(),
        }
    }
}
