use chrono::Utc;
use redis::{aio::ConnectionManager, AsyncCommands};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        session::{Session, SessionUser},
        user::User,
    },
};

/// Sessions persisted in Redis, plus a per-portal pointer to the current one
/// so a restarted portal can restore it.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: ConnectionManager,
    pointer_key: String,
    duration_days: i64,
}

fn session_key(session_id: &Uuid) -> String {
    format!("session:{}", session_id)
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager, client_id: &str, duration_days: i64) -> Self {
        Self {
            redis,
            pointer_key: format!("portal:{}:session", client_id),
            duration_days,
        }
    }

    /// Issues a session for `user` and makes it this portal's current one.
    pub async fn issue(&self, user: &User) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user: SessionUser {
                id: user.id,
                email: Some(user.email.clone()),
            },
            created_at: now,
            expires_at: now + chrono::Duration::days(self.duration_days),
        };

        let session_json = sonic_rs::to_string(&session)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;
        let expiration_seconds: u64 = (self.duration_days * 86400) as u64;

        let mut redis = self.redis.clone();
        let _: () = redis
            .set_ex(session_key(&session.id), &session_json, expiration_seconds)
            .await
            .map_err(|e| {
                tracing::error!("❌ Redis set_ex failed: {}", e);
                AppError::Redis(e)
            })?;
        let _: () = redis
            .set_ex(&self.pointer_key, session.id.to_string(), expiration_seconds)
            .await?;

        tracing::info!("✅ Session saved to Redis: session:{}", session.id);
        Ok(session)
    }

    /// The current session, if one is stored and not expired.
    pub async fn current(&self) -> Result<Option<Session>> {
        let mut redis = self.redis.clone();
        let pointer: Option<String> = redis.get(&self.pointer_key).await?;
        let Some(session_id) = pointer.and_then(|p| Uuid::parse_str(&p).ok()) else {
            return Ok(None);
        };

        let session_json: Option<String> = redis.get(session_key(&session_id)).await?;
        let Some(session_json) = session_json else {
            tracing::debug!("session pointer is dangling, clearing");
            let _: () = redis.del(&self.pointer_key).await?;
            return Ok(None);
        };

        let session: Session = match sonic_rs::from_str(&session_json) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("❌ Invalid session JSON: {}", e);
                self.clear().await?;
                return Ok(None);
            }
        };

        if session.is_expired(Utc::now()) {
            tracing::warn!("❌ Session expired for user: {}", session.user.id);
            self.clear().await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Deletes the current session and the pointer to it.
    pub async fn clear(&self) -> Result<()> {
        let mut redis = self.redis.clone();
        let pointer: Option<String> = redis.get(&self.pointer_key).await?;
        if let Some(session_id) = pointer.and_then(|p| Uuid::parse_str(&p).ok()) {
            let _: () = redis.del(session_key(&session_id)).await?;
            tracing::info!("✅ Session deleted from Redis");
        }
        let _: () = redis.del(&self.pointer_key).await?;
        Ok(())
    }
}
