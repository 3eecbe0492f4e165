//! The data platform backed by PostgreSQL (rows) and Redis (sessions).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::{
        conversation::{Broadcast, BroadcastTarget, Conversation, Message},
        session::{AuthChangeEvent, Session, SessionChange},
        user::{Credentials, Profile},
    },
    remote::{
        ChatStore, Notifier, NotifyReport, NotifyRequest, RemoteDataService, SessionEvents,
        SessionSubscription,
    },
    repositories::{conversation as conversation_repo, profile as profile_repo},
    services::{
        auth as auth_service,
        notify::{self, Mailer},
        session_store::RedisSessionStore,
    },
};

/// Auth, rows and notification functions over one Postgres pool and Redis.
#[derive(Clone)]
pub struct PgDataService {
    db: Pool,
    sessions: RedisSessionStore,
    events: SessionEvents,
    mailer: Arc<dyn Mailer>,
    mail_from: Option<String>,
}

impl PgDataService {
    pub fn new(
        db: Pool,
        redis: ConnectionManager,
        config: &Config,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            db,
            sessions: RedisSessionStore::new(redis, &config.client_id, config.session_duration_days),
            events: SessionEvents::new(),
            mailer,
            mail_from: config.mail_from.clone(),
        }
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        self.events.emit(SessionChange { event, session });
    }
}

#[async_trait]
impl RemoteDataService for PgDataService {
    async fn get_session(&self) -> Result<Option<Session>> {
        self.sessions.current().await
    }

    fn on_session_change(&self) -> SessionSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session> {
        let user = auth_service::authenticate_user(&self.db, credentials).await?;
        let session = self.sessions.issue(&user).await?;
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        let user = auth_service::register_user(&self.db, credentials).await?;
        let session = self.sessions.issue(&user).await?;
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.sessions.clear().await?;
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    async fn query_role(&self, user_id: Uuid) -> Result<Option<String>> {
        profile_repo::find_role(&self.db, &user_id).await
    }
}

#[async_trait]
impl ChatStore for PgDataService {
    async fn conversations_for(&self, profile_id: Uuid) -> Result<Vec<Conversation>> {
        conversation_repo::list_for_member(&self.db, &profile_id).await
    }

    async fn counterpart(&self, conversation_id: Uuid, viewer: Uuid) -> Result<Option<Profile>> {
        conversation_repo::counterpart(&self.db, &conversation_id, &viewer).await
    }

    async fn profiles_except(&self, viewer: Uuid) -> Result<Vec<Profile>> {
        profile_repo::list_except(&self.db, &viewer).await
    }

    async fn find_profile(&self, profile_id: Uuid) -> Result<Option<Profile>> {
        profile_repo::find_by_id(&self.db, &profile_id).await
    }

    async fn is_member(&self, conversation_id: Uuid, profile_id: Uuid) -> Result<bool> {
        conversation_repo::is_member(&self.db, &conversation_id, &profile_id).await
    }

    async fn find_direct_conversation(&self, a: Uuid, b: Uuid) -> Result<Option<Uuid>> {
        conversation_repo::find_direct(&self.db, &a, &b).await
    }

    async fn create_direct_conversation(&self, owner: Uuid, other: &Profile) -> Result<Uuid> {
        conversation_repo::create_direct(&self.db, Uuid::new_v4(), &owner, &other.id, other.company_id)
            .await
    }

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        conversation_repo::list_messages(&self.db, &conversation_id).await
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        conversation_repo::insert_message(&self.db, Uuid::new_v4(), &conversation_id, &sender_id, content)
            .await
    }

    async fn last_read_at(
        &self,
        profile_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        conversation_repo::last_read_at(&self.db, &profile_id, &conversation_id).await
    }

    async fn latest_inbound_at(
        &self,
        viewer: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        conversation_repo::latest_inbound_at(&self.db, &viewer, &conversation_id).await
    }

    async fn mark_read(
        &self,
        profile_id: Uuid,
        conversation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        conversation_repo::upsert_read(&self.db, &profile_id, &conversation_id, at).await
    }

    async fn create_broadcast(
        &self,
        title: &str,
        body: &str,
        target: &BroadcastTarget,
    ) -> Result<Broadcast> {
        conversation_repo::create_broadcast(&self.db, Uuid::new_v4(), title, body, target).await
    }
}

#[async_trait]
impl Notifier for PgDataService {
    async fn invoke(&self, request: NotifyRequest) -> Result<NotifyReport> {
        tracing::debug!(function = request.function_name(), "invoking notification function");
        let report = match request {
            NotifyRequest::Message {
                conversation_id,
                sender_id,
            } => {
                notify::notify_message(
                    &self.db,
                    self.mailer.as_ref(),
                    self.mail_from.as_deref(),
                    conversation_id,
                    sender_id,
                )
                .await
            }
            NotifyRequest::Broadcast { broadcast_id } => {
                notify::notify_broadcast(
                    &self.db,
                    self.mailer.as_ref(),
                    self.mail_from.as_deref(),
                    broadcast_id,
                )
                .await
            }
        };
        report.map_err(|e| match e {
            AppError::Notification(_) | AppError::NotFound => e,
            other => AppError::Notification(other.to_string()),
        })
    }
}
