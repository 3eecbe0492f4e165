//! Contracts of the hosted data platform the portal runs against.
//!
//! The portal never talks to storage directly; everything goes through
//! [`RemoteDataService`] (auth and roles), [`ChatStore`] (conversation
//! reads and writes) and [`Notifier`] (server-side notification functions).

pub mod events;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        conversation::{Broadcast, BroadcastTarget, Conversation, Message},
        session::Session,
        user::{Credentials, Profile},
    },
};

pub use events::{SessionEvents, SessionSubscription};

/// Auth and role lookups offered by the data platform.
#[async_trait]
pub trait RemoteDataService: Send + Sync {
    /// Returns the persisted session, if any.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Registers a listener for auth-state changes. Dropping (or
    /// unsubscribing) the returned handle deregisters it.
    fn on_session_change(&self) -> SessionSubscription;

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session>;

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session>;

    async fn sign_out(&self) -> Result<()>;

    /// Single-row role lookup keyed by user id. `Ok(None)` means the row
    /// exists with no role set.
    async fn query_role(&self, user_id: Uuid) -> Result<Option<String>>;
}

/// Conversation data read by the chat views.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Conversations the profile is a member of, newest first.
    async fn conversations_for(&self, profile_id: Uuid) -> Result<Vec<Conversation>>;

    /// The first member of the conversation other than `viewer`.
    async fn counterpart(&self, conversation_id: Uuid, viewer: Uuid) -> Result<Option<Profile>>;

    /// Every profile except `viewer`, ordered by name.
    async fn profiles_except(&self, viewer: Uuid) -> Result<Vec<Profile>>;

    async fn find_profile(&self, profile_id: Uuid) -> Result<Option<Profile>>;

    async fn is_member(&self, conversation_id: Uuid, profile_id: Uuid) -> Result<bool>;

    /// The direct conversation shared by two profiles.
    async fn find_direct_conversation(&self, a: Uuid, b: Uuid) -> Result<Option<Uuid>>;

    /// Creates a direct conversation with both profiles as members.
    async fn create_direct_conversation(&self, owner: Uuid, other: &Profile) -> Result<Uuid>;

    /// Messages in ascending creation order.
    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Message>;

    async fn last_read_at(
        &self,
        profile_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Creation time of the newest message not sent by `viewer`.
    async fn latest_inbound_at(
        &self,
        viewer: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Upserts the read marker for (profile, conversation).
    async fn mark_read(&self, profile_id: Uuid, conversation_id: Uuid, at: DateTime<Utc>)
        -> Result<()>;

    /// Stores a broadcast addressed to `target`.
    async fn create_broadcast(
        &self,
        title: &str,
        body: &str,
        target: &BroadcastTarget,
    ) -> Result<Broadcast>;
}

/// Payload accepted by the notification functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotifyRequest {
    Message { conversation_id: Uuid, sender_id: Uuid },
    Broadcast { broadcast_id: Uuid },
}

impl NotifyRequest {
    /// The name of the server-side function handling this payload.
    pub fn function_name(&self) -> &'static str {
        match self {
            NotifyRequest::Message { .. } => "notify-message",
            NotifyRequest::Broadcast { .. } => "notify-broadcast",
        }
    }
}

/// Outcome of a notification dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    /// Recipients resolved for the payload.
    pub recipients: usize,
    /// Mails handed to the transport.
    pub delivered: usize,
}

/// Invocable notification functions.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn invoke(&self, request: NotifyRequest) -> Result<NotifyReport>;
}
