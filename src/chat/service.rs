use chrono::Utc;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use crate::{
    chat::unread,
    error::{AppError, Result},
    models::{
        conversation::{Broadcast, BroadcastTarget, Conversation, Message},
        user::Profile,
    },
    remote::{ChatStore, Notifier, NotifyRequest},
};

/// A conversation in a member's inbox.
#[derive(Debug, Clone, Serialize)]
pub struct InboxEntry {
    pub conversation: Conversation,
    /// The other side of the conversation, if it has one.
    pub counterpart: Option<Profile>,
    pub unread: bool,
}

/// A profile an admin can chat with.
#[derive(Debug, Clone, Serialize)]
pub struct Correspondent {
    pub profile: Profile,
    pub unread: bool,
}

/// The result of sending a message.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub message: Message,
    /// Whether recipients were notified.
    pub notified: bool,
    /// Why notification failed; the message is kept regardless.
    pub notify_error: Option<String>,
    /// Unread flags for the sender's conversations after sending.
    pub unread: HashMap<Uuid, bool>,
}

/// The result of publishing a broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastOutcome {
    pub broadcast: Broadcast,
    pub notified: bool,
    pub notify_error: Option<String>,
}

/// Chat operations shared by the admin and member views.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    notifier: Arc<dyn Notifier>,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// The viewer's conversations, newest first, with unread flags.
    pub async fn member_inbox(&self, viewer: Uuid) -> Result<Vec<InboxEntry>> {
        let conversations = self.store.conversations_for(viewer).await?;
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let mut flags = unread::unread_by_conversation(self.store.as_ref(), viewer, &ids).await;

        let mut entries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let counterpart = self.store.counterpart(conversation.id, viewer).await?;
            let unread = flags.remove(&conversation.id).unwrap_or(false);
            entries.push(InboxEntry {
                conversation,
                counterpart,
                unread,
            });
        }
        Ok(entries)
    }

    /// Every other profile, with unread flags for their direct conversation.
    pub async fn correspondents(&self, viewer: Uuid) -> Result<Vec<Correspondent>> {
        let profiles = self.store.profiles_except(viewer).await?;
        let ids: Vec<Uuid> = profiles.iter().map(|p| p.id).collect();
        let mut flags = unread::unread_by_correspondent(self.store.as_ref(), viewer, &ids).await;

        Ok(profiles
            .into_iter()
            .map(|profile| {
                let unread = flags.remove(&profile.id).unwrap_or(false);
                Correspondent { profile, unread }
            })
            .collect())
    }

    /// Finds or creates the direct conversation with `profile_id`, marks it
    /// read and returns it with its messages.
    pub async fn open_conversation(
        &self,
        viewer: Uuid,
        profile_id: Uuid,
    ) -> Result<(Uuid, Vec<Message>)> {
        if viewer == profile_id {
            return Err(AppError::Validation(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let conversation_id = match self.store.find_direct_conversation(viewer, profile_id).await? {
            Some(id) => id,
            None => {
                let profile = self
                    .store
                    .find_profile(profile_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                let id = self.store.create_direct_conversation(viewer, &profile).await?;
                tracing::info!(conversation_id = %id, %profile_id, "direct conversation created");
                id
            }
        };

        let messages = self.store.messages(conversation_id).await?;
        self.mark_read(viewer, conversation_id).await?;
        Ok((conversation_id, messages))
    }

    /// Messages of a conversation the viewer belongs to; marks it read.
    pub async fn messages(&self, viewer: Uuid, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.ensure_member(viewer, conversation_id).await?;
        let messages = self.store.messages(conversation_id).await?;
        self.mark_read(viewer, conversation_id).await?;
        Ok(messages)
    }

    /// Persists a message, notifies the other members and marks the
    /// conversation read for the sender.
    ///
    /// Notification is best-effort: a failure is reported in the outcome and
    /// the stored message stays.
    pub async fn send_message(
        &self,
        viewer: Uuid,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<SendOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("Message cannot be empty".to_string()));
        }
        self.ensure_member(viewer, conversation_id).await?;

        let message = self
            .store
            .insert_message(conversation_id, viewer, content)
            .await?;
        tracing::info!(message_id = %message.id, %conversation_id, "message sent");

        let notify_error = match self
            .notifier
            .invoke(NotifyRequest::Message {
                conversation_id,
                sender_id: viewer,
            })
            .await
        {
            Ok(report) => {
                tracing::debug!(recipients = report.recipients, delivered = report.delivered, "recipients notified");
                None
            }
            Err(e) => {
                tracing::warn!(%conversation_id, "message notification failed: {}", e);
                Some(e.to_string())
            }
        };

        self.mark_read(viewer, conversation_id).await?;

        let conversation_ids: Vec<Uuid> = self
            .store
            .conversations_for(viewer)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let unread =
            unread::unread_by_conversation(self.store.as_ref(), viewer, &conversation_ids).await;

        Ok(SendOutcome {
            message,
            notified: notify_error.is_none(),
            notify_error,
            unread,
        })
    }

    /// Stores a broadcast and notifies its audience.
    ///
    /// Like messages, the broadcast is kept when notification fails.
    pub async fn send_broadcast(
        &self,
        title: &str,
        body: &str,
        target: BroadcastTarget,
    ) -> Result<BroadcastOutcome> {
        let (title, body) = (title.trim(), body.trim());
        if title.is_empty() || body.is_empty() {
            return Err(AppError::Validation(
                "Broadcast needs a title and a body".to_string(),
            ));
        }
        let target = match target {
            BroadcastTarget::Members { mut profile_ids } => {
                profile_ids.sort_unstable();
                profile_ids.dedup();
                if profile_ids.is_empty() {
                    return Err(AppError::Validation(
                        "Choose at least one member".to_string(),
                    ));
                }
                BroadcastTarget::Members { profile_ids }
            }
            company => company,
        };

        let broadcast = self.store.create_broadcast(title, body, &target).await?;
        tracing::info!(broadcast_id = %broadcast.id, "broadcast stored");

        let notify_error = match self
            .notifier
            .invoke(NotifyRequest::Broadcast {
                broadcast_id: broadcast.id,
            })
            .await
        {
            Ok(report) => {
                tracing::debug!(recipients = report.recipients, delivered = report.delivered, "audience notified");
                None
            }
            Err(e) => {
                tracing::warn!(broadcast_id = %broadcast.id, "broadcast notification failed: {}", e);
                Some(e.to_string())
            }
        };

        Ok(BroadcastOutcome {
            broadcast,
            notified: notify_error.is_none(),
            notify_error,
        })
    }

    /// Records that `viewer` has read the conversation up to now.
    pub async fn mark_read(&self, viewer: Uuid, conversation_id: Uuid) -> Result<()> {
        self.store.mark_read(viewer, conversation_id, Utc::now()).await
    }

    /// Like [`ChatService::mark_read`], restricted to members.
    pub async fn mark_read_as_member(&self, viewer: Uuid, conversation_id: Uuid) -> Result<()> {
        self.ensure_member(viewer, conversation_id).await?;
        self.mark_read(viewer, conversation_id).await
    }

    async fn ensure_member(&self, viewer: Uuid, conversation_id: Uuid) -> Result<()> {
        if self.store.is_member(conversation_id, viewer).await? {
            Ok(())
        } else {
            tracing::warn!(%viewer, %conversation_id, "not a member of conversation");
            Err(AppError::Unauthorized)
        }
    }
}
