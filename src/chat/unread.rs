//! Binary "has new inbound messages" flags derived from timestamps.
//!
//! Nothing is stored: every flag is recomputed from the viewer's read marker
//! and the newest message someone else sent. Each entry costs two queries,
//! which is fine for a handful of conversations and not meant for more.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{error::Result, remote::ChatStore};

/// The unread rule for a single conversation.
pub fn is_unread(
    last_read_at: Option<DateTime<Utc>>,
    latest_inbound_at: Option<DateTime<Utc>>,
) -> bool {
    match (latest_inbound_at, last_read_at) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(inbound), Some(read)) => inbound > read,
    }
}

/// Whether `viewer` has unread inbound messages in a conversation.
pub async fn conversation_unread(
    store: &dyn ChatStore,
    viewer: Uuid,
    conversation_id: Uuid,
) -> Result<bool> {
    let last_read_at = store.last_read_at(viewer, conversation_id).await?;
    let latest_inbound_at = store.latest_inbound_at(viewer, conversation_id).await?;
    Ok(is_unread(last_read_at, latest_inbound_at))
}

/// Whether `viewer` has unread messages from a correspondent. No direct
/// conversation yet means nothing to read.
pub async fn correspondent_unread(
    store: &dyn ChatStore,
    viewer: Uuid,
    profile_id: Uuid,
) -> Result<bool> {
    match store.find_direct_conversation(viewer, profile_id).await? {
        Some(conversation_id) => conversation_unread(store, viewer, conversation_id).await,
        None => Ok(false),
    }
}

/// Unread flags for each conversation, computed independently.
///
/// A failed lookup marks that entry as read and is logged; it never fails
/// the whole map.
pub async fn unread_by_conversation(
    store: &dyn ChatStore,
    viewer: Uuid,
    conversation_ids: &[Uuid],
) -> HashMap<Uuid, bool> {
    let flags = join_all(conversation_ids.iter().map(|&id| async move {
        let unread = conversation_unread(store, viewer, id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(conversation_id = %id, "unread lookup failed: {}", e);
                false
            });
        (id, unread)
    }))
    .await;
    flags.into_iter().collect()
}

/// Unread flags keyed by correspondent profile.
pub async fn unread_by_correspondent(
    store: &dyn ChatStore,
    viewer: Uuid,
    profile_ids: &[Uuid],
) -> HashMap<Uuid, bool> {
    let flags = join_all(profile_ids.iter().map(|&id| async move {
        let unread = correspondent_unread(store, viewer, id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(profile_id = %id, "unread lookup failed: {}", e);
                false
            });
        (id, unread)
    }))
    .await;
    flags.into_iter().collect()
}
