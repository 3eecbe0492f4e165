use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

/// A chat thread between portal members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// The unique identifier for the conversation.
    pub id: Uuid,
    /// The company the conversation belongs to, if any.
    pub company_id: Option<Uuid>,
    /// The timestamp when the conversation was created.
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for Conversation {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            company_id: row.get("company_id"),
            created_at: row.get("created_at"),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for Message {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            content: row.get("content"),
            created_at: row.get("created_at"),
        }
    }
}

/// When a member last acknowledged a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadMarker {
    pub profile_id: Uuid,
    pub conversation_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

/// An announcement sent to a company or an explicit recipient list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for Broadcast {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            title: row.get("title"),
            body: row.get("body"),
            company_id: row.get("company_id"),
            created_at: row.get("created_at"),
        }
    }
}

/// Who a new broadcast is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BroadcastTarget {
    /// Every profile of one company.
    Company { company_id: Uuid },
    /// An explicit list of profiles.
    Members { profile_ids: Vec<Uuid> },
}

impl BroadcastTarget {
    pub fn company_id(&self) -> Option<Uuid> {
        match self {
            BroadcastTarget::Company { company_id } => Some(*company_id),
            BroadcastTarget::Members { .. } => None,
        }
    }
}
