use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use uuid::Uuid;
use crate::{
    error::Result,
    models::{
        conversation::{Broadcast, BroadcastTarget, Conversation, Message},
        user::Profile,
    },
};

/// Lists the conversations a profile belongs to, newest first.
pub async fn list_for_member(pool: &Pool, profile_id: &Uuid) -> Result<Vec<Conversation>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT c.id, c.company_id, c.created_at
            FROM conversations c
            JOIN conversation_members m ON m.conversation_id = c.id
            WHERE m.profile_id = $1
            ORDER BY c.created_at DESC
            "#,
            &[profile_id],
        )
        .await?;
    Ok(rows.iter().map(Conversation::from).collect())
}

/// The first member of a conversation other than `viewer`.
pub async fn counterpart(
    pool: &Pool,
    conversation_id: &Uuid,
    viewer: &Uuid,
) -> Result<Option<Profile>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT p.id, p.name, p.email, p.role, p.company_id
            FROM conversation_members m
            JOIN profiles p ON p.id = m.profile_id
            WHERE m.conversation_id = $1 AND m.profile_id <> $2
            LIMIT 1
            "#,
            &[conversation_id, viewer],
        )
        .await?;
    Ok(row.as_ref().map(Profile::from))
}

pub async fn member_ids(pool: &Pool, conversation_id: &Uuid) -> Result<Vec<Uuid>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT profile_id FROM conversation_members WHERE conversation_id = $1",
            &[conversation_id],
        )
        .await?;
    Ok(rows.iter().map(|row| row.get("profile_id")).collect())
}

pub async fn is_member(pool: &Pool, conversation_id: &Uuid, profile_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT 1 FROM conversation_members WHERE conversation_id = $1 AND profile_id = $2",
            &[conversation_id, profile_id],
        )
        .await?;
    Ok(row.is_some())
}

/// Finds the direct conversation both profiles are members of.
pub async fn find_direct(pool: &Pool, a: &Uuid, b: &Uuid) -> Result<Option<Uuid>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT c.id
            FROM conversations c
            JOIN conversation_members ma ON ma.conversation_id = c.id AND ma.profile_id = $1
            JOIN conversation_members mb ON mb.conversation_id = c.id AND mb.profile_id = $2
            WHERE c.type = 'direct'
            ORDER BY c.created_at
            LIMIT 1
            "#,
            &[a, b],
        )
        .await?;
    Ok(row.map(|r| r.get("id")))
}

/// Creates a direct conversation and its two memberships atomically.
pub async fn create_direct(
    pool: &Pool,
    id: Uuid,
    owner: &Uuid,
    other: &Uuid,
    company_id: Option<Uuid>,
) -> Result<Uuid> {
    let mut client = pool.get().await?;
    let transaction = client.transaction().await?;
    transaction
        .execute(
            "INSERT INTO conversations (id, type, company_id) VALUES ($1, 'direct', $2)",
            &[&id, &company_id],
        )
        .await?;
    transaction
        .execute(
            r#"
            INSERT INTO conversation_members (conversation_id, profile_id)
            VALUES ($1, $2), ($1, $3)
            "#,
            &[&id, owner, other],
        )
        .await?;
    transaction.commit().await?;
    Ok(id)
}

/// Lists a conversation's messages, oldest first.
pub async fn list_messages(pool: &Pool, conversation_id: &Uuid) -> Result<Vec<Message>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT id, conversation_id, sender_id, content, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC
            "#,
            &[conversation_id],
        )
        .await?;
    Ok(rows.iter().map(Message::from).collect())
}

pub async fn insert_message(
    pool: &Pool,
    id: Uuid,
    conversation_id: &Uuid,
    sender_id: &Uuid,
    content: &str,
) -> Result<Message> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, conversation_id, sender_id, content, created_at
            "#,
            &[&id, conversation_id, sender_id, &content],
        )
        .await?;
    Ok(Message::from(&row))
}

/// Creation time of the newest message in the conversation not sent by `viewer`.
pub async fn latest_inbound_at(
    pool: &Pool,
    viewer: &Uuid,
    conversation_id: &Uuid,
) -> Result<Option<DateTime<Utc>>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT created_at
            FROM messages
            WHERE conversation_id = $1 AND sender_id <> $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            &[conversation_id, viewer],
        )
        .await?;
    Ok(row.map(|r| r.get("created_at")))
}

/// The newest message a sender wrote in a conversation.
pub async fn latest_from_sender(
    pool: &Pool,
    conversation_id: &Uuid,
    sender_id: &Uuid,
) -> Result<Option<Message>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, conversation_id, sender_id, content, created_at
            FROM messages
            WHERE conversation_id = $1 AND sender_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            &[conversation_id, sender_id],
        )
        .await?;
    Ok(row.as_ref().map(Message::from))
}

pub async fn last_read_at(
    pool: &Pool,
    profile_id: &Uuid,
    conversation_id: &Uuid,
) -> Result<Option<DateTime<Utc>>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT last_read_at
            FROM conversation_reads
            WHERE profile_id = $1 AND conversation_id = $2
            "#,
            &[profile_id, conversation_id],
        )
        .await?;
    Ok(row.and_then(|r| r.get("last_read_at")))
}

pub async fn upsert_read(
    pool: &Pool,
    profile_id: &Uuid,
    conversation_id: &Uuid,
    at: DateTime<Utc>,
) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            INSERT INTO conversation_reads (profile_id, conversation_id, last_read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (profile_id, conversation_id)
            DO UPDATE SET last_read_at = EXCLUDED.last_read_at
            "#,
            &[profile_id, conversation_id, &at],
        )
        .await?;
    Ok(())
}

pub async fn find_broadcast(pool: &Pool, broadcast_id: &Uuid) -> Result<Option<Broadcast>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT id, title, body, company_id, created_at FROM broadcasts WHERE id = $1",
            &[broadcast_id],
        )
        .await?;
    Ok(row.as_ref().map(Broadcast::from))
}

pub async fn broadcast_recipient_ids(pool: &Pool, broadcast_id: &Uuid) -> Result<Vec<Uuid>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT profile_id FROM broadcast_recipients WHERE broadcast_id = $1",
            &[broadcast_id],
        )
        .await?;
    Ok(rows.iter().map(|row| row.get("profile_id")).collect())
}

/// Stores a broadcast and, for an explicit audience, its recipient rows.
pub async fn create_broadcast(
    pool: &Pool,
    id: Uuid,
    title: &str,
    body: &str,
    target: &BroadcastTarget,
) -> Result<Broadcast> {
    let mut client = pool.get().await?;
    let transaction = client.transaction().await?;
    let row = transaction
        .query_one(
            r#"
            INSERT INTO broadcasts (id, title, body, company_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, body, company_id, created_at
            "#,
            &[&id, &title, &body, &target.company_id()],
        )
        .await?;
    if let BroadcastTarget::Members { profile_ids } = target {
        transaction
            .execute(
                r#"
                INSERT INTO broadcast_recipients (broadcast_id, profile_id)
                SELECT $1, unnest($2::uuid[])
                "#,
                &[&id, profile_ids],
            )
            .await?;
    }
    transaction.commit().await?;
    Ok(Broadcast::from(&row))
}
