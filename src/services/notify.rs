//! Recipient resolution and mail composition for the notification functions.
//!
//! Delivery itself sits behind [`Mailer`]; the portal ships a transport that
//! only logs, and a real one can be plugged in without touching this module.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use futures::future::join_all;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        conversation::{Broadcast, Message},
        user::Profile,
    },
    remote::NotifyReport,
    repositories::{conversation as conversation_repo, profile as profile_repo},
};

/// A composed notification mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// Transport that records mails in the log instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "📧 notification mail");
        Ok(())
    }
}

fn recipient_name<'a>(profile: &'a Profile, fallback: &'a str) -> &'a str {
    profile
        .name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(fallback)
}

/// Builds the mail telling `recipient` about a new chat message.
pub fn message_mail(from: &str, recipient: &Profile, content: &str) -> Option<OutgoingMail> {
    let to = recipient.email.clone()?;
    Some(OutgoingMail {
        from: from.to_string(),
        to,
        subject: "New message in the CRM".to_string(),
        text: format!(
            "Hi {},\n\nYou have received a new message:\n\n\"{}\"\n\nSign in to reply.",
            recipient_name(recipient, "customer"),
            content
        ),
    })
}

/// Builds the mail announcing a broadcast to `recipient`.
pub fn broadcast_mail(from: &str, recipient: &Profile, title: &str) -> Option<OutgoingMail> {
    let to = recipient.email.clone()?;
    let subject = if title.trim().is_empty() {
        "New announcement".to_string()
    } else {
        title.to_string()
    };
    Some(OutgoingMail {
        from: from.to_string(),
        to,
        subject,
        text: format!(
            "Hi {},\n\nA new announcement is available:\n\n{}\n\nSign in to read all of it.",
            recipient_name(recipient, "member"),
            title
        ),
    })
}

async fn deliver(mailer: &dyn Mailer, mails: Vec<OutgoingMail>, recipients: usize) -> Result<NotifyReport> {
    let results = join_all(mails.into_iter().map(|mail| mailer.send(mail))).await;
    let delivered = results.iter().filter(|r| r.is_ok()).count();
    if let Some(Err(e)) = results.into_iter().find(|r| r.is_err()) {
        return Err(AppError::Notification(format!(
            "{} of {} mails failed: {}",
            recipients.saturating_sub(delivered),
            recipients,
            e
        )));
    }
    Ok(NotifyReport {
        recipients,
        delivered,
    })
}

/// Row lookups the notification functions need to resolve recipients.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn conversation_member_ids(&self, conversation_id: Uuid) -> Result<Vec<Uuid>>;

    /// The newest message `sender_id` wrote in the conversation.
    async fn latest_from_sender(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
    ) -> Result<Option<Message>>;

    async fn broadcast(&self, broadcast_id: Uuid) -> Result<Option<Broadcast>>;

    async fn company_profile_ids(&self, company_id: Uuid) -> Result<Vec<Uuid>>;

    async fn broadcast_recipient_ids(&self, broadcast_id: Uuid) -> Result<Vec<Uuid>>;

    async fn profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>>;
}

#[async_trait]
impl RecipientDirectory for Pool {
    async fn conversation_member_ids(&self, conversation_id: Uuid) -> Result<Vec<Uuid>> {
        conversation_repo::member_ids(self, &conversation_id).await
    }

    async fn latest_from_sender(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
    ) -> Result<Option<Message>> {
        conversation_repo::latest_from_sender(self, &conversation_id, &sender_id).await
    }

    async fn broadcast(&self, broadcast_id: Uuid) -> Result<Option<Broadcast>> {
        conversation_repo::find_broadcast(self, &broadcast_id).await
    }

    async fn company_profile_ids(&self, company_id: Uuid) -> Result<Vec<Uuid>> {
        profile_repo::ids_in_company(self, &company_id).await
    }

    async fn broadcast_recipient_ids(&self, broadcast_id: Uuid) -> Result<Vec<Uuid>> {
        conversation_repo::broadcast_recipient_ids(self, &broadcast_id).await
    }

    async fn profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>> {
        profile_repo::find_many(self, ids).await
    }
}

fn sender_address(mail_from: Option<&str>) -> Result<&str> {
    mail_from.ok_or_else(|| AppError::Notification("Mail sender not configured".to_string()))
}

/// Notifies every member of a conversation except the sender about the
/// sender's latest message.
pub async fn notify_message(
    directory: &dyn RecipientDirectory,
    mailer: &dyn Mailer,
    mail_from: Option<&str>,
    conversation_id: Uuid,
    sender_id: Uuid,
) -> Result<NotifyReport> {
    let recipient_ids: Vec<Uuid> = directory
        .conversation_member_ids(conversation_id)
        .await?
        .into_iter()
        .filter(|id| *id != sender_id)
        .collect();
    if recipient_ids.is_empty() {
        tracing::debug!(%conversation_id, "no recipients");
        return Ok(NotifyReport::default());
    }

    let profiles = directory.profiles(&recipient_ids).await?;
    let message = directory.latest_from_sender(conversation_id, sender_id).await?;
    let from = sender_address(mail_from)?;

    let content = message.map(|m| m.content).unwrap_or_default();
    let mails: Vec<OutgoingMail> = profiles
        .iter()
        .filter_map(|profile| message_mail(from, profile, &content))
        .collect();
    let recipients = mails.len();
    deliver(mailer, mails, recipients).await
}

/// Notifies a broadcast's audience: the broadcast's company if it has one,
/// otherwise its explicit recipient list.
pub async fn notify_broadcast(
    directory: &dyn RecipientDirectory,
    mailer: &dyn Mailer,
    mail_from: Option<&str>,
    broadcast_id: Uuid,
) -> Result<NotifyReport> {
    let broadcast = directory
        .broadcast(broadcast_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let recipient_ids = match broadcast.company_id {
        Some(company_id) => directory.company_profile_ids(company_id).await?,
        None => directory.broadcast_recipient_ids(broadcast.id).await?,
    };
    if recipient_ids.is_empty() {
        tracing::debug!(%broadcast_id, "no recipients");
        return Ok(NotifyReport::default());
    }

    let profiles = directory.profiles(&recipient_ids).await?;
    let from = sender_address(mail_from)?;

    let mails: Vec<OutgoingMail> = profiles
        .iter()
        .filter_map(|profile| broadcast_mail(from, profile, &broadcast.title))
        .collect();
    let recipients = mails.len();
    deliver(mailer, mails, recipients).await
}
