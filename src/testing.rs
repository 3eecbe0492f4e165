//! In-memory stand-ins for the data platform, used by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        conversation::{Broadcast, BroadcastTarget, Conversation, Message},
        session::{AuthChangeEvent, Session, SessionChange, SessionUser},
        user::{Credentials, Profile},
    },
    remote::{
        ChatStore, Notifier, NotifyReport, NotifyRequest, RemoteDataService, SessionEvents,
        SessionSubscription,
    },
};

pub fn session_for(user_id: Uuid, email: &str) -> Session {
    let now = Utc::now();
    Session {
        id: Uuid::new_v4(),
        user: SessionUser {
            id: user_id,
            email: Some(email.to_string()),
        },
        created_at: now,
        expires_at: now + ChronoDuration::days(7),
    }
}

struct RoleEntry {
    outcome: std::result::Result<Option<String>, String>,
    delay: Option<Duration>,
}

#[derive(Default)]
struct RemoteState {
    session: Option<Session>,
    session_delay: Duration,
    role_delay: Duration,
    roles: HashMap<Uuid, RoleEntry>,
    accounts: HashMap<String, (String, Uuid)>,
}

/// Scriptable auth/role backend.
pub struct FakeRemote {
    state: Mutex<RemoteState>,
    events: SessionEvents,
    role_queries: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RemoteState::default()),
            events: SessionEvents::new(),
            role_queries: AtomicUsize::new(0),
        })
    }

    /// Persists a session as if restored from a previous run.
    pub fn restore_session(&self, user_id: Uuid, email: &str) -> Session {
        let session = session_for(user_id, email);
        self.state.lock().unwrap().session = Some(session.clone());
        session
    }

    pub fn set_session_delay(&self, delay: Duration) {
        self.state.lock().unwrap().session_delay = delay;
    }

    pub fn set_role(&self, user_id: Uuid, role: Option<&str>) {
        self.state.lock().unwrap().roles.insert(
            user_id,
            RoleEntry {
                outcome: Ok(role.map(str::to_string)),
                delay: None,
            },
        );
    }

    pub fn fail_role(&self, user_id: Uuid, message: &str) {
        self.state.lock().unwrap().roles.insert(
            user_id,
            RoleEntry {
                outcome: Err(message.to_string()),
                delay: None,
            },
        );
    }

    /// Delay applied to every role lookup without its own delay.
    pub fn set_role_delay(&self, delay: Duration) {
        self.state.lock().unwrap().role_delay = delay;
    }

    pub fn set_user_role_delay(&self, user_id: Uuid, delay: Duration) {
        if let Some(entry) = self.state.lock().unwrap().roles.get_mut(&user_id) {
            entry.delay = Some(delay);
        }
    }

    pub fn add_account(&self, email: &str, password: &str, user_id: Uuid) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(email.to_string(), (password.to_string(), user_id));
    }

    pub fn role_queries(&self) -> usize {
        self.role_queries.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.events.listener_count()
    }

    /// Emits a change without touching the stored session.
    pub fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        self.events.emit(SessionChange { event, session });
    }

    fn start_session(&self, user_id: Uuid, email: &str) -> Session {
        let session = session_for(user_id, email);
        self.state.lock().unwrap().session = Some(session.clone());
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        session
    }
}

#[async_trait]
impl RemoteDataService for FakeRemote {
    async fn get_session(&self) -> Result<Option<Session>> {
        let delay = self.state.lock().unwrap().session_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.lock().unwrap().session.clone())
    }

    fn on_session_change(&self) -> SessionSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<Session> {
        let account = self
            .state
            .lock()
            .unwrap()
            .accounts
            .get(&credentials.email)
            .cloned();
        match account {
            Some((password, user_id)) if password == credentials.password => {
                Ok(self.start_session(user_id, &credentials.email))
            }
            _ => Err(AppError::Authentication(
                "Invalid login credentials".to_string(),
            )),
        }
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        let user_id = Uuid::new_v4();
        {
            let mut state = self.state.lock().unwrap();
            if state.accounts.contains_key(&credentials.email) {
                return Err(AppError::Validation("User already registered".to_string()));
            }
            state.accounts.insert(
                credentials.email.clone(),
                (credentials.password.clone(), user_id),
            );
        }
        Ok(self.start_session(user_id, &credentials.email))
    }

    async fn sign_out(&self) -> Result<()> {
        self.state.lock().unwrap().session = None;
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    async fn query_role(&self, user_id: Uuid) -> Result<Option<String>> {
        self.role_queries.fetch_add(1, Ordering::SeqCst);
        let (outcome, delay) = {
            let state = self.state.lock().unwrap();
            match state.roles.get(&user_id) {
                Some(entry) => (
                    entry.outcome.clone(),
                    entry.delay.unwrap_or(state.role_delay),
                ),
                None => (
                    Err("JSON object requested, multiple (or no) rows returned".to_string()),
                    state.role_delay,
                ),
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome.map_err(AppError::Internal)
    }
}

#[derive(Default)]
struct ChatState {
    profiles: HashMap<Uuid, Profile>,
    conversations: HashMap<Uuid, Conversation>,
    members: HashMap<Uuid, Vec<Uuid>>,
    messages: Vec<Message>,
    reads: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    failing_conversations: HashSet<Uuid>,
    broadcasts: Vec<Broadcast>,
    broadcast_recipients: HashMap<Uuid, Vec<Uuid>>,
}

/// In-memory conversation store.
#[derive(Default)]
pub struct FakeChat {
    state: Mutex<ChatState>,
}

impl FakeChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_profile(&self, name: &str, role: Option<&str>) -> Profile {
        let profile = Profile {
            id: Uuid::new_v4(),
            name: Some(name.to_string()),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            role: role.map(str::to_string),
            company_id: None,
        };
        self.state
            .lock()
            .unwrap()
            .profiles
            .insert(profile.id, profile.clone());
        profile
    }

    pub fn add_conversation(&self, members: &[Uuid], created_at: DateTime<Utc>) -> Uuid {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            company_id: None,
            created_at,
        };
        let mut state = self.state.lock().unwrap();
        state.members.insert(conversation.id, members.to_vec());
        state.conversations.insert(conversation.id, conversation.clone());
        conversation.id
    }

    pub fn add_message(&self, conversation_id: Uuid, sender_id: Uuid, at: DateTime<Utc>) {
        self.state.lock().unwrap().messages.push(Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: "hej".to_string(),
            created_at: at,
        });
    }

    pub fn set_read(&self, profile_id: Uuid, conversation_id: Uuid, at: DateTime<Utc>) {
        self.state
            .lock()
            .unwrap()
            .reads
            .insert((profile_id, conversation_id), at);
    }

    pub fn read_at(&self, profile_id: Uuid, conversation_id: Uuid) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap()
            .reads
            .get(&(profile_id, conversation_id))
            .copied()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn broadcast_recipients(&self, broadcast_id: Uuid) -> Vec<Uuid> {
        self.state
            .lock()
            .unwrap()
            .broadcast_recipients
            .get(&broadcast_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes every read of this conversation's markers fail.
    pub fn fail_reads_for(&self, conversation_id: Uuid) {
        self.state
            .lock()
            .unwrap()
            .failing_conversations
            .insert(conversation_id);
    }
}

#[async_trait]
impl ChatStore for FakeChat {
    async fn conversations_for(&self, profile_id: Uuid) -> Result<Vec<Conversation>> {
        let state = self.state.lock().unwrap();
        let mut conversations: Vec<Conversation> = state
            .members
            .iter()
            .filter(|(_, members)| members.contains(&profile_id))
            .filter_map(|(id, _)| state.conversations.get(id).cloned())
            .collect();
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(conversations)
    }

    async fn counterpart(&self, conversation_id: Uuid, viewer: Uuid) -> Result<Option<Profile>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .members
            .get(&conversation_id)
            .and_then(|members| members.iter().find(|id| **id != viewer))
            .and_then(|id| state.profiles.get(id).cloned()))
    }

    async fn profiles_except(&self, viewer: Uuid) -> Result<Vec<Profile>> {
        let state = self.state.lock().unwrap();
        let mut profiles: Vec<Profile> = state
            .profiles
            .values()
            .filter(|p| p.id != viewer)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    async fn find_profile(&self, profile_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.state.lock().unwrap().profiles.get(&profile_id).cloned())
    }

    async fn is_member(&self, conversation_id: Uuid, profile_id: Uuid) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .get(&conversation_id)
            .is_some_and(|members| members.contains(&profile_id)))
    }

    async fn find_direct_conversation(&self, a: Uuid, b: Uuid) -> Result<Option<Uuid>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .members
            .iter()
            .find(|(_, members)| members.len() == 2 && members.contains(&a) && members.contains(&b))
            .map(|(id, _)| *id))
    }

    async fn create_direct_conversation(&self, owner: Uuid, other: &Profile) -> Result<Uuid> {
        Ok(self.add_conversation(&[owner, other.id], Utc::now()))
    }

    async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let state = self.state.lock().unwrap();
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().messages.push(message.clone());
        Ok(message)
    }

    async fn last_read_at(
        &self,
        profile_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.lock().unwrap();
        if state.failing_conversations.contains(&conversation_id) {
            return Err(AppError::Internal("read markers unavailable".to_string()));
        }
        Ok(state.reads.get(&(profile_id, conversation_id)).copied())
    }

    async fn latest_inbound_at(
        &self,
        viewer: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != viewer)
            .map(|m| m.created_at)
            .max())
    }

    async fn mark_read(
        &self,
        profile_id: Uuid,
        conversation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.set_read(profile_id, conversation_id, at);
        Ok(())
    }

    async fn create_broadcast(
        &self,
        title: &str,
        body: &str,
        target: &BroadcastTarget,
    ) -> Result<Broadcast> {
        let broadcast = Broadcast {
            id: Uuid::new_v4(),
            title: title.to_string(),
            body: body.to_string(),
            company_id: target.company_id(),
            created_at: Utc::now(),
        };
        let mut state = self.state.lock().unwrap();
        if let BroadcastTarget::Members { profile_ids } = target {
            state.broadcast_recipients.insert(broadcast.id, profile_ids.clone());
        }
        state.broadcasts.push(broadcast.clone());
        Ok(broadcast)
    }
}

/// Records notification payloads; optionally fails them.
#[derive(Default)]
pub struct FakeNotifier {
    requests: Mutex<Vec<NotifyRequest>>,
    failure: Mutex<Option<String>>,
}

impl FakeNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn requests(&self) -> Vec<NotifyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn invoke(&self, request: NotifyRequest) -> Result<NotifyReport> {
        self.requests.lock().unwrap().push(request);
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(AppError::Notification(message)),
            None => Ok(NotifyReport {
                recipients: 1,
                delivered: 1,
            }),
        }
    }
}
