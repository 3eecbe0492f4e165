//! The process-wide authentication state.
//!
//! [`AuthController`] owns the current session and the role resolved for it.
//! Consumers read snapshots or subscribe to changes; only the controller writes.

use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{
    auth::role_resolver::{RoleError, RoleResolution, RoleResolver},
    error::Result,
    models::{
        role::Role,
        session::{Session, SessionUser},
        user::Credentials,
    },
    remote::{RemoteDataService, SessionSubscription},
};

/// A snapshot of the controller's state.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub role: Option<Role>,
    pub role_error: Option<RoleError>,
    /// True until the first session fetch (or change event) resolves.
    pub session_loading: bool,
    pub role_loading: bool,
}

impl AuthState {
    /// The state before the first session fetch resolves.
    pub fn initial() -> Self {
        Self {
            session: None,
            role: None,
            role_error: None,
            session_loading: true,
            role_loading: false,
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user().map(|u| u.id)
    }

    /// Whether neither the session nor the role is still being resolved.
    pub fn is_settled(&self) -> bool {
        !self.session_loading && !self.role_loading
    }

    pub fn status(&self) -> AuthStatus {
        AuthStatus {
            status: if self.session_loading {
                "auth-loading"
            } else if self.session.is_some() {
                "signed-in"
            } else {
                "signed-out"
            },
            role_status: if self.role_loading { "role-loading" } else { "ready" },
            user_id: self.user_id(),
            email: self.user().and_then(|u| u.email.clone()),
            role: self.role,
            role_error: self.role_error.as_ref().map(ToString::to_string),
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Diagnostic view of the auth state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthStatus {
    pub status: &'static str,
    pub role_status: &'static str,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub role_error: Option<String>,
}

#[derive(Default)]
struct Sequence {
    /// Session changes applied from events.
    session_epoch: u64,
    /// The most recently started role resolution.
    role_ticket: u64,
}

struct Shared {
    remote: Arc<dyn RemoteDataService>,
    resolver: RoleResolver,
    state: watch::Sender<AuthState>,
    sequence: Mutex<Sequence>,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    /// Installs a new session and clears the role that belonged to the old
    /// one. Returns the ticket for the role resolution to start, or `None`
    /// when nothing was applied.
    fn install_session(&self, session: Option<Session>, from_event: bool) -> Option<u64> {
        let mut sequence = self.sequence.lock();
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        if from_event {
            sequence.session_epoch += 1;
        } else if sequence.session_epoch > 0 {
            tracing::debug!("initial session fetch superseded by a change event");
            return None;
        }
        sequence.role_ticket += 1;
        let ticket = sequence.role_ticket;

        let has_user = session.is_some();
        self.state.send_modify(|state| {
            state.session = session;
            state.session_loading = false;
            state.role = None;
            state.role_error = None;
            state.role_loading = has_user;
        });

        Some(ticket)
    }

    /// Marks a role resolution as started for the current session and
    /// returns its ticket with the user it resolves for. Both are read under
    /// the sequence lock, so a session installed afterwards supersedes it.
    fn begin_role_resolution(&self) -> (u64, Option<Uuid>) {
        let mut sequence = self.sequence.lock();
        sequence.role_ticket += 1;
        let user_id = self.state.borrow().user_id();
        if !self.closed.load(Ordering::Acquire) {
            self.state.send_modify(|state| state.role_loading = true);
        }
        (sequence.role_ticket, user_id)
    }

    /// Commits a resolution outcome if it is still the latest one started
    /// and was resolved for the user currently signed in.
    fn commit_role(&self, ticket: u64, user_id: Option<Uuid>, outcome: RoleResolution) -> bool {
        let sequence = self.sequence.lock();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if sequence.role_ticket != ticket {
            tracing::debug!(
                ticket,
                latest = sequence.role_ticket,
                "discarding stale role resolution"
            );
            return false;
        }
        if self.state.borrow().user_id() != user_id {
            tracing::debug!(ticket, "discarding role resolved for another user");
            return false;
        }

        self.state.send_modify(|state| {
            match outcome {
                Ok(role) => {
                    state.role = role;
                    state.role_error = None;
                }
                Err(error) => {
                    state.role = None;
                    state.role_error = Some(error);
                }
            }
            state.role_loading = false;
        });
        true
    }

    fn apply_session(self: &Arc<Self>, session: Option<Session>, from_event: bool) {
        let user_id = session.as_ref().map(Session::user_id);
        let Some(ticket) = self.install_session(session, from_event) else {
            return;
        };
        let Some(user_id) = user_id else {
            tracing::debug!("no session, role cleared");
            return;
        };

        let resolver = self.resolver.clone();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = resolver.resolve(Some(user_id)).await;
            if let Some(shared) = weak.upgrade() {
                if shared.commit_role(ticket, Some(user_id), outcome.clone()) {
                    match outcome {
                        Ok(role) => tracing::info!(%user_id, ?role, "role resolved"),
                        Err(e) => tracing::warn!(%user_id, "role unresolved: {}", e),
                    }
                }
            }
        });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// Handle to the process-wide auth state. Cheap to clone.
#[derive(Clone)]
pub struct AuthController {
    shared: Arc<Shared>,
}

impl AuthController {
    /// Mounts a controller with the default role timeout.
    pub fn mount(remote: Arc<dyn RemoteDataService>) -> Self {
        let resolver = RoleResolver::new(remote.clone());
        Self::mount_with(remote, resolver)
    }

    pub fn mount_with_timeout(remote: Arc<dyn RemoteDataService>, timeout: Duration) -> Self {
        let resolver = RoleResolver::with_timeout(remote.clone(), timeout);
        Self::mount_with(remote, resolver)
    }

    /// Mounts the controller: registers the auth-state listener and starts
    /// the initial session fetch. Must be called inside a tokio runtime.
    pub fn mount_with(remote: Arc<dyn RemoteDataService>, resolver: RoleResolver) -> Self {
        let (state, _) = watch::channel(AuthState::initial());
        let shared = Arc::new(Shared {
            remote: remote.clone(),
            resolver,
            state,
            sequence: Mutex::new(Sequence::default()),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        // Registered before the fetch starts so no change can slip between.
        let subscription = remote.on_session_change();
        let listener = tokio::spawn(listen(Arc::downgrade(&shared), subscription));

        let weak = Arc::downgrade(&shared);
        let init = tokio::spawn(async move {
            let session = match remote.get_session().await {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!("failed to restore session: {}", e);
                    None
                }
            };
            if let Some(shared) = weak.upgrade() {
                tracing::debug!(restored = session.is_some(), "initial session resolved");
                shared.apply_session(session, false);
            }
        });

        shared.tasks.lock().extend([listener, init]);
        tracing::debug!("auth controller mounted");
        Self { shared }
    }

    /// The current state.
    pub fn snapshot(&self) -> AuthState {
        self.shared.state.borrow().clone()
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.shared.state.subscribe()
    }

    /// Waits until the state satisfies `predicate`, returning that state.
    pub async fn wait_for(&self, predicate: impl FnMut(&AuthState) -> bool) -> Option<AuthState> {
        let mut changes = self.subscribe();
        let state = changes.wait_for(predicate).await.ok().map(|state| state.clone());
        state
    }

    /// Waits until neither the session nor the role is loading.
    pub async fn settled(&self) -> Option<AuthState> {
        self.wait_for(AuthState::is_settled).await
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        tracing::debug!("signing in {}", credentials.email);
        self.shared.remote.sign_in_with_password(credentials).await
    }

    pub async fn sign_up(&self, credentials: &Credentials) -> Result<Session> {
        tracing::debug!("signing up {}", credentials.email);
        self.shared.remote.sign_up(credentials).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.shared.remote.sign_out().await
    }

    /// Re-resolves the role for the current session's user.
    ///
    /// The outcome is committed only if no newer resolution started in the
    /// meantime; the resolved role is returned either way.
    pub async fn refresh_role(&self) -> Option<Role> {
        let (ticket, user_id) = self.shared.begin_role_resolution();
        let outcome = self.shared.resolver.resolve(user_id).await;
        self.shared.commit_role(ticket, user_id, outcome.clone());
        match outcome {
            Ok(role) => role,
            Err(e) => {
                tracing::debug!("role refresh failed: {}", e);
                None
            }
        }
    }

    /// Tears the controller down: the listener is deregistered, pending
    /// resolutions no longer commit and nothing is left loading.
    pub async fn shutdown(&self) {
        {
            let _sequence = self.shared.sequence.lock();
            self.shared.closed.store(true, Ordering::Release);
            self.shared.state.send_modify(|state| {
                state.session_loading = false;
                state.role_loading = false;
            });
        }
        let tasks: Vec<_> = self.shared.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        tracing::debug!("auth controller torn down");
    }
}

async fn listen(shared: Weak<Shared>, mut subscription: SessionSubscription) {
    while let Some(change) = subscription.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        tracing::debug!(event = ?change.event, "session changed");
        shared.apply_session(change.session, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::session::AuthChangeEvent,
        testing::{session_for, FakeRemote},
    };

    fn mount(remote: &Arc<FakeRemote>) -> AuthController {
        AuthController::mount(remote.clone())
    }

    #[tokio::test]
    async fn starts_loading_then_signed_out() {
        let remote = FakeRemote::new();
        let controller = mount(&remote);
        assert!(controller.snapshot().session_loading);

        let state = controller.settled().await.unwrap();
        assert!(!state.session_loading);
        assert!(state.session.is_none());
        assert_eq!(state.role, None);
        assert_eq!(state.role_error, None);
        assert_eq!(remote.role_queries(), 0);
    }

    #[tokio::test]
    async fn restored_session_resolves_role() {
        let remote = FakeRemote::new();
        let user = Uuid::new_v4();
        remote.restore_session(user, "admin@example.com");
        remote.set_role(user, Some("admin"));

        let controller = mount(&remote);
        let state = controller.settled().await.unwrap();
        assert_eq!(state.user_id(), Some(user));
        assert_eq!(state.role, Some(Role::Admin));
        assert_eq!(state.role_error, None);
        assert_eq!(state.status().status, "signed-in");
    }

    #[tokio::test(start_paused = true)]
    async fn no_role_lookup_while_session_pending() {
        let remote = FakeRemote::new();
        let user = Uuid::new_v4();
        remote.restore_session(user, "m@example.com");
        remote.set_role(user, Some("member"));
        remote.set_session_delay(Duration::from_secs(3));

        let controller = mount(&remote);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let state = controller.snapshot();
        assert!(state.session_loading);
        assert!(!state.role_loading);
        assert_eq!(remote.role_queries(), 0);

        let state = controller.settled().await.unwrap();
        assert_eq!(state.role, Some(Role::Member));
        assert_eq!(remote.role_queries(), 1);
    }

    #[tokio::test]
    async fn session_loading_stays_false_across_changes() {
        let remote = FakeRemote::new();
        let user = Uuid::new_v4();
        remote.add_account("m@example.com", "password123", user);
        remote.set_role(user, Some("member"));

        let controller = mount(&remote);
        controller.settled().await.unwrap();

        controller
            .sign_in(&Credentials::new("m@example.com", "password123"))
            .await
            .unwrap();
        let signed_in = controller
            .wait_for(|s| s.session.is_some())
            .await
            .unwrap();
        assert!(!signed_in.session_loading);

        controller.sign_out().await.unwrap();
        let signed_out = controller
            .wait_for(|s| s.session.is_none())
            .await
            .unwrap();
        assert!(!signed_out.session_loading);
        assert_eq!(signed_out.status().status, "signed-out");
    }

    #[tokio::test(start_paused = true)]
    async fn role_timeout_is_recorded() {
        let remote = FakeRemote::new();
        let user = Uuid::new_v4();
        remote.restore_session(user, "slow@example.com");
        remote.set_role(user, Some("admin"));
        remote.set_role_delay(Duration::from_secs(30));

        let controller = mount(&remote);
        let state = controller.settled().await.unwrap();
        assert_eq!(state.role, None);
        assert_eq!(state.role_error, Some(RoleError::Timeout));

        // The late lookup never lands.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(controller.snapshot().role, None);
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_latest_resolution_commits() {
        let remote = FakeRemote::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        remote.set_role(first, Some("admin"));
        remote.set_user_role_delay(first, Duration::from_secs(5));
        remote.set_role(second, Some("member"));
        remote.set_user_role_delay(second, Duration::from_secs(1));

        let controller = mount(&remote);
        controller.settled().await.unwrap();

        remote.emit(AuthChangeEvent::SignedIn, Some(session_for(first, "a@example.com")));
        controller.wait_for(|s| s.user_id() == Some(first)).await.unwrap();
        remote.emit(AuthChangeEvent::SignedIn, Some(session_for(second, "b@example.com")));

        let state = controller
            .wait_for(|s| s.user_id() == Some(second) && !s.role_loading)
            .await
            .unwrap();
        assert_eq!(state.role, Some(Role::Member));

        // The slower, older lookup completes later and must be ignored.
        tokio::time::sleep(Duration::from_secs(10)).await;
        let state = controller.snapshot();
        assert_eq!(state.user_id(), Some(second));
        assert_eq!(state.role, Some(Role::Member));
    }

    #[tokio::test(start_paused = true)]
    async fn change_event_beats_a_slow_initial_fetch() {
        let remote = FakeRemote::new();
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        remote.restore_session(stale, "old@example.com");
        remote.set_role(stale, Some("admin"));
        remote.set_role(fresh, Some("member"));
        remote.set_session_delay(Duration::from_secs(5));

        let controller = mount(&remote);
        tokio::task::yield_now().await;
        remote.emit(AuthChangeEvent::SignedIn, Some(session_for(fresh, "new@example.com")));

        controller
            .wait_for(|s| s.user_id() == Some(fresh) && !s.role_loading)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let state = controller.snapshot();
        assert_eq!(state.user_id(), Some(fresh));
        assert_eq!(state.role, Some(Role::Member));
    }

    #[tokio::test]
    async fn sign_out_clears_role() {
        let remote = FakeRemote::new();
        let user = Uuid::new_v4();
        remote.restore_session(user, "a@example.com");
        remote.set_role(user, Some("admin"));

        let controller = mount(&remote);
        controller.wait_for(|s| s.role == Some(Role::Admin)).await.unwrap();

        controller.sign_out().await.unwrap();
        let state = controller.wait_for(|s| s.session.is_none()).await.unwrap();
        assert_eq!(state.role, None);
        assert_eq!(state.role_error, None);
        assert!(!state.role_loading);
    }

    #[tokio::test]
    async fn sign_in_errors_are_returned_unchanged() {
        let remote = FakeRemote::new();
        let controller = mount(&remote);
        controller.settled().await.unwrap();

        let err = controller
            .sign_in(&Credentials::new("nobody@example.com", "password123"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Authentication failed: Invalid login credentials");
        assert!(controller.snapshot().session.is_none());
    }

    #[tokio::test]
    async fn sign_up_signs_the_new_user_in() {
        let remote = FakeRemote::new();
        let controller = mount(&remote);
        controller.settled().await.unwrap();

        let session = controller
            .sign_up(&Credentials::new("new@example.com", "password123"))
            .await
            .unwrap();
        let state = controller
            .wait_for(|s| s.session.is_some() && !s.role_loading)
            .await
            .unwrap();
        assert_eq!(state.user_id(), Some(session.user_id()));
        // No profile row yet: the lookup fails and the user has no role.
        assert_eq!(state.role, None);
        assert!(matches!(state.role_error, Some(RoleError::Lookup(_))));
    }

    #[tokio::test]
    async fn refresh_role_without_session_is_missing_id() {
        let remote = FakeRemote::new();
        let controller = mount(&remote);
        controller.settled().await.unwrap();

        assert_eq!(controller.refresh_role().await, None);
        let state = controller.snapshot();
        assert_eq!(state.role_error, Some(RoleError::MissingId));
        assert_eq!(state.role_error.unwrap().to_string(), "missing id");
        assert_eq!(remote.role_queries(), 0);
    }

    #[tokio::test]
    async fn refresh_role_is_idempotent() {
        let remote = FakeRemote::new();
        let user = Uuid::new_v4();
        remote.restore_session(user, "m@example.com");
        remote.set_role(user, Some("member"));

        let controller = mount(&remote);
        controller.settled().await.unwrap();

        for _ in 0..3 {
            assert_eq!(controller.refresh_role().await, Some(Role::Member));
            assert_eq!(controller.snapshot().role, Some(Role::Member));
        }
    }

    #[tokio::test]
    async fn refresh_picks_up_a_changed_role() {
        let remote = FakeRemote::new();
        let user = Uuid::new_v4();
        remote.restore_session(user, "m@example.com");
        remote.fail_role(user, "connection reset");

        let controller = mount(&remote);
        let state = controller.settled().await.unwrap();
        assert!(matches!(state.role_error, Some(RoleError::Lookup(_))));

        remote.set_role(user, Some("admin"));
        assert_eq!(controller.refresh_role().await, Some(Role::Admin));
        let state = controller.snapshot();
        assert_eq!(state.role, Some(Role::Admin));
        assert_eq!(state.role_error, None);
    }

    #[tokio::test]
    async fn shutdown_deregisters_the_listener() {
        let remote = FakeRemote::new();
        let controller = mount(&remote);
        controller.settled().await.unwrap();
        assert_eq!(remote.listener_count(), 1);

        controller.shutdown().await;
        assert_eq!(remote.listener_count(), 0);

        // A remount registers exactly one fresh listener.
        let remounted = mount(&remote);
        remounted.settled().await.unwrap();
        assert_eq!(remote.listener_count(), 1);
    }

    #[tokio::test]
    async fn dropping_the_last_handle_deregisters_the_listener() {
        let remote = FakeRemote::new();
        let controller = mount(&remote);
        controller.settled().await.unwrap();
        drop(controller);

        for _ in 0..10 {
            if remote.listener_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(remote.listener_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn refresh_racing_a_session_change_never_keeps_the_old_role() {
        for _ in 0..200 {
            let remote = FakeRemote::new();
            let admin = Uuid::new_v4();
            let member = Uuid::new_v4();
            remote.restore_session(admin, "a@example.com");
            remote.set_role(admin, Some("admin"));
            remote.set_role(member, Some("member"));

            let controller = mount(&remote);
            controller.wait_for(|s| s.role == Some(Role::Admin)).await.unwrap();

            let refreshing = tokio::spawn({
                let controller = controller.clone();
                async move { controller.refresh_role().await }
            });
            let switching = tokio::spawn({
                let remote = remote.clone();
                async move {
                    remote.emit(
                        AuthChangeEvent::SignedIn,
                        Some(session_for(member, "m@example.com")),
                    )
                }
            });
            refreshing.await.unwrap();
            switching.await.unwrap();

            let state = controller
                .wait_for(|s| s.user_id() == Some(member) && !s.role_loading)
                .await
                .unwrap();
            assert_eq!(state.role, Some(Role::Member));
            controller.shutdown().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_resolution_releases_waiters() {
        let remote = FakeRemote::new();
        let user = Uuid::new_v4();
        remote.restore_session(user, "a@example.com");
        remote.set_role(user, Some("admin"));
        remote.set_role_delay(Duration::from_secs(30));

        let controller = mount(&remote);
        controller.wait_for(|s| s.role_loading).await.unwrap();
        let waiter = tokio::spawn({
            let controller = controller.clone();
            async move { controller.settled().await }
        });
        tokio::task::yield_now().await;

        controller.shutdown().await;
        let state = waiter.await.unwrap().unwrap();
        assert!(!state.role_loading);
        assert_eq!(state.role, None);

        // The abandoned lookup does not land later either.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(controller.snapshot().role, None);
    }
}
