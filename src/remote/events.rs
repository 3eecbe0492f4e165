use tokio::sync::broadcast;

use crate::models::session::SessionChange;

const CHANNEL_CAPACITY: usize = 32;

/// Fan-out of auth-state changes to registered listeners.
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionChange>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Registers a new listener.
    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Delivers a change to every listener. Having no listeners is fine.
    pub fn emit(&self, change: SessionChange) {
        tracing::debug!(event = ?change.event, listeners = self.sender.receiver_count(), "auth state changed");
        let _ = self.sender.send(change);
    }

    /// The number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered auth-state listener.
pub struct SessionSubscription {
    receiver: broadcast::Receiver<SessionChange>,
}

impl SessionSubscription {
    /// Waits for the next change. Returns `None` once the source is gone.
    ///
    /// A listener that fell behind skips to the newest changes; only the
    /// latest session matters to consumers.
    pub async fn recv(&mut self) -> Option<SessionChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("session listener lagged, skipped {} changes", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Deregisters the listener.
    pub fn unsubscribe(self) {}
}
