//! Process-wide session state.
//!
//! [`SessionStore`] holds the current identity on a `watch` channel. The only
//! writer is [`SessionStore::apply`] (driven by the [`SessionFeed`] task that
//! follows the backend's notifications) plus the one-off
//! [`SessionStore::initialize`]. Views read it through cheap snapshots or hold
//! a [`SessionSubscription`] for as long as they are alive.

use std::sync::Arc;

use merx_shared::api::auth::{Identity, SessionEvent};
use merx_shared::ids::UserId;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::backend::AccountBackend;

/// Point-in-time view of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    /// Bumped whenever the identity id changes, including to and from none.
    pub generation: u64,
    /// Number of writes applied to the store.
    pub revision: u64,
    /// Set once the backend's session state is known.
    pub initialized: bool,
}

impl SessionSnapshot {
    pub fn user_id(&self) -> Option<UserId> {
        self.identity.as_ref().map(|i| i.id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// True while `user_id` is still signed in within `generation`.
    pub fn holds(&self, user_id: UserId, generation: u64) -> bool {
        self.generation == generation && self.user_id() == Some(user_id)
    }
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    sender: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(SessionSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Query the backend once for the current session.
    ///
    /// A failed query leaves the store signed out. If an event was applied
    /// while the query was in flight, the event wins.
    pub async fn initialize(&self, backend: &dyn AccountBackend) -> SessionSnapshot {
        let started_at = self.sender.borrow().revision;

        let identity = match backend.current_session().await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch current session; treating as signed out");
                None
            }
        };

        self.sender.send_if_modified(|snapshot| {
            if snapshot.revision != started_at {
                tracing::debug!("session changed during initialization; keeping newer state");
                snapshot.initialized = true;
                return false;
            }
            write_identity(snapshot, identity);
            true
        });
        self.current()
    }

    /// Apply one session transition.
    pub fn apply(&self, event: SessionEvent) -> SessionSnapshot {
        tracing::debug!(
            kind = ?event.kind,
            user_id = ?event.identity.as_ref().map(|i| i.id),
            "session event"
        );
        self.sender
            .send_modify(|snapshot| write_identity(snapshot, event.identity));
        self.current()
    }

    pub fn current(&self) -> SessionSnapshot {
        self.sender.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.sender.borrow().identity.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.sender.borrow().is_authenticated()
    }

    /// Register for every subsequent transition. Dropping the subscription
    /// unregisters it.
    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Follow the backend's session notifications until the feed is disposed.
    ///
    /// Call before [`SessionStore::initialize`] so no transition is missed.
    pub fn connect(&self, backend: &dyn AccountBackend) -> SessionFeed {
        let mut events = backend.session_events();
        let store = self.clone();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        store.apply(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "session feed lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("session event stream closed");
                        break;
                    }
                }
            }
        });
        SessionFeed { task }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_identity(snapshot: &mut SessionSnapshot, identity: Option<Identity>) {
    let previous = snapshot.user_id();
    let next = identity.as_ref().map(|i| i.id);
    if previous != next {
        snapshot.generation += 1;
    }
    snapshot.identity = identity;
    snapshot.revision += 1;
    snapshot.initialized = true;
}

/// A view's registration with the [`SessionStore`].
#[derive(Debug)]
pub struct SessionSubscription {
    receiver: watch::Receiver<SessionSnapshot>,
}

impl SessionSubscription {
    pub fn current(&self) -> SessionSnapshot {
        self.receiver.borrow().clone()
    }

    /// Latest snapshot, marking it as seen so [`Self::changed`] waits for the
    /// next transition.
    pub fn latest(&mut self) -> SessionSnapshot {
        self.receiver.borrow_and_update().clone()
    }

    /// Wait for the next transition. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<SessionSnapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Unregister from the store.
    pub fn cancel(self) {}
}

/// Background task applying backend session events to a store.
#[derive(Debug)]
pub struct SessionFeed {
    task: JoinHandle<()>,
}

impl SessionFeed {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop following the backend.
    pub fn dispose(self) {}
}

impl Drop for SessionFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use merx_shared::api::auth::SessionEventKind;

    fn identity(email: &str) -> Identity {
        Identity {
            id: UserId::new(),
            email: email.into(),
        }
    }

    #[test]
    fn new_store_is_signed_out_and_uninitialized() {
        let store = SessionStore::new();
        let snapshot = store.current();
        assert!(snapshot.identity.is_none());
        assert!(!snapshot.initialized);
        assert_eq!(snapshot.generation, 0);
    }

    #[test]
    fn apply_tracks_latest_event() {
        let store = SessionStore::new();
        let ana = identity("ana@example.com");
        let bia = identity("bia@example.com");

        let events = vec![
            SessionEvent::signed_in(ana.clone()),
            SessionEvent::token_refreshed(ana.clone()),
            SessionEvent::signed_out(),
            SessionEvent::signed_in(bia.clone()),
            SessionEvent::signed_out(),
            SessionEvent::signed_in(ana.clone()),
        ];
        for event in events {
            let expected = event.identity.clone();
            store.apply(event);
            assert_eq!(store.identity(), expected);
        }
    }

    #[test]
    fn token_refresh_keeps_generation() {
        let store = SessionStore::new();
        let ana = identity("ana@example.com");
        let signed_in = store.apply(SessionEvent::signed_in(ana.clone()));
        let refreshed = store.apply(SessionEvent::token_refreshed(ana));
        assert_eq!(signed_in.generation, refreshed.generation);
        assert!(refreshed.revision > signed_in.revision);
    }

    #[test]
    fn identity_change_bumps_generation() {
        let store = SessionStore::new();
        let first = store.apply(SessionEvent::signed_in(identity("ana@example.com")));
        let second = store.apply(SessionEvent::signed_in(identity("bia@example.com")));
        let third = store.apply(SessionEvent::signed_out());
        assert!(first.generation < second.generation);
        assert!(second.generation < third.generation);
    }

    #[test]
    fn holds_requires_same_user_and_generation() {
        let store = SessionStore::new();
        let ana = identity("ana@example.com");
        let snapshot = store.apply(SessionEvent::signed_in(ana.clone()));
        assert!(snapshot.holds(ana.id, snapshot.generation));
        assert!(!snapshot.holds(ana.id, snapshot.generation + 1));
        assert!(!snapshot.holds(UserId::new(), snapshot.generation));
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let store = SessionStore::new();
        let a = store.subscribe();
        let b = store.subscribe();
        assert_eq!(store.subscriber_count(), 2);
        a.cancel();
        assert_eq!(store.subscriber_count(), 1);
        drop(b);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscription_sees_transition() {
        let store = SessionStore::new();
        let mut sub = store.subscribe();
        let ana = identity("ana@example.com");
        store.apply(SessionEvent::signed_in(ana.clone()));
        let snapshot = sub.changed().await.unwrap();
        assert_eq!(snapshot.identity, Some(ana));
    }

    #[tokio::test]
    async fn initialize_uses_backend_session() {
        let backend = MemoryBackend::new();
        let ana = backend.add_account("ana@example.com", "secret");
        backend.sign_in_with_password("ana@example.com", "secret").await.unwrap();

        let store = SessionStore::new();
        let snapshot = store.initialize(&backend).await;
        assert!(snapshot.initialized);
        assert_eq!(snapshot.identity, Some(ana));
    }

    #[tokio::test]
    async fn initialize_failure_fails_open_to_signed_out() {
        let backend = MemoryBackend::new();
        backend.add_account("ana@example.com", "secret");
        backend.sign_in_with_password("ana@example.com", "secret").await.unwrap();
        backend.fail_session_lookup(true);

        let store = SessionStore::new();
        let snapshot = store.initialize(&backend).await;
        assert!(snapshot.initialized);
        assert!(snapshot.identity.is_none());
    }

    #[tokio::test]
    async fn feed_applies_backend_events() {
        let backend = MemoryBackend::new();
        let ana = backend.add_account("ana@example.com", "secret");
        let store = SessionStore::new();
        let _feed = store.connect(&backend);
        let mut sub = store.subscribe();

        backend.sign_in_with_password("ana@example.com", "secret").await.unwrap();
        let snapshot = sub.changed().await.unwrap();
        assert_eq!(snapshot.identity, Some(ana));

        backend.sign_out().await.unwrap();
        let snapshot = sub.changed().await.unwrap();
        assert!(snapshot.identity.is_none());
    }

    #[tokio::test]
    async fn disposed_feed_stops_applying() {
        let backend = MemoryBackend::new();
        backend.add_account("ana@example.com", "secret");
        let store = SessionStore::new();
        let feed = store.connect(&backend);
        feed.dispose();
        tokio::task::yield_now().await;

        backend.sign_in_with_password("ana@example.com", "secret").await.unwrap();
        tokio::task::yield_now().await;
        assert!(store.identity().is_none());
    }

    #[test]
    fn event_kind_is_logged_not_stored() {
        let store = SessionStore::new();
        let event = SessionEvent {
            kind: SessionEventKind::UserUpdated,
            identity: Some(identity("ana@example.com")),
        };
        let snapshot = store.apply(event.clone());
        assert_eq!(snapshot.identity, event.identity);
    }
}
