//! In-process account backend.
//!
//! Behaves like the hosted service for the parts the client relies on:
//! password sign-in, session notifications, the `profiles` table with its
//! unique username constraint, and row-level checks that only the signed-in
//! user may update their own row. Used by tests and offline runs.

use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use merx_shared::api::auth::{Identity, SessionEvent};
use merx_shared::api::profile::{Profile, ProfileUpdate};
use merx_shared::ids::UserId;
use tokio::sync::{broadcast, oneshot};

use crate::backend::AccountBackend;
use crate::error::AccountError;

const SESSION_EVENT_CAPACITY: usize = 64;

struct Account {
    identity: Identity,
    password: String,
}

struct UpdateGate {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

pub struct MemoryBackend {
    accounts: DashMap<String, Account>,
    profiles: DashMap<UserId, Profile>,
    session: Mutex<Option<Identity>>,
    events: broadcast::Sender<SessionEvent>,
    fail_session_lookup: Mutex<bool>,
    update_gate: Mutex<Option<UpdateGate>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            accounts: DashMap::new(),
            profiles: DashMap::new(),
            session: Mutex::new(None),
            events,
            fail_session_lookup: Mutex::new(false),
            update_gate: Mutex::new(None),
        }
    }

    /// Register an account together with its (empty) profile row.
    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        let identity = Identity {
            id: UserId::new(),
            email: email.to_string(),
        };
        self.accounts.insert(
            email.to_string(),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        self.profiles.insert(identity.id, Profile::empty(identity.id));
        identity
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn remove_profile(&self, id: UserId) {
        self.profiles.remove(&id);
    }

    pub fn profile(&self, id: UserId) -> Option<Profile> {
        self.profiles.get(&id).map(|p| p.clone())
    }

    /// Re-issue the current session's token, as the hosted service does on expiry.
    pub fn refresh_session(&self) -> Option<Identity> {
        let identity = self.lock_session().clone()?;
        let _ = self
            .events
            .send(SessionEvent::token_refreshed(identity.clone()));
        Some(identity)
    }

    /// Make [`AccountBackend::current_session`] fail until reset.
    pub fn fail_session_lookup(&self, fail: bool) {
        *lock(&self.fail_session_lookup) = fail;
    }

    /// Pause the next profile update once it has passed its auth check.
    ///
    /// Returns a receiver that fires when the update is parked and a sender
    /// that lets it continue.
    pub fn hold_next_update(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *lock(&self.update_gate) = Some(UpdateGate {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Identity>> {
        lock(&self.session)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait::async_trait]
impl AccountBackend for MemoryBackend {
    async fn current_session(&self) -> Result<Option<Identity>, AccountError> {
        if *lock(&self.fail_session_lookup) {
            return Err(AccountError::Remote("session lookup unavailable".into()));
        }
        Ok(self.lock_session().clone())
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AccountError> {
        let identity = match self.accounts.get(email) {
            Some(account) if account.password == password => account.identity.clone(),
            _ => return Err(AccountError::Unauthenticated),
        };
        *self.lock_session() = Some(identity.clone());
        self.emit(SessionEvent::signed_in(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AccountError> {
        self.lock_session().take();
        self.emit(SessionEvent::signed_out());
        Ok(())
    }

    async fn get_profile(&self, id: UserId) -> Result<Profile, AccountError> {
        self.profile(id).ok_or(AccountError::NotFound)
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<(), AccountError> {
        if self.lock_session().as_ref().map(|i| i.id) != Some(id) {
            return Err(AccountError::Unauthenticated);
        }

        let gate = lock(&self.update_gate).take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.await;
        }

        if let Some(username) = update.username.as_deref().filter(|u| !u.is_empty()) {
            let taken = self
                .profiles
                .iter()
                .any(|p| p.id != id && p.username.as_deref() == Some(username));
            if taken {
                return Err(AccountError::DuplicateUsername);
            }
        }

        let mut row = self.profiles.get_mut(&id).ok_or(AccountError::NotFound)?;
        row.apply(update);
        Ok(())
    }

    async fn username_taken(&self, username: &str, except: UserId) -> Result<bool, AccountError> {
        Ok(self
            .profiles
            .iter()
            .any(|p| p.id != except && p.username.as_deref() == Some(username)))
    }
}
