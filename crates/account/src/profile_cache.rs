//! Per-view cache of the signed-in user's profile.
//!
//! Loads are split into [`ProfileCache::begin`], which issues a ticket tagged
//! with the session generation, and [`ProfileCache::complete`], which applies
//! the result only if that ticket is still current. A response that arrives
//! after the identity changed is dropped instead of overwriting newer state.

use merx_shared::api::auth::Identity;
use merx_shared::api::profile::Profile;
use merx_shared::ids::UserId;

use crate::backend::AccountBackend;
use crate::error::AccountError;
use crate::session::{SessionSnapshot, SessionStore};

/// Tag attached to one outstanding profile request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileTicket {
    pub generation: u64,
    pub user_id: UserId,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct ProfileCache {
    profile: Option<Profile>,
    pending: Option<ProfileTicket>,
    issued: u64,
    loaded_generation: Option<u64>,
    last_error: Option<AccountError>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Non-fatal error from the most recent load.
    pub fn last_error(&self) -> Option<&AccountError> {
        self.last_error.as_ref()
    }

    /// Session generation the cached state belongs to.
    pub fn loaded_generation(&self) -> Option<u64> {
        self.loaded_generation
    }

    pub fn clear(&mut self, generation: u64) {
        self.profile = None;
        self.pending = None;
        self.last_error = None;
        self.loaded_generation = Some(generation);
    }

    /// Start a load for the snapshot's identity.
    ///
    /// Clears the cache and returns `None` when nobody is signed in. Any
    /// profile belonging to a different user is dropped right away.
    pub fn begin(&mut self, snapshot: &SessionSnapshot) -> Option<ProfileTicket> {
        let Some(user_id) = snapshot.user_id() else {
            self.clear(snapshot.generation);
            return None;
        };

        if self.profile.as_ref().is_some_and(|p| p.id != user_id) {
            self.profile = None;
        }

        self.issued += 1;
        let ticket = ProfileTicket {
            generation: snapshot.generation,
            user_id,
            seq: self.issued,
        };
        self.pending = Some(ticket);
        Some(ticket)
    }

    /// Apply a finished load. Returns `false` if the result was discarded.
    pub fn complete(
        &mut self,
        ticket: ProfileTicket,
        result: Result<Profile, AccountError>,
        current: &SessionSnapshot,
    ) -> bool {
        if self.pending != Some(ticket) {
            tracing::debug!(user_id = %ticket.user_id, "discarding superseded profile response");
            return false;
        }
        self.pending = None;

        if !current.holds(ticket.user_id, ticket.generation) {
            tracing::debug!(user_id = %ticket.user_id, "discarding profile response for previous session");
            return false;
        }

        match result {
            Ok(profile) if profile.id == ticket.user_id => {
                self.profile = Some(profile);
                self.last_error = None;
            }
            Ok(profile) => {
                tracing::warn!(
                    expected = %ticket.user_id,
                    received = %profile.id,
                    "profile response for a different user"
                );
                self.profile = None;
                self.last_error = Some(AccountError::Remote(
                    "profile response for a different user".into(),
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id = %ticket.user_id, "error fetching profile");
                self.profile = None;
                self.last_error = Some(e);
            }
        }
        self.loaded_generation = Some(ticket.generation);
        true
    }

    /// Load the profile for the store's current identity.
    pub async fn load(&mut self, backend: &dyn AccountBackend, session: &SessionStore) -> bool {
        let Some(ticket) = self.begin(&session.current()) else {
            return false;
        };
        let result = backend.get_profile(ticket.user_id).await;
        self.complete(ticket, result, &session.current())
    }

    /// Header label: full name, then username, then the identity's email.
    pub fn display_name(&self, identity: Option<&Identity>) -> String {
        let email = identity.map(|i| i.email.as_str()).unwrap_or_default();
        match (&self.profile, identity) {
            (Some(profile), Some(identity)) if profile.id == identity.id => {
                profile.display_name(email).to_string()
            }
            _ => email.to_string(),
        }
    }
}
