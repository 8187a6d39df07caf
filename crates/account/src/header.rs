use std::sync::Arc;

use merx_shared::api::profile::Profile;

use crate::backend::AccountBackend;
use crate::profile_cache::ProfileCache;
use crate::session::{SessionStore, SessionSubscription};

/// What the header shows for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderView {
    /// Show the login action.
    LoggedOut,
    /// Signed in; the profile label is still being fetched.
    Loading,
    LoggedIn { display_name: String },
}

/// Identity display for the application header and profile menu.
pub struct IdentityDisplay {
    backend: Arc<dyn AccountBackend>,
    store: SessionStore,
    subscription: SessionSubscription,
    cache: ProfileCache,
    synced_generation: Option<u64>,
}

impl IdentityDisplay {
    pub fn new(store: &SessionStore, backend: Arc<dyn AccountBackend>) -> Self {
        Self {
            backend,
            store: store.clone(),
            subscription: store.subscribe(),
            cache: ProfileCache::new(),
            synced_generation: None,
        }
    }

    /// Bring the cached profile in line with the latest session.
    ///
    /// Loads at most once per identity change; token refreshes do not refetch.
    pub async fn sync(&mut self) {
        let snapshot = self.subscription.latest();
        if !snapshot.initialized || self.synced_generation == Some(snapshot.generation) {
            return;
        }
        self.synced_generation = Some(snapshot.generation);

        if snapshot.is_authenticated() {
            self.cache.load(self.backend.as_ref(), &self.store).await;
        } else {
            self.cache.clear(snapshot.generation);
        }
    }

    /// Wait for the next session transition and react to it.
    ///
    /// Returns `false` once the session store has been dropped.
    pub async fn next_change(&mut self) -> bool {
        if self.subscription.changed().await.is_none() {
            return false;
        }
        self.sync().await;
        true
    }

    pub fn view(&self) -> HeaderView {
        let snapshot = self.subscription.current();
        let Some(identity) = snapshot.identity.as_ref() else {
            return HeaderView::LoggedOut;
        };
        if self.cache.is_loading() || self.cache.loaded_generation() != Some(snapshot.generation) {
            return HeaderView::Loading;
        }
        HeaderView::LoggedIn {
            display_name: self.cache.display_name(Some(identity)),
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.cache.profile()
    }

    /// Sign out. Failures are logged; the session feed reports the outcome.
    pub async fn logout(&self) {
        if let Err(e) = self.backend.sign_out().await {
            tracing::error!(error = %e, "error signing out");
        }
    }
}
