use std::sync::Arc;
use std::time::Duration;

use merx_account::backend::{AccountBackend, AvatarStorage};
use merx_account::editor::{EditorOptions, ProfileEditor};
use merx_account::error::AccountError;
use merx_account::header::IdentityDisplay;
use merx_account::http::HttpBackend;
use merx_account::memory::MemoryBackend;
use merx_account::session::{SessionFeed, SessionSnapshot, SessionStore};
use merx_account::storage::ObjectStoreAvatars;

use crate::config::ClientConfig;
use crate::marketplace::MarketplaceSelector;
use crate::product::ProductForm;

/// Wiring shared by every view: one session store fed by one backend.
pub struct App {
    config: ClientConfig,
    session: SessionStore,
    backend: Arc<dyn AccountBackend>,
    avatars: Arc<dyn AvatarStorage>,
    feed: SessionFeed,
}

impl App {
    /// Build the backends described by `config` and load the current session.
    pub async fn start(config: ClientConfig) -> Result<Self, AccountError> {
        let (backend, avatars) = build_backends(&config)?;
        Ok(Self::with_backends(config, backend, avatars).await)
    }

    pub async fn with_backends(
        config: ClientConfig,
        backend: Arc<dyn AccountBackend>,
        avatars: Arc<dyn AvatarStorage>,
    ) -> Self {
        let session = SessionStore::new();
        let feed = session.connect(backend.as_ref());
        let snapshot = session.initialize(backend.as_ref()).await;
        tracing::info!(
            authenticated = snapshot.is_authenticated(),
            online = config.is_online(),
            "session initialized"
        );
        Self {
            config,
            session,
            backend,
            avatars,
            feed,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn backend(&self) -> &Arc<dyn AccountBackend> {
        &self.backend
    }

    /// Sign in and wait until the session store reflects the new identity.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionSnapshot, AccountError> {
        let mut subscription = self.session.subscribe();
        let identity = self.backend.sign_in_with_password(email, password).await?;

        let mut snapshot = subscription.current();
        while snapshot.user_id() != Some(identity.id) {
            snapshot = subscription
                .changed()
                .await
                .ok_or(AccountError::Unauthenticated)?;
        }
        Ok(snapshot)
    }

    pub async fn sign_out(&self) -> Result<(), AccountError> {
        self.backend.sign_out().await
    }

    pub fn header(&self) -> IdentityDisplay {
        IdentityDisplay::new(&self.session, self.backend.clone())
    }

    pub fn profile_editor(&self) -> ProfileEditor {
        ProfileEditor::new(self.session.clone(), self.backend.clone(), self.avatars.clone())
            .with_options(EditorOptions {
                cache_bust_avatars: self.config.cache_bust_avatars,
            })
    }

    pub fn marketplace_selector(&self) -> MarketplaceSelector {
        MarketplaceSelector::new(&self.session)
    }

    pub fn product_form(&self) -> ProductForm {
        ProductForm::new(&self.session)
    }

    /// Stop following backend session events.
    pub fn shutdown(self) {
        tracing::debug!(running = self.feed.is_running(), "shutting down session feed");
        self.feed.dispose();
    }
}

type Backends = (Arc<dyn AccountBackend>, Arc<dyn AvatarStorage>);

fn build_backends(config: &ClientConfig) -> Result<Backends, AccountError> {
    let mut storage = config.storage.clone();
    if storage.public_base_url.is_empty() {
        storage.public_base_url = storage.local_path.clone();
    }

    if !config.is_online() {
        if storage.is_remote() {
            return Err(AccountError::Config(
                "remote avatar storage requires backend_url".into(),
            ));
        }
        tracing::warn!("no backend_url configured; using in-process account backend");
        let backend: Arc<dyn AccountBackend> = Arc::new(MemoryBackend::new());
        let avatars: Arc<dyn AvatarStorage> = Arc::new(ObjectStoreAvatars::from_config(&storage)?);
        return Ok((backend, avatars));
    }

    let http = Arc::new(
        HttpBackend::new(
            &config.backend_url,
            &config.api_key,
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_bucket(&config.avatar_bucket),
    );
    let avatars: Arc<dyn AvatarStorage> = if storage.is_remote() {
        http.clone()
    } else {
        Arc::new(ObjectStoreAvatars::from_config(&storage)?)
    };
    let backend: Arc<dyn AccountBackend> = http;
    Ok((backend, avatars))
}
