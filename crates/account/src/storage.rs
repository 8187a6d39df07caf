use std::sync::Arc;

use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use serde::Deserialize;

use crate::backend::AvatarStorage;
use crate::error::AccountError;

/// Where avatar bytes are kept.
///
/// `"remote"` stores them in the hosted bucket through the HTTP backend;
/// `"local"` and `"memory"` go through [`ObjectStoreAvatars`].
#[derive(Debug, Clone, Deserialize)]
pub struct AvatarStoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_local_path")]
    pub local_path: String,
    /// Prefix of the addresses handed out for stored avatars. Empty means
    /// "derive from the backend URL".
    #[serde(default)]
    pub public_base_url: String,
}

fn default_backend() -> String {
    "remote".into()
}

fn default_local_path() -> String {
    "./data/avatars".into()
}

impl Default for AvatarStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local_path: default_local_path(),
            public_base_url: String::new(),
        }
    }
}

impl AvatarStoreConfig {
    pub fn is_remote(&self) -> bool {
        self.backend == "remote"
    }
}

/// Creates an ObjectStore for the non-remote avatar backends.
///
/// - `"local"`: creates the directory if needed, uses `LocalFileSystem`
/// - `"memory"`: uses `InMemory`
pub fn create_object_store(
    config: &AvatarStoreConfig,
) -> Result<Arc<dyn ObjectStore>, AccountError> {
    match config.backend.as_str() {
        "local" => {
            std::fs::create_dir_all(&config.local_path).map_err(|e| {
                AccountError::Config(format!(
                    "cannot create avatar directory {}: {e}",
                    config.local_path
                ))
            })?;
            let store = LocalFileSystem::new_with_prefix(&config.local_path)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "remote" => Err(AccountError::Config(
            "remote avatar storage is served by the HTTP backend".into(),
        )),
        other => Err(AccountError::Config(format!(
            "unknown avatar storage backend: {other}"
        ))),
    }
}

/// Avatar bucket backed by an [`ObjectStore`].
pub struct ObjectStoreAvatars {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl ObjectStoreAvatars {
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            store,
            public_base_url,
        }
    }

    pub fn in_memory(public_base_url: impl Into<String>) -> Self {
        Self::new(Arc::new(InMemory::new()), public_base_url)
    }

    pub fn from_config(config: &AvatarStoreConfig) -> Result<Self, AccountError> {
        let store = create_object_store(config)?;
        Ok(Self::new(store, config.public_base_url.clone()))
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Whether an asset with this name is currently stored.
    pub async fn contains(&self, name: &str) -> Result<bool, AccountError> {
        match self.store.head(&Path::from(name)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl AvatarStorage for ObjectStoreAvatars {
    async fn upload_asset(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), AccountError> {
        tracing::debug!(name, content_type, size = bytes.len(), "storing avatar");
        self.store
            .put(&Path::from(name), PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    async fn delete_asset(&self, name: &str) -> Result<(), AccountError> {
        match self.store.delete(&Path::from(name)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn public_address_of(&self, name: &str) -> String {
        format!("{}/{name}", self.public_base_url)
    }
}
