use merx_account::storage::AvatarStoreConfig;
use merx_shared::constants::AVATAR_BUCKET;
use serde::Deserialize;

/// Client configuration loaded from merx.toml with env var overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the hosted account service. Empty runs against an
    /// in-process backend.
    #[serde(default)]
    pub backend_url: String,
    /// Project API key sent with every request.
    #[serde(default)]
    pub api_key: String,
    /// Bucket holding avatar images. Default: "avatars"
    #[serde(default = "default_avatar_bucket")]
    pub avatar_bucket: String,
    /// Per-request timeout. Default: 15
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Append `?v=<millis>` to newly uploaded avatar addresses.
    #[serde(default)]
    pub cache_bust_avatars: bool,
    /// Tracing log level. Default: "info"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub storage: AvatarStoreConfig,
}

fn default_avatar_bucket() -> String {
    AVATAR_BUCKET.to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            api_key: String::new(),
            avatar_bucket: default_avatar_bucket(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_bust_avatars: false,
            log_level: default_log_level(),
            storage: AvatarStoreConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from TOML file with environment variable overrides.
    ///
    /// Reads `merx.toml` from CWD (or path in `CONFIG_PATH` env var). A missing
    /// file means all defaults; env overrides still apply.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "merx.toml".to_string());
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(format!("cannot read {path}: {e}").into()),
        };
        Self::from_toml_str(&contents)
    }

    /// Load configuration from a TOML string, then apply env var overrides.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config: ClientConfig = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the config.
    ///
    /// Returns an error if an env var is set but has an invalid format
    /// (e.g., MERX_REQUEST_TIMEOUT_SECS=abc).
    pub fn apply_env_overrides(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Ok(val) = std::env::var("MERX_BACKEND_URL") {
            self.backend_url = val;
        }
        if let Ok(val) = std::env::var("MERX_API_KEY") {
            self.api_key = val;
        }
        if let Ok(val) = std::env::var("MERX_AVATAR_BUCKET") {
            self.avatar_bucket = val;
        }
        if let Ok(val) = std::env::var("MERX_STORAGE_BACKEND") {
            self.storage.backend = val;
        }
        if let Ok(val) = std::env::var("MERX_STORAGE_LOCAL_PATH") {
            self.storage.local_path = val;
        }
        if let Ok(val) = std::env::var("MERX_PUBLIC_BASE_URL") {
            self.storage.public_base_url = val;
        }
        if let Ok(val) = std::env::var("MERX_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = val
                .parse()
                .map_err(|_| format!("invalid MERX_REQUEST_TIMEOUT_SECS value: {val}"))?;
        }
        if let Ok(val) = std::env::var("LOG_LEVEL") {
            self.log_level = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".into());
        }
        if !matches!(self.storage.backend.as_str(), "remote" | "local" | "memory") {
            return Err(format!("unknown storage backend: {}", self.storage.backend).into());
        }
        if self.storage.is_remote() && self.backend_url.is_empty() {
            return Err("remote avatar storage requires backend_url".into());
        }
        Ok(())
    }

    /// Whether the hosted service is configured.
    pub fn is_online(&self) -> bool {
        !self.backend_url.is_empty()
    }
}
