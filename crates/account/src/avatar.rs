//! Avatar file naming and address helpers.

use merx_shared::constants::CACHE_BUST_PARAM;
use reqwest::Url;

/// An image picked by the user, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl AvatarFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.file_name)
    }
}

fn extension_of(file_name: &str) -> Option<&str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

/// Fresh storage name for an uploaded avatar: `<unix-millis>_<random>.<ext>`.
///
/// The extension of `original` is kept when it is plain ASCII alphanumeric;
/// otherwise the name gets none.
pub fn generate_avatar_name(original: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce: u64 = rand::random();
    match extension_of(original) {
        Some(ext) => format!("{millis}_{nonce}.{ext}"),
        None => format!("{millis}_{nonce}"),
    }
}

/// Storage name referenced by an avatar address.
///
/// Absolute URLs yield their last path segment; anything else is treated as a
/// plain path. Query strings and fragments are ignored.
pub fn file_name_from_address(address: &str) -> Option<String> {
    if let Ok(url) = Url::parse(address) {
        return url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
    }

    let path = address
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Appends a cache-busting token so clients refetch a replaced image.
pub fn with_cache_bust(address: &str, token: i64) -> String {
    let separator = if address.contains('?') { '&' } else { '?' };
    format!("{address}{separator}{CACHE_BUST_PARAM}={token}")
}
