//! Contracts for the remote account service.
//!
//! The service is split along the two halves the backend exposes: auth plus
//! the `profiles` table ([`AccountBackend`]) and the avatar bucket
//! ([`AvatarStorage`]). Both are object safe so views can hold them as
//! `Arc<dyn ...>`.

use merx_shared::api::auth::{Identity, SessionEvent};
use merx_shared::api::profile::{Profile, ProfileUpdate};
use merx_shared::ids::UserId;
use tokio::sync::broadcast;

use crate::error::AccountError;

#[async_trait::async_trait]
pub trait AccountBackend: Send + Sync {
    /// Identity of the current session, if any.
    async fn current_session(&self) -> Result<Option<Identity>, AccountError>;

    /// Stream of session transitions. Dropping the receiver unsubscribes.
    fn session_events(&self) -> broadcast::Receiver<SessionEvent>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AccountError>;

    async fn sign_out(&self) -> Result<(), AccountError>;

    /// Single-row lookup; a missing row is [`AccountError::NotFound`].
    async fn get_profile(&self, id: UserId) -> Result<Profile, AccountError>;

    /// Writes all columns of the row. A username collision is
    /// [`AccountError::DuplicateUsername`].
    async fn update_profile(&self, id: UserId, update: &ProfileUpdate)
        -> Result<(), AccountError>;

    /// Whether a profile other than `except` already uses `username`.
    async fn username_taken(&self, username: &str, except: UserId) -> Result<bool, AccountError>;
}

#[async_trait::async_trait]
pub trait AvatarStorage: Send + Sync {
    async fn upload_asset(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), AccountError>;

    /// Deleting an asset that does not exist succeeds.
    async fn delete_asset(&self, name: &str) -> Result<(), AccountError>;

    fn public_address_of(&self, name: &str) -> String;
}
