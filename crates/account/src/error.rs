//! Error types for the merx-account crate.

use merx_shared::error::MerxError;
use merx_shared::form::FieldError;
use thiserror::Error;

/// Errors raised by the account backend and the workflows built on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    /// No session exists at the time of the action.
    #[error("not authenticated")]
    Unauthenticated,

    /// The profile row for the identity does not exist.
    #[error("profile not found")]
    NotFound,

    /// Another profile already uses the requested username.
    #[error("username already in use")]
    DuplicateUsername,

    /// Input rejected before any remote call was made.
    #[error("validation error: {0}")]
    Validation(String),

    /// The profile row could not be written.
    #[error("update failed: {0}")]
    UpdateFailed(String),

    /// Network or service fault talking to the backend.
    #[error("remote error: {0}")]
    Remote(String),

    /// Object storage fault.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid client-side configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AccountError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Remote("request timed out".into())
        } else if e.is_connect() {
            Self::Remote("could not connect to server".into())
        } else if e.is_decode() {
            Self::Remote("unexpected response from server".into())
        } else {
            Self::Remote("network request failed".into())
        }
    }
}

impl From<object_store::Error> for AccountError {
    fn from(e: object_store::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<FieldError> for AccountError {
    fn from(e: FieldError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<AccountError> for MerxError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Unauthenticated => MerxError::Unauthenticated,
            AccountError::NotFound => MerxError::NotFound,
            AccountError::DuplicateUsername => MerxError::DuplicateUsername,
            AccountError::Validation(msg) => MerxError::Validation(msg),
            AccountError::UpdateFailed(msg) => MerxError::UpdateFailed(msg),
            AccountError::Remote(msg) | AccountError::Storage(msg) => MerxError::Remote(msg),
            AccountError::Config(msg) => MerxError::Internal(msg),
        }
    }
}
