/// Shared error type surfaced to views and notices.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MerxError {
    #[error("not found")]
    NotFound,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("username already in use")]
    DuplicateUsername,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MerxError {
    /// Whether the user can fix the problem and resubmit the same form.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            MerxError::DuplicateUsername
                | MerxError::Validation(_)
                | MerxError::UpdateFailed(_)
                | MerxError::Remote(_)
        )
    }
}
