use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// Authenticated user's minimal reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
}

/// Kind of authentication transition reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A session transition together with the identity it leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub identity: Option<Identity>,
}

impl SessionEvent {
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            identity: Some(identity),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            identity: None,
        }
    }

    pub fn token_refreshed(identity: Identity) -> Self {
        Self {
            kind: SessionEventKind::TokenRefreshed,
            identity: Some(identity),
        }
    }
}

/// Password grant body for `POST /auth/v1/token?grant_type=password`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordGrantRequest {
    pub email: String,
    pub password: String,
}

/// Refresh grant body for `POST /auth/v1/token?grant_type=refresh_token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshGrantRequest {
    pub refresh_token: String,
}

/// User object returned by the auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUserResponse {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<AuthUserResponse> for Identity {
    fn from(user: AuthUserResponse) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
        }
    }
}

/// Token grant response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUserResponse,
}
