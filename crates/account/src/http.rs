//! Account backend talking to the hosted service over HTTP.
//!
//! Covers the auth endpoints (`/auth/v1`), the `profiles` table through the
//! REST gateway (`/rest/v1`) and the avatar bucket (`/storage/v1`). Every
//! request carries the project API key; authenticated ones add the session's
//! bearer token.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use merx_shared::api::auth::{
    AuthUserResponse, Identity, PasswordGrantRequest, RefreshGrantRequest, SessionEvent,
    TokenResponse,
};
use merx_shared::api::profile::{Profile, ProfileUpdate};
use merx_shared::constants::{AVATAR_BUCKET, UNIQUE_VIOLATION_CODE};
use merx_shared::ids::UserId;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::sync::broadcast;

use crate::backend::{AccountBackend, AvatarStorage};
use crate::error::AccountError;

const SESSION_EVENT_CAPACITY: usize = 64;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Tokens {
    access_token: String,
    refresh_token: String,
    identity: Identity,
}

/// Error payload of the hosted service, read off a non-success response.
#[derive(Debug)]
struct ServiceError {
    status: StatusCode,
    code: Option<String>,
    message: String,
}

impl ServiceError {
    async fn read(resp: Response, context: &str) -> Self {
        let status = resp.status();
        let body = resp.json::<serde_json::Value>().await.ok();
        let field = |name: &str| {
            body.as_ref()
                .and_then(|b| b.get(name))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };
        let code = field("code");
        let message = ["message", "msg", "error_description", "error"]
            .into_iter()
            .find_map(field)
            .unwrap_or_else(|| format!("{context} (HTTP {status})"));
        Self {
            status,
            code,
            message,
        }
    }

    fn is_unique_violation(&self) -> bool {
        self.status == StatusCode::CONFLICT
            || self.code.as_deref() == Some(UNIQUE_VIOLATION_CODE)
    }
}

impl From<ServiceError> for AccountError {
    fn from(e: ServiceError) -> Self {
        match e.status {
            StatusCode::UNAUTHORIZED => AccountError::Unauthenticated,
            _ => AccountError::Remote(e.message),
        }
    }
}

pub struct HttpBackend {
    base_url: String,
    api_key: String,
    bucket: String,
    client: Client,
    tokens: RwLock<Option<Tokens>>,
    events: broadcast::Sender<SessionEvent>,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AccountError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| AccountError::Config(format!("failed to create HTTP client: {e}")))?;
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bucket: AVATAR_BUCKET.to_string(),
            client,
            tokens: RwLock::new(None),
            events,
        })
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn access_token(&self) -> Option<String> {
        self.read_tokens().as_ref().map(|t| t.access_token.clone())
    }

    fn read_tokens(&self) -> std::sync::RwLockReadGuard<'_, Option<Tokens>> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_tokens(&self, tokens: Option<Tokens>) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = tokens;
    }

    /// Attach the API key and the best available bearer token.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.api_key.clone());
        request.header("apikey", &self.api_key).bearer_auth(bearer)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn grant(
        &self,
        grant_type: &str,
        body: &impl serde::Serialize,
    ) -> Result<Tokens, AccountError> {
        let resp = self
            .client
            .post(self.url("/auth/v1/token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let err = ServiceError::read(resp, "token grant failed").await;
            tracing::debug!(
                status = %err.status,
                message = %err.message,
                grant_type,
                "token grant rejected"
            );
            return Err(if status.is_client_error() {
                AccountError::Unauthenticated
            } else {
                err.into()
            });
        }

        let token: TokenResponse = resp.json().await?;
        Ok(Tokens {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            identity: token.user.into(),
        })
    }

    /// Exchange the refresh token for a new access token.
    pub async fn refresh_session(&self) -> Result<Identity, AccountError> {
        let refresh_token = self
            .read_tokens()
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or(AccountError::Unauthenticated)?;

        let tokens = self
            .grant("refresh_token", &RefreshGrantRequest { refresh_token })
            .await?;
        let identity = tokens.identity.clone();
        self.store_tokens(Some(tokens));
        self.emit(SessionEvent::token_refreshed(identity.clone()));
        Ok(identity)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Option<Identity>, AccountError> {
        let resp = self
            .client
            .get(self.url("/auth/v1/user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        match resp.status() {
            StatusCode::UNAUTHORIZED => Ok(None),
            s if s.is_success() => {
                let user: AuthUserResponse = resp.json().await?;
                Ok(Some(user.into()))
            }
            _ => Err(ServiceError::read(resp, "session lookup failed").await.into()),
        }
    }

    fn object_url(&self, name: &str) -> String {
        self.url(&format!("/storage/v1/object/{}/{name}", self.bucket))
    }
}

#[async_trait::async_trait]
impl AccountBackend for HttpBackend {
    async fn current_session(&self) -> Result<Option<Identity>, AccountError> {
        let Some(access_token) = self.access_token() else {
            return Ok(None);
        };

        if let Some(identity) = self.fetch_user(&access_token).await? {
            return Ok(Some(identity));
        }

        // Access token expired; one refresh attempt before giving up.
        match self.refresh_session().await {
            Ok(identity) => Ok(Some(identity)),
            Err(AccountError::Unauthenticated) => {
                tracing::info!("stored session is no longer valid");
                self.store_tokens(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AccountError> {
        let body = PasswordGrantRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let tokens = self.grant("password", &body).await?;
        let identity = tokens.identity.clone();
        self.store_tokens(Some(tokens));
        tracing::info!(user_id = %identity.id, "signed in");
        self.emit(SessionEvent::signed_in(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AccountError> {
        let Some(access_token) = self.access_token() else {
            self.emit(SessionEvent::signed_out());
            return Ok(());
        };

        let result = self
            .client
            .post(self.url("/auth/v1/logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await;

        // The local session ends regardless of what the server says.
        self.store_tokens(None);
        self.emit(SessionEvent::signed_out());

        let resp = result?;
        if resp.status().is_success() || resp.status() == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(ServiceError::read(resp, "sign out failed").await.into())
        }
    }

    async fn get_profile(&self, id: UserId) -> Result<Profile, AccountError> {
        let resp = self
            .authorize(self.client.get(self.url("/rest/v1/profiles")))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ServiceError::read(resp, "profile lookup failed").await.into());
        }

        let rows: Vec<Profile> = resp.json().await?;
        rows.into_iter().next().ok_or(AccountError::NotFound)
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<(), AccountError> {
        let resp = self
            .authorize(self.client.patch(self.url("/rest/v1/profiles")))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = ServiceError::read(resp, "profile update failed").await;
            if err.is_unique_violation() {
                return Err(AccountError::DuplicateUsername);
            }
            return Err(match AccountError::from(err) {
                AccountError::Remote(msg) => AccountError::UpdateFailed(msg),
                other => other,
            });
        }

        // Row-level security filters rows out instead of failing the request.
        let rows: Vec<Profile> = resp.json().await?;
        if rows.is_empty() {
            return Err(AccountError::UpdateFailed("no profile row was updated".into()));
        }
        Ok(())
    }

    async fn username_taken(&self, username: &str, except: UserId) -> Result<bool, AccountError> {
        let resp = self
            .authorize(self.client.get(self.url("/rest/v1/profiles")))
            .query(&[
                ("select", "id".to_string()),
                ("username", format!("eq.{username}")),
                ("id", format!("neq.{except}")),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ServiceError::read(resp, "username lookup failed").await.into());
        }

        let rows: Vec<serde_json::Value> = resp.json().await?;
        Ok(!rows.is_empty())
    }
}

#[async_trait::async_trait]
impl AvatarStorage for HttpBackend {
    async fn upload_asset(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), AccountError> {
        let resp = self
            .authorize(self.client.post(self.object_url(name)))
            .header(
                reqwest::header::CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        if !resp.status().is_success() {
            let err = ServiceError::read(resp, "avatar upload failed").await;
            return Err(AccountError::Storage(err.message));
        }
        Ok(())
    }

    async fn delete_asset(&self, name: &str) -> Result<(), AccountError> {
        let resp = self
            .authorize(
                self.client
                    .delete(self.url(&format!("/storage/v1/object/{}", self.bucket))),
            )
            .json(&serde_json::json!({ "prefixes": [name] }))
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => {
                let err = ServiceError::read(resp, "avatar delete failed").await;
                Err(AccountError::Storage(err.message))
            }
        }
    }

    fn public_address_of(&self, name: &str) -> String {
        self.url(&format!("/storage/v1/object/public/{}/{name}", self.bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpBackend {
        HttpBackend::new("https://project.example.co/", "anon-key", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn public_address_uses_bucket() {
        assert_eq!(
            backend().public_address_of("1_2.png"),
            "https://project.example.co/storage/v1/object/public/avatars/1_2.png"
        );
        assert_eq!(
            backend().with_bucket("pics").object_url("x.jpg"),
            "https://project.example.co/storage/v1/object/pics/x.jpg"
        );
    }

    #[tokio::test]
    async fn no_tokens_means_no_session() {
        assert_eq!(backend().current_session().await, Ok(None));
    }

    #[tokio::test]
    async fn sign_out_without_session_still_reports_event() {
        let backend = backend();
        let mut events = backend.session_events();
        backend.sign_out().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::signed_out());
    }

    #[test]
    fn unique_violation_detected_by_code_or_status() {
        let by_code = ServiceError {
            status: StatusCode::BAD_REQUEST,
            code: Some("23505".into()),
            message: "duplicate key".into(),
        };
        let by_status = ServiceError {
            status: StatusCode::CONFLICT,
            code: None,
            message: "conflict".into(),
        };
        let other = ServiceError {
            status: StatusCode::BAD_REQUEST,
            code: Some("22001".into()),
            message: "value too long".into(),
        };
        assert!(by_code.is_unique_violation());
        assert!(by_status.is_unique_violation());
        assert!(!other.is_unique_violation());
        assert_eq!(
            AccountError::from(other),
            AccountError::Remote("value too long".into())
        );
    }
}
