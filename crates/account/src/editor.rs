//! Profile editing workflow.
//!
//! Edits are staged in an [`EditDraft`] and only reach the backend on
//! [`ProfileEditor::submit`], which runs the remote steps strictly in order:
//!
//! 1. resolve the identity and check the native field constraints,
//! 2. make sure a changed username is still free,
//! 3. delete/upload avatar assets and work out the new avatar address,
//! 4. write the profile row.
//!
//! The session is re-checked before every remote mutation and once more
//! before the result is applied locally, so a sign-out in the middle of a
//! submit never lands on the local state of the signed-out identity.

use std::sync::Arc;

use merx_shared::api::profile::{Profile, ProfileUpdate};
use merx_shared::form::FieldSpec;
use merx_shared::ids::UserId;

use crate::avatar::{file_name_from_address, generate_avatar_name, with_cache_bust, AvatarFile};
use crate::backend::{AccountBackend, AvatarStorage};
use crate::error::AccountError;
use crate::notice::{Notice, Notices};
use crate::session::SessionStore;

/// The two text inputs of the profile form.
pub const PROFILE_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("full_name", "Full name", true),
    FieldSpec::text("username", "Username", true),
];

const SAVED_MESSAGE: &str = "Profile updated successfully!";
const LOAD_FAILED_MESSAGE: &str = "Could not load profile";
const SAVE_FAILED_MESSAGE: &str = "Could not save changes";
const DUPLICATE_USERNAME_MESSAGE: &str = "Username is already taken";
const SIGNED_OUT_MESSAGE: &str = "You are not signed in";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Loading,
    Ready,
    Submitting,
    NavigatedAway,
}

/// Pending change to the avatar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AvatarChange {
    #[default]
    Keep,
    Replace(AvatarFile),
    Remove,
}

/// Unsaved local edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditDraft {
    pub full_name: String,
    pub username: String,
    pub avatar: AvatarChange,
}

impl EditDraft {
    fn from_profile(profile: &Profile) -> Self {
        Self {
            full_name: profile.full_name.clone().unwrap_or_default(),
            username: profile.username.clone().unwrap_or_default(),
            avatar: AvatarChange::Keep,
        }
    }

    /// Whether submitting would change anything compared to `saved`.
    pub fn is_dirty(&self, saved: &Profile) -> bool {
        self.avatar != AvatarChange::Keep
            || saved.full_name.as_deref().unwrap_or_default() != self.full_name
            || saved.username.as_deref().unwrap_or_default() != self.username
    }
}

/// What the avatar slot should display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarPreview<'a> {
    Staged(&'a AvatarFile),
    Saved(&'a str),
    Empty,
}

/// Where the view should go after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Back,
}

#[derive(Debug, Clone, Default)]
pub struct EditorOptions {
    /// Append a cache-busting token to freshly uploaded avatar addresses.
    pub cache_bust_avatars: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionTag {
    user_id: UserId,
    generation: u64,
}

pub struct ProfileEditor {
    backend: Arc<dyn AccountBackend>,
    avatars: Arc<dyn AvatarStorage>,
    session: SessionStore,
    options: EditorOptions,
    state: EditorState,
    loaded_for: Option<UserId>,
    saved: Option<Profile>,
    draft: EditDraft,
    notices: Notices,
}

impl ProfileEditor {
    pub fn new(
        session: SessionStore,
        backend: Arc<dyn AccountBackend>,
        avatars: Arc<dyn AvatarStorage>,
    ) -> Self {
        Self {
            backend,
            avatars,
            session,
            options: EditorOptions::default(),
            state: EditorState::Loading,
            loaded_for: None,
            saved: None,
            draft: EditDraft::default(),
            notices: Notices::default(),
        }
    }

    pub fn with_options(mut self, options: EditorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn draft(&self) -> &EditDraft {
        &self.draft
    }

    /// Last profile loaded from or committed to the backend.
    pub fn saved(&self) -> Option<&Profile> {
        self.saved.as_ref()
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        PROFILE_FIELDS
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, EditorState::Loading | EditorState::Submitting)
    }

    pub fn notices(&mut self) -> &mut Notices {
        &mut self.notices
    }

    /// Fetch the signed-in user's profile into the form.
    ///
    /// Only runs from the initial `Loading` state. A failure still leaves the
    /// editor `Ready` (with empty fields) and queues an error notice.
    pub async fn load(&mut self) -> Result<(), AccountError> {
        if self.state != EditorState::Loading {
            tracing::debug!(state = ?self.state, "profile editor already loaded");
            return Ok(());
        }

        let result = self.fetch().await;
        self.state = EditorState::Ready;
        match result {
            Ok(profile) => {
                self.draft = EditDraft::from_profile(&profile);
                self.loaded_for = Some(profile.id);
                self.saved = Some(profile);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "error loading profile");
                self.notices.push(Notice::error(LOAD_FAILED_MESSAGE));
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Profile, AccountError> {
        let snapshot = self.session.current();
        let identity = snapshot.identity.ok_or(AccountError::Unauthenticated)?;
        let tag = SessionTag {
            user_id: identity.id,
            generation: snapshot.generation,
        };
        let profile = self.backend.get_profile(identity.id).await?;
        self.ensure_session(tag)?;
        Ok(profile)
    }

    pub fn set_full_name(&mut self, value: impl Into<String>) {
        if self.accepts_edits() {
            self.draft.full_name = value.into();
        }
    }

    pub fn set_username(&mut self, value: impl Into<String>) {
        if self.accepts_edits() {
            self.draft.username = value.into();
        }
    }

    /// Stage a new avatar; cancels a pending removal.
    pub fn stage_avatar(&mut self, file: AvatarFile) {
        if self.accepts_edits() {
            self.draft.avatar = AvatarChange::Replace(file);
        }
    }

    /// Request avatar removal; drops any staged file.
    pub fn remove_avatar(&mut self) {
        if self.accepts_edits() {
            self.draft.avatar = AvatarChange::Remove;
        }
    }

    fn accepts_edits(&self) -> bool {
        if self.state == EditorState::NavigatedAway {
            tracing::debug!("ignoring edit on a closed profile editor");
            return false;
        }
        true
    }

    pub fn preview(&self) -> AvatarPreview<'_> {
        match &self.draft.avatar {
            AvatarChange::Replace(file) => AvatarPreview::Staged(file),
            AvatarChange::Remove => AvatarPreview::Empty,
            AvatarChange::Keep => match self
                .saved
                .as_ref()
                .and_then(|p| p.avatar_url.as_deref())
                .filter(|url| !url.is_empty())
            {
                Some(url) => AvatarPreview::Saved(url),
                None => AvatarPreview::Empty,
            },
        }
    }

    /// Leave without saving.
    pub fn cancel(&mut self) -> Navigation {
        self.state = EditorState::NavigatedAway;
        self.draft = EditDraft::default();
        Navigation::Back
    }

    /// Commit the draft.
    ///
    /// On success the draft is cleared, the editor is closed and the view
    /// should navigate back. On failure the draft is kept as typed so the
    /// user can correct it and submit again.
    pub async fn submit(&mut self) -> Result<Navigation, AccountError> {
        match self.state {
            EditorState::Ready => {}
            EditorState::Loading => {
                return Err(AccountError::Validation("profile is still loading".into()))
            }
            EditorState::Submitting => {
                return Err(AccountError::Validation("a save is already in progress".into()))
            }
            EditorState::NavigatedAway => {
                return Err(AccountError::Validation("profile editor is closed".into()))
            }
        }

        self.state = EditorState::Submitting;
        let result = self.commit().await;
        match result {
            Ok(profile) => {
                tracing::info!(user_id = %profile.id, "profile updated");
                self.draft = EditDraft::default();
                self.saved = Some(profile);
                self.state = EditorState::NavigatedAway;
                self.notices.push(Notice::success(SAVED_MESSAGE));
                Ok(Navigation::Back)
            }
            Err(e) => {
                tracing::warn!(error = %e, "error updating profile");
                self.state = EditorState::Ready;
                self.notices.push(Notice::error(failure_message(&e)));
                Err(e)
            }
        }
    }

    async fn commit(&self) -> Result<Profile, AccountError> {
        let snapshot = self.session.current();
        let identity = snapshot.identity.ok_or(AccountError::Unauthenticated)?;
        if self.loaded_for.is_some_and(|id| id != identity.id) {
            return Err(AccountError::Unauthenticated);
        }
        let tag = SessionTag {
            user_id: identity.id,
            generation: snapshot.generation,
        };

        for spec in PROFILE_FIELDS {
            let raw = match spec.name {
                "username" => &self.draft.username,
                _ => &self.draft.full_name,
            };
            spec.check(raw)?;
        }

        let saved = self
            .saved
            .clone()
            .unwrap_or_else(|| Profile::empty(identity.id));

        if saved.username.as_deref() != Some(self.draft.username.as_str())
            && self
                .backend
                .username_taken(&self.draft.username, identity.id)
                .await?
        {
            return Err(AccountError::DuplicateUsername);
        }

        let avatar_url = self
            .resolve_avatar(saved.avatar_url.as_deref(), tag)
            .await?;

        let update = ProfileUpdate {
            full_name: Some(self.draft.full_name.clone()),
            username: Some(self.draft.username.clone()),
            avatar_url,
        };

        self.ensure_session(tag)?;
        self.backend
            .update_profile(identity.id, &update)
            .await
            .map_err(into_update_error)?;
        self.ensure_session(tag)?;

        let mut profile = saved;
        profile.apply(&update);
        Ok(profile)
    }

    /// Run the avatar half of the commit and return the address to store.
    async fn resolve_avatar(
        &self,
        current: Option<&str>,
        tag: SessionTag,
    ) -> Result<Option<String>, AccountError> {
        let previous = current.filter(|url| !url.is_empty());
        match &self.draft.avatar {
            AvatarChange::Keep => Ok(current.map(str::to_owned)),
            AvatarChange::Remove => {
                if let Some(old) = previous {
                    self.ensure_session(tag)?;
                    self.delete_previous(old).await;
                }
                Ok(None)
            }
            AvatarChange::Replace(file) => {
                if let Some(old) = previous {
                    self.ensure_session(tag)?;
                    self.delete_previous(old).await;
                }

                let name = generate_avatar_name(&file.file_name);
                self.ensure_session(tag)?;
                self.avatars
                    .upload_asset(&name, file.bytes.clone(), file.content_type.as_deref())
                    .await?;
                tracing::debug!(name = %name, size = file.bytes.len(), "avatar uploaded");

                let mut address = self.avatars.public_address_of(&name);
                if self.options.cache_bust_avatars {
                    address = with_cache_bust(&address, chrono::Utc::now().timestamp_millis());
                }
                Ok(Some(address))
            }
        }
    }

    /// Best-effort removal of the asset behind `address`.
    async fn delete_previous(&self, address: &str) {
        let Some(name) = file_name_from_address(address) else {
            tracing::warn!(address, "cannot derive avatar file name; skipping delete");
            return;
        };
        if let Err(e) = self.avatars.delete_asset(&name).await {
            tracing::warn!(error = %e, name = %name, "failed to delete previous avatar");
        }
    }

    fn ensure_session(&self, tag: SessionTag) -> Result<(), AccountError> {
        if self.session.current().holds(tag.user_id, tag.generation) {
            Ok(())
        } else {
            tracing::info!(user_id = %tag.user_id, "session changed during profile edit; discarding");
            Err(AccountError::Unauthenticated)
        }
    }
}

fn into_update_error(e: AccountError) -> AccountError {
    match e {
        AccountError::DuplicateUsername | AccountError::Unauthenticated => e,
        AccountError::UpdateFailed(msg) | AccountError::Remote(msg) | AccountError::Storage(msg) => {
            AccountError::UpdateFailed(msg)
        }
        other => AccountError::UpdateFailed(other.to_string()),
    }
}

fn failure_message(e: &AccountError) -> String {
    match e {
        AccountError::DuplicateUsername => DUPLICATE_USERNAME_MESSAGE.into(),
        AccountError::Unauthenticated => SIGNED_OUT_MESSAGE.into(),
        AccountError::Validation(msg) => msg.clone(),
        _ => SAVE_FAILED_MESSAGE.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::storage::ObjectStoreAvatars;
    use merx_shared::api::auth::SessionEvent;

    async fn editor_for(full_name: &str, username: &str) -> (ProfileEditor, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let ana = backend.add_account("ana@example.com", "secret");
        backend.insert_profile(Profile {
            id: ana.id,
            full_name: Some(full_name.into()),
            username: Some(username.into()),
            avatar_url: None,
        });
        backend.sign_in_with_password("ana@example.com", "secret").await.unwrap();

        let store = SessionStore::new();
        store.apply(SessionEvent::signed_in(ana));
        let avatars = Arc::new(ObjectStoreAvatars::in_memory("https://cdn.example.com/avatars"));
        let mut editor = ProfileEditor::new(store, backend.clone(), avatars);
        editor.load().await.unwrap();
        (editor, backend)
    }

    #[tokio::test]
    async fn load_fills_draft() {
        let (editor, _) = editor_for("Ana Souza", "ana").await;
        assert_eq!(editor.state(), EditorState::Ready);
        assert_eq!(editor.draft().full_name, "Ana Souza");
        assert_eq!(editor.draft().username, "ana");
        assert_eq!(editor.preview(), AvatarPreview::Empty);
    }

    #[tokio::test]
    async fn load_without_session_reports_error() {
        let backend = Arc::new(MemoryBackend::new());
        let avatars = Arc::new(ObjectStoreAvatars::in_memory("https://cdn.example.com"));
        let mut editor = ProfileEditor::new(SessionStore::new(), backend, avatars);

        assert_eq!(editor.load().await, Err(AccountError::Unauthenticated));
        assert_eq!(editor.state(), EditorState::Ready);
        assert_eq!(editor.notices().last().unwrap().message, LOAD_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn staging_and_removing_are_exclusive() {
        let (mut editor, _) = editor_for("Ana", "ana").await;
        editor.stage_avatar(AvatarFile::new("b.jpg", vec![1, 2, 3]));
        assert!(matches!(editor.preview(), AvatarPreview::Staged(_)));
        editor.remove_avatar();
        assert_eq!(editor.draft().avatar, AvatarChange::Remove);
        editor.stage_avatar(AvatarFile::new("c.png", vec![4]));
        assert!(matches!(editor.draft().avatar, AvatarChange::Replace(_)));
    }

    #[tokio::test]
    async fn empty_username_is_rejected_before_remote_calls() {
        let (mut editor, backend) = editor_for("Ana", "ana").await;
        editor.set_username("");
        let result = editor.submit().await;
        assert!(matches!(result, Err(AccountError::Validation(_))));
        assert_eq!(editor.state(), EditorState::Ready);
        let id = editor.saved().unwrap().id;
        assert_eq!(backend.profile(id).unwrap().username.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn successful_submit_closes_editor() {
        let (mut editor, backend) = editor_for("Ana", "ana").await;
        editor.set_full_name("Ana Maria");
        assert!(editor.draft().is_dirty(editor.saved().unwrap()));

        assert_eq!(editor.submit().await, Ok(Navigation::Back));
        assert_eq!(editor.state(), EditorState::NavigatedAway);
        assert_eq!(editor.draft(), &EditDraft::default());
        let id = editor.saved().unwrap().id;
        assert_eq!(
            backend.profile(id).unwrap().full_name.as_deref(),
            Some("Ana Maria")
        );
        assert_eq!(editor.notices().last().unwrap().message, SAVED_MESSAGE);
    }

    #[tokio::test]
    async fn closed_editor_rejects_submit_and_edits() {
        let (mut editor, _) = editor_for("Ana", "ana").await;
        assert_eq!(editor.cancel(), Navigation::Back);
        editor.set_full_name("ignored");
        assert_eq!(editor.draft().full_name, "");
        assert!(matches!(
            editor.submit().await,
            Err(AccountError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn submit_before_load_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let avatars = Arc::new(ObjectStoreAvatars::in_memory("https://cdn.example.com"));
        let mut editor = ProfileEditor::new(SessionStore::new(), backend, avatars);
        assert!(editor.is_busy());
        assert!(matches!(
            editor.submit().await,
            Err(AccountError::Validation(_))
        ));
        assert_eq!(editor.state(), EditorState::Loading);
    }

    #[test]
    fn update_errors_are_normalized() {
        assert_eq!(
            into_update_error(AccountError::Remote("503".into())),
            AccountError::UpdateFailed("503".into())
        );
        assert_eq!(
            into_update_error(AccountError::DuplicateUsername),
            AccountError::DuplicateUsername
        );
        assert_eq!(
            into_update_error(AccountError::NotFound),
            AccountError::UpdateFailed("profile not found".into())
        );
    }

    #[test]
    fn failure_messages_match_error_kind() {
        assert_eq!(
            failure_message(&AccountError::DuplicateUsername),
            DUPLICATE_USERNAME_MESSAGE
        );
        assert_eq!(
            failure_message(&AccountError::UpdateFailed("x".into())),
            SAVE_FAILED_MESSAGE
        );
    }
}
