use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// Row of the `profiles` table, one per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Profile with no fields filled in.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            full_name: None,
            username: None,
            avatar_url: None,
        }
    }

    /// Name shown in the header: full name, then username, then the fallback.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        non_empty(self.full_name.as_deref())
            .or_else(|| non_empty(self.username.as_deref()))
            .unwrap_or(fallback)
    }

    /// Applies a committed update to this row.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        self.full_name = update.full_name.clone();
        self.username = update.username.clone();
        self.avatar_url = update.avatar_url.clone();
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Body of `PATCH /rest/v1/profiles?id=eq.<id>`.
///
/// All three columns are always written; `avatar_url: None` clears the avatar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}
