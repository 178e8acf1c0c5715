use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

const PROVISIONAL_PREFIX: &str = "pending-";

/// Opaque post identifier assigned by the data service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier for a post that exists only as an optimistic patch.
    pub fn provisional() -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The signed-in user as cached by the session.
///
/// `id` is the stable token the data service keys users by (the email in
/// this application) and the value posts carry as `authorId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<Url>,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
        }
    }

    pub fn with_avatar(mut self, avatar: Option<Url>) -> Self {
        self.avatar_ref = avatar;
        self
    }

    /// Upper-cased first letter of the display name, used for avatar badges.
    pub fn initial(&self) -> Option<char> {
        self.display_name
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
    }
}

/// A blog post. Posts are immutable by reference: updates replace the
/// whole value, never individual fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub body: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<Url>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Ownership is plain string equality on the author id.
    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        self.author_id == identity.id
    }
}
