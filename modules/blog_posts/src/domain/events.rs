use chrono::{DateTime, Utc};
use live_sync::PostId;

/// Transport-agnostic domain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostDomainEvent {
    Created {
        id: PostId,
        author_id: String,
        at: DateTime<Utc>,
    },
    Updated {
        id: PostId,
        author_id: String,
        at: DateTime<Utc>,
    },
    Deleted {
        id: PostId,
        author_id: String,
        at: DateTime<Utc>,
    },
    /// Every post was replaced at once (demo reseed).
    Reset { at: DateTime<Utc> },
}

impl PostDomainEvent {
    /// Whether a list scoped to `author_id` may have changed.
    pub fn touches_author(&self, author_id: &str) -> bool {
        match self {
            Self::Created { author_id: a, .. }
            | Self::Updated { author_id: a, .. }
            | Self::Deleted { author_id: a, .. } => a == author_id,
            Self::Reset { .. } => true,
        }
    }
}
