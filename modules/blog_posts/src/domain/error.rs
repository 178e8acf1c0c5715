use thiserror::Error;

/// Domain-specific errors using thiserror
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Must be logged in to create a post")]
    NotLoggedIn,

    /// Raised for a missing post as well as for someone else's.
    #[error("Unauthorized to {action} this post")]
    NotPostAuthor { action: &'static str },

    #[error("{field} cannot be empty")]
    EmptyField { field: &'static str },

    #[error("{field} too long: {len} characters (max: {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Database error: {message}")]
    Database { message: String },
}

impl DomainError {
    pub fn not_logged_in() -> Self {
        Self::NotLoggedIn
    }

    pub fn not_post_author(action: &'static str) -> Self {
        Self::NotPostAuthor { action }
    }

    pub fn empty_field(field: &'static str) -> Self {
        Self::EmptyField { field }
    }

    pub fn too_long(field: &'static str, len: usize, max: usize) -> Self {
        Self::TooLong { field, len, max }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }
}
