use thiserror::Error;

use crate::domain::error::DomainError;

/// Errors that are safe to expose to other modules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlogPostsError {
    #[error("{message}")]
    Unauthorized { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Internal error")]
    Internal,
}

impl BlogPostsError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self::Internal
    }
}

impl From<DomainError> for BlogPostsError {
    fn from(domain_error: DomainError) -> Self {
        match domain_error {
            e @ (DomainError::NotLoggedIn | DomainError::NotPostAuthor { .. }) => {
                Self::unauthorized(e.to_string())
            }
            e @ (DomainError::EmptyField { .. } | DomainError::TooLong { .. }) => {
                Self::validation(e.to_string())
            }
            DomainError::Validation { field, message } => {
                Self::validation(format!("{field}: {message}"))
            }
            DomainError::Database { .. } => Self::internal(),
        }
    }
}
