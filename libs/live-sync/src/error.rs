use thiserror::Error;

/// Errors reported by the reactive data service across its boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Rejected: {message}")]
    Rejected { message: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("Invalid arguments for {name}: {message}")]
    InvalidArguments { name: String, message: String },

    #[error("Data service unavailable: {message}")]
    Unavailable { message: String },
}

impl ServiceError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn unknown_function(name: impl Into<String>) -> Self {
        Self::UnknownFunction { name: name.into() }
    }

    pub fn invalid_arguments(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Failures surfaced to views by the binding and mutation layers.
///
/// A slow initial load is not an error: without a client-side timeout the
/// binding simply stays `Loading` until the service recovers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveSyncError {
    #[error("Mutation rejected: {reason}")]
    MutationRejected { reason: String },

    #[error("Subscription to '{query}' failed: {source}")]
    Subscription { query: String, source: ServiceError },

    #[error("No identity in session; sign in first")]
    IdentityMissing,

    #[error("Data service error: {0}")]
    Service(ServiceError),

    #[error("Could not decode mutation result: {message}")]
    Decode { message: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl LiveSyncError {
    pub fn mutation_rejected(reason: impl Into<String>) -> Self {
        Self::MutationRejected {
            reason: reason.into(),
        }
    }

    pub fn subscription(query: impl Into<String>, source: ServiceError) -> Self {
        Self::Subscription {
            query: query.into(),
            source,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<ServiceError> for LiveSyncError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected { message } => Self::mutation_rejected(message),
            ServiceError::InvalidArguments { name, message } => {
                Self::mutation_rejected(format!("{name}: {message}"))
            }
            other => Self::Service(other),
        }
    }
}

/// Errors from the session state machine and the login flows that drive it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A login is already in progress")]
    LoginInProgress,

    #[error("No login in progress")]
    NotLoggingIn,

    #[error("{message}")]
    InvalidCredentials { message: String },

    #[error("Identity provider error: {message}")]
    Provider { message: String },

    #[error("Malformed login payload: {message}")]
    MalformedPayload { message: String },
}

impl SessionError {
    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    pub fn malformed_payload(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }
}
