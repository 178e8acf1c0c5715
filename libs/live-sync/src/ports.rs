//! Ports to the external collaborators: the reactive data service and the
//! identity provider. The core never depends on how they are implemented.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{ServiceError, SessionError};
use crate::model::Identity;
use crate::query::{MutationCall, QueryKey};

/// Handle for one open push subscription inside a data service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src-{}", self.0)
    }
}

/// Receives pushes for one open subscription. Implementations must call a
/// given sink sequentially, in the order the values were produced.
pub type PushSink<T> = Arc<dyn Fn(Result<T, ServiceError>) + Send + Sync>;

/// Live side of the reactive data service.
///
/// `open` starts a standing query; the service pushes the initial value and
/// every later change into `sink` until `close` is called. Reconnection after
/// a transient disconnect is the service's business and must resume pushes
/// into the same sink.
pub trait QuerySource<T>: Send + Sync {
    fn open(&self, key: &QueryKey, sink: PushSink<T>) -> Result<SourceId, ServiceError>;
    fn close(&self, id: SourceId);
}

/// One-shot side of the reactive data service.
#[async_trait]
pub trait MutationGateway: Send + Sync {
    async fn mutate(&self, call: MutationCall) -> Result<Value, ServiceError>;
}

/// Records a signed-in user with the data service (the `users:store` call).
#[async_trait]
pub trait UserRegistry: Send + Sync {
    async fn store_user(&self, identity: &Identity) -> Result<(), ServiceError>;
}

/// Profile returned by an external identity provider after a code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Redirect-based OAuth provider. Token exchange mechanics stay behind this
/// trait; the core only consumes the resulting profile.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<ProviderProfile, SessionError>;
}
