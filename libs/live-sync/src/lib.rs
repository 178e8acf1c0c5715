//! Client-side reactive data binding for the blog.
//!
//! * [`binding`]: shared, reference-counted live query subscriptions with an
//!   optimistic overlay.
//! * [`dispatcher`]: mutations that patch bound lists before the service
//!   answers and roll back on failure.
//! * [`reconcile`]: placeholder/live list reconciliation.
//! * [`scope`]: per-user views over a shared list.
//! * [`session`]: the injectable identity cache, [`guard`] routes on it and
//!   [`login`] fills it.
//!
//! The data service and identity provider are reached only through the
//! traits in [`ports`].

pub mod binding;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod login;
pub mod model;
pub mod ports;
pub mod query;
pub mod reconcile;
pub mod scope;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use binding::{
    LiveBinding, LiveQueryHub, LiveStream, MutationId, MutationState, OptimisticPatch,
    PendingMutation,
};
pub use dispatcher::{decode_result, MutationDispatcher, MutationSpec};
pub use error::{LiveSyncError, ServiceError, SessionError};
pub use guard::{Access, Route, RouteGuard};
pub use login::{Credentials, LoginFlow, SignUp};
pub use model::{Identity, Post, PostId};
pub use ports::{
    IdentityProvider, MutationGateway, ProviderProfile, PushSink, QuerySource, SourceId,
    UserRegistry,
};
pub use query::{MutationCall, QueryKey, QueryResult};
pub use reconcile::{find_post, ListOrigin, PlaceholderReconciler, Reconciled, ReconciledFeed};
pub use scope::{scope, OwnedPostsView};
pub use session::{SessionCache, SessionEvent, SessionPhase, SessionWatch};
