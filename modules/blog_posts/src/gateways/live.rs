//! The domain service exposed through the live-sync ports: standing queries
//! pushed from the change feed, mutations by wire name, and user storage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use live_sync::{
    Identity, MutationCall, MutationGateway, PushSink, QueryKey, QuerySource, ServiceError,
    SourceId, UserRegistry,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, instrument, trace, warn, Instrument};

use crate::contract::model::{NewPost, NewUser, Post, PostEdit, PostId};
use crate::domain::error::DomainError;
use crate::domain::events::PostDomainEvent;
use crate::domain::service::Service;
use crate::functions::{
    CREATE_POST, DELETE_POST, LIST_POSTS, POSTS_BY_AUTHOR, SEED_DEMO, STORE_USER, UPDATE_POST,
};
use crate::infra::change_feed::ChangeFeed;

/// Authorization and validation failures are the caller's fault and reach the
/// client as rejections; storage failures look like an unavailable service.
fn service_error(err: DomainError) -> ServiceError {
    match err {
        DomainError::Database { message } => ServiceError::unavailable(message),
        other => ServiceError::rejected(other.to_string()),
    }
}

fn decode_args<T: DeserializeOwned>(call: &MutationCall) -> Result<T, ServiceError> {
    serde_json::from_value(call.args.clone())
        .map_err(|e| ServiceError::invalid_arguments(call.name.as_str(), e.to_string()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteArgs {
    post_id: PostId,
    author_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LiveQuery {
    All,
    ByAuthor(String),
}

impl LiveQuery {
    fn parse(key: &QueryKey) -> Result<Self, ServiceError> {
        match key.name() {
            LIST_POSTS => Ok(Self::All),
            POSTS_BY_AUTHOR => key
                .arg_str("authorId")
                .map(|author| Self::ByAuthor(author.to_string()))
                .ok_or_else(|| {
                    ServiceError::invalid_arguments(POSTS_BY_AUTHOR, "missing string field `authorId`")
                }),
            other => Err(ServiceError::unknown_function(other)),
        }
    }

    fn is_affected_by(&self, event: &PostDomainEvent) -> bool {
        match self {
            Self::All => true,
            Self::ByAuthor(author) => event.touches_author(author),
        }
    }

    async fn run(&self, service: &Service) -> Result<Vec<Post>, DomainError> {
        match self {
            Self::All => service.list_posts().await,
            Self::ByAuthor(author) => service.posts_by_author(author).await,
        }
    }
}

/// Reactive data service backed by the in-process domain service.
pub struct LiveDataService {
    service: Arc<Service>,
    feed: ChangeFeed,
    push_delay: Duration,
    tasks: DashMap<SourceId, JoinHandle<()>>,
    next_id: AtomicU64,
}

impl LiveDataService {
    pub fn new(service: Arc<Service>, feed: ChangeFeed, push_delay: Duration) -> Self {
        Self {
            service,
            feed,
            push_delay,
            tasks: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// Number of standing queries currently served.
    pub fn open_queries(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for LiveDataService {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}

impl QuerySource<Vec<Post>> for LiveDataService {
    fn open(&self, key: &QueryKey, sink: PushSink<Vec<Post>>) -> Result<SourceId, ServiceError> {
        let query = LiveQuery::parse(key)?;
        let runtime = Handle::try_current()
            .map_err(|_| ServiceError::unavailable("no async runtime to serve live queries"))?;

        let id = SourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        // Subscribe before the first read so no change is missed in between.
        let changes = self.feed.subscribe();
        let (registered_tx, registered_rx) = oneshot::channel();
        let task = runtime.spawn(
            serve_query(
                self.service.clone(),
                query,
                changes,
                self.push_delay,
                sink,
                registered_rx,
            )
            .instrument(debug_span!("blog_posts.live.query", query = %key, source = %id)),
        );
        self.tasks.insert(id, task);
        let _ = registered_tx.send(());

        debug!(query = %key, source = %id, "Opened live query");
        Ok(id)
    }

    fn close(&self, id: SourceId) {
        if let Some((_, task)) = self.tasks.remove(&id) {
            task.abort();
            debug!(source = %id, "Closed live query");
        }
    }
}

async fn serve_query(
    service: Arc<Service>,
    query: LiveQuery,
    mut changes: broadcast::Receiver<PostDomainEvent>,
    push_delay: Duration,
    sink: PushSink<Vec<Post>>,
    registered: oneshot::Receiver<()>,
) {
    // The source id must be tracked before a failure push can close it.
    if registered.await.is_err() {
        return;
    }
    if !push_delay.is_zero() {
        tokio::time::sleep(push_delay).await;
    }

    loop {
        match query.run(&service).await {
            Ok(posts) => {
                trace!(count = posts.len(), "Pushing query result");
                sink(Ok(posts));
            }
            Err(err) => {
                warn!(error = %err, "Live query failed");
                sink(Err(service_error(err)));
                return;
            }
        }

        loop {
            match changes.recv().await {
                Ok(event) if query.is_affected_by(&event) => break,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Change feed lagged, re-querying");
                    break;
                }
                Err(RecvError::Closed) => return,
            }
        }
        // One re-query covers everything queued so far.
        loop {
            match changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => return,
            }
        }
    }
}

#[async_trait]
impl MutationGateway for LiveDataService {
    #[instrument(name = "blog_posts.live.mutate", skip(self, call), fields(function = %call.name))]
    async fn mutate(&self, call: MutationCall) -> Result<Value, ServiceError> {
        match call.name.as_str() {
            CREATE_POST => {
                let args: NewPost = decode_args(&call)?;
                let post = self.service.create_post(args).await.map_err(service_error)?;
                Ok(json!(post.id.as_str()))
            }
            UPDATE_POST => {
                let args: PostEdit = decode_args(&call)?;
                self.service.update_post(args).await.map_err(service_error)?;
                Ok(json!({ "success": true }))
            }
            DELETE_POST => {
                let args: DeleteArgs = decode_args(&call)?;
                self.service
                    .delete_post(&args.post_id, &args.author_id)
                    .await
                    .map_err(service_error)?;
                Ok(json!({ "success": true }))
            }
            STORE_USER => {
                let args: NewUser = decode_args(&call)?;
                let user = self.service.store_user(args).await.map_err(service_error)?;
                Ok(json!(user.id.to_string()))
            }
            SEED_DEMO => {
                let inserted = self.service.seed_demo().await.map_err(service_error)?;
                Ok(json!({ "success": true, "inserted": inserted }))
            }
            other => {
                warn!("Unknown mutation");
                Err(ServiceError::unknown_function(other))
            }
        }
    }
}

#[async_trait]
impl UserRegistry for LiveDataService {
    async fn store_user(&self, identity: &Identity) -> Result<(), ServiceError> {
        self.service
            .store_user(NewUser {
                token_identifier: identity.id.clone(),
                name: identity.display_name.clone(),
                profile_image: identity.avatar_ref.clone(),
            })
            .await
            .map(|_| ())
            .map_err(service_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{by_author_key, list_key};
    use chrono::Utc;

    #[test]
    fn query_keys_parse_by_name() {
        assert_eq!(LiveQuery::parse(&list_key()).unwrap(), LiveQuery::All);
        assert_eq!(
            LiveQuery::parse(&by_author_key("a@x.com")).unwrap(),
            LiveQuery::ByAuthor("a@x.com".to_string())
        );
        assert!(matches!(
            LiveQuery::parse(&QueryKey::without_args(POSTS_BY_AUTHOR)),
            Err(ServiceError::InvalidArguments { .. })
        ));
        assert!(matches!(
            LiveQuery::parse(&QueryKey::without_args("posts:archive")),
            Err(ServiceError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn author_queries_ignore_other_authors() {
        let query = LiveQuery::ByAuthor("a@x.com".to_string());
        let foreign = PostDomainEvent::Created {
            id: PostId::new("p"),
            author_id: "b@y.com".to_string(),
            at: Utc::now(),
        };
        assert!(!query.is_affected_by(&foreign));
        assert!(LiveQuery::All.is_affected_by(&foreign));
        assert!(query.is_affected_by(&PostDomainEvent::Reset { at: Utc::now() }));
    }

    #[test]
    fn domain_errors_map_to_service_errors() {
        assert_eq!(
            service_error(DomainError::not_post_author("delete")),
            ServiceError::rejected("Unauthorized to delete this post")
        );
        assert!(matches!(
            service_error(DomainError::database("gone")),
            ServiceError::Unavailable { .. }
        ));
    }
}
