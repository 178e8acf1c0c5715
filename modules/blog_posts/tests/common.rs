#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use blog_posts::domain::events::PostDomainEvent;
use blog_posts::domain::ports::EventPublisher;
use blog_posts::domain::service::{Service, ServiceConfig};
use blog_posts::gateways::live::LiveDataService;
use blog_posts::infra::change_feed::ChangeFeed;
use blog_posts::infra::storage::InMemoryPostsRepository;
use blog_posts::model::NewPost;
use futures::{Stream, StreamExt};
use live_sync::{Identity, Post, QueryResult};
use parking_lot::Mutex;

pub const WAIT: Duration = Duration::from_secs(5);

/// Collects every published event.
#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<PostDomainEvent>>,
}

impl EventPublisher<PostDomainEvent> for RecordingPublisher {
    fn publish(&self, event: &PostDomainEvent) {
        self.events.lock().push(event.clone());
    }
}

pub fn service_with(events: Arc<dyn EventPublisher<PostDomainEvent>>) -> Service {
    Service::new(
        Arc::new(InMemoryPostsRepository::new()),
        events,
        ServiceConfig::default(),
    )
}

pub fn recording_service() -> (Service, Arc<RecordingPublisher>) {
    let events = Arc::new(RecordingPublisher::default());
    (service_with(events.clone()), events)
}

/// Live data service over a fresh in-memory store.
pub fn live_service(push_delay: Duration) -> Arc<LiveDataService> {
    let feed = ChangeFeed::new(64);
    let service = Arc::new(service_with(Arc::new(feed.clone())));
    Arc::new(LiveDataService::new(service, feed, push_delay))
}

pub fn new_post(author: &str, title: &str) -> NewPost {
    NewPost {
        title: title.to_string(),
        body: format!("{title} body"),
        author_id: author.to_string(),
        author_name: author.split('@').next().unwrap_or(author).to_string(),
        image_url: None,
    }
}

pub fn alice() -> Identity {
    Identity::new("a@x.com", "Alice")
}

pub fn bob() -> Identity {
    Identity::new("b@y.com", "Bob")
}

pub fn titles(posts: &[Post]) -> Vec<String> {
    posts.iter().map(|p| p.title.clone()).collect()
}

/// Next value from `stream` that satisfies `pred`, within [`WAIT`].
pub async fn next_value_where<S, F>(stream: &mut S, pred: F) -> Vec<Post>
where
    S: Stream<Item = QueryResult<Vec<Post>>> + Unpin,
    F: Fn(&[Post]) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match stream.next().await {
                Some(QueryResult::Value(posts)) if pred(&posts) => return posts,
                Some(_) => continue,
                None => panic!("stream ended"),
            }
        }
    })
    .await
    .expect("timed out waiting for a matching value")
}
