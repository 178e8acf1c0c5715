//! End-user scenarios against scripted data-service doubles.

mod common;

use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

use common::{alice, demo_posts, ids, post};
use live_sync::testing::{ManualGateway, ScriptedSource};
use live_sync::{
    find_post, scope, ListOrigin, LiveQueryHub, LiveSyncError, MutationCall, MutationDispatcher,
    MutationSpec, Post, PostId, QueryKey, QueryResult, ReconciledFeed, ServiceError,
    SessionCache,
};

fn posts_key() -> QueryKey {
    QueryKey::without_args("posts:list")
}

#[tokio::test]
async fn empty_live_result_keeps_demo_posts() {
    let source = ScriptedSource::<Vec<Post>>::new();
    let hub = LiveQueryHub::new(source.clone());
    let feed = ReconciledFeed::mount(&hub, posts_key(), demo_posts());

    assert_eq!(feed.current().items.len(), 3);
    assert_eq!(feed.current().origin, ListOrigin::Placeholder);

    let pusher = source.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        pusher.push(&posts_key(), Vec::new());
    })
    .await
    .unwrap();

    let view = feed.current();
    assert_eq!(ids(&view.items), vec!["demo-1", "demo-2", "demo-3"]);
    assert!(!view.is_empty_state());
}

#[tokio::test]
async fn first_real_post_replaces_all_placeholders() {
    let source = ScriptedSource::<Vec<Post>>::new();
    let hub = LiveQueryHub::new(source.clone());
    let feed = ReconciledFeed::mount(&hub, posts_key(), demo_posts());

    let pusher = source.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        pusher.push(&posts_key(), vec![post("x", "a@x.com", "PostX")]);
    })
    .await
    .unwrap();

    let view = feed.current();
    assert_eq!(ids(&view.items), vec!["x"]);
    assert_eq!(view.origin, ListOrigin::Live);
}

#[tokio::test]
async fn rejected_create_reverts_the_list() {
    let source = ScriptedSource::<Vec<Post>>::new();
    let gateway = ManualGateway::new();
    let hub = LiveQueryHub::new(source.clone());
    let dispatcher = MutationDispatcher::new(hub.clone(), gateway.clone());

    let mut stream = hub.watch(posts_key());
    source.push(&posts_key(), vec![post("p1", "b@y.com", "Existing")]);
    assert_eq!(stream.next().await, Some(QueryResult::Loading));
    let before = stream.next().await.unwrap();

    let provisional = Post {
        id: PostId::provisional(),
        ..post("ignored", "a@x.com", "T")
    };
    let provisional_id = provisional.id.clone();
    let task = tokio::spawn(
        dispatcher.submit(
            MutationSpec::new(MutationCall::new("posts:create", json!({"title": "T"})))
                .affecting(posts_key())
                .with_patch(move |mut list: Vec<Post>| {
                    list.insert(0, provisional.clone());
                    list
                }),
        ),
    );

    let optimistic = stream.next().await.unwrap();
    assert_eq!(optimistic.value().unwrap()[0].id, provisional_id);

    gateway
        .resolve_next(Err(ServiceError::rejected("Must be logged in to create a post")))
        .await;
    let err = task.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        LiveSyncError::mutation_rejected("Must be logged in to create a post")
    );

    let after = stream.next().await.unwrap();
    assert_eq!(after, before);
    assert_eq!(hub.state(&posts_key()), Some(before));
}

#[test]
fn dashboard_scope_then_logout() {
    let session = SessionCache::shared();
    session.begin_login().unwrap();
    session.complete_login(alice()).unwrap();

    let list = vec![post("1", "a@x.com", "Mine"), post("2", "b@y.com", "Theirs")];
    let identity = session.identity();
    assert_eq!(ids(&scope(&list, identity.as_deref())), vec!["1"]);

    session.logout();
    let identity = session.identity();
    assert!(scope(&list, identity.as_deref()).is_empty());
}

#[test]
fn blog_detail_prefers_live_then_demo() {
    let placeholder = demo_posts();
    let live = vec![post("k1", "a@x.com", "Live")];

    let found = find_post(Some(live.as_slice()), &placeholder, &PostId::new("k1")).unwrap();
    assert_eq!(found.title, "Live");
    let found = find_post(Some(live.as_slice()), &placeholder, &PostId::new("demo-2")).unwrap();
    assert_eq!(found.author_name, "Manager");
    assert!(find_post(None, &placeholder, &PostId::new("missing")).is_none());
}
