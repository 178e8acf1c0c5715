//! The live-sync core bound to the in-process data service.

mod common;

use std::sync::Arc;
use std::time::Duration;

use blog_posts::demo::placeholder_posts;
use blog_posts::functions::{by_author_key, list_key, CREATE_POST, SEED_DEMO, STORE_USER};
use blog_posts::gateways::webhook;
use blog_posts::{PostDraft, PostsController, PostsControllerError};
use chrono::Utc;
use futures::StreamExt;
use live_sync::{
    LiveQueryHub, LiveSyncError, MutationCall, MutationDispatcher, MutationGateway, OwnedPostsView,
    ListOrigin, QueryKey, QueryResult, ReconciledFeed, ServiceError, SessionCache,
};
use serde_json::json;

use common::{alice, bob, live_service, new_post, next_value_where, titles};

#[tokio::test]
async fn first_push_waits_for_the_configured_delay() {
    let data = live_service(Duration::from_millis(200));
    let hub = LiveQueryHub::new(data.clone());
    let mut stream = hub.watch(list_key());

    assert_eq!(stream.next().await, Some(QueryResult::Loading));
    let started = tokio::time::Instant::now();
    let initial = next_value_where(&mut stream, |_| true).await;
    assert!(initial.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn writes_are_pushed_to_matching_queries_only() {
    let data = live_service(Duration::ZERO);
    let hub = LiveQueryHub::new(data.clone());
    let mut all = hub.watch(list_key());
    let mut mine = hub.watch(by_author_key("a@x.com"));
    next_value_where(&mut all, |_| true).await;
    next_value_where(&mut mine, |_| true).await;

    data.service().create_post(new_post("b@y.com", "Theirs")).await.unwrap();
    data.service().create_post(new_post("a@x.com", "Mine")).await.unwrap();

    let everything = next_value_where(&mut all, |p| p.len() == 2).await;
    assert_eq!(titles(&everything), vec!["Mine", "Theirs"]);
    let own = next_value_where(&mut mine, |p| !p.is_empty()).await;
    assert_eq!(titles(&own), vec!["Mine"]);
}

#[tokio::test]
async fn unbinding_stops_the_standing_query() {
    let data = live_service(Duration::ZERO);
    let hub = LiveQueryHub::new(data.clone());

    let first = hub.bind(list_key(), |_| {});
    let second = hub.bind(list_key(), |_| {});
    assert_eq!(data.open_queries(), 1);

    drop(first);
    assert_eq!(data.open_queries(), 1);
    drop(second);
    assert_eq!(data.open_queries(), 0);
}

#[tokio::test]
async fn unknown_queries_surface_as_errors() {
    let data = live_service(Duration::ZERO);
    let hub = LiveQueryHub::new(data.clone());
    let key = QueryKey::without_args("posts:archive");
    let _binding = hub.bind(key.clone(), |_| {});

    assert_eq!(
        hub.state(&key),
        Some(QueryResult::Error(ServiceError::unknown_function("posts:archive")))
    );
    assert_eq!(data.open_queries(), 0);
}

#[tokio::test]
async fn created_post_replaces_placeholders_everywhere() {
    let data = live_service(Duration::ZERO);
    let hub = LiveQueryHub::new(data.clone());
    let session = SessionCache::shared();
    let controller = PostsController::new(
        MutationDispatcher::new(hub.clone(), data.clone()),
        session.clone(),
    );

    let feed = ReconciledFeed::mount(&hub, list_key(), placeholder_posts(Utc::now()));
    let owned = OwnedPostsView::mount(&hub, list_key(), &session);
    let mut stream = hub.watch(list_key());
    next_value_where(&mut stream, |_| true).await;
    assert_eq!(feed.current().origin, ListOrigin::Placeholder);

    session.begin_login().unwrap();
    session.complete_login(alice()).unwrap();
    let id = controller
        .create_post(PostDraft::new("Live post", "Body"))
        .await
        .unwrap();
    assert!(!id.is_provisional());

    next_value_where(&mut stream, |p| p.iter().any(|post| post.id == id)).await;
    let view = feed.current();
    assert_eq!(view.origin, ListOrigin::Live);
    assert_eq!(titles(&view.items), vec!["Live post"]);
    assert_eq!(owned.posts().len(), 1);
    assert_eq!(owned.posts()[0].id, id);

    session.logout();
    assert!(owned.is_empty());
}

#[tokio::test]
async fn foreign_edit_is_rejected_and_rolled_back() {
    let data = live_service(Duration::ZERO);
    let hub = LiveQueryHub::new(data.clone());
    let session = SessionCache::shared();
    let controller = PostsController::new(
        MutationDispatcher::new(hub.clone(), data.clone()),
        session.clone(),
    );

    let post = data
        .service()
        .create_post(new_post("a@x.com", "Alice's"))
        .await
        .unwrap();
    let mut stream = hub.watch(list_key());
    let before = next_value_where(&mut stream, |p| p.len() == 1).await;

    session.begin_login().unwrap();
    session.complete_login(bob()).unwrap();
    let err = controller
        .update_post(post.id.clone(), PostDraft::new("Hijacked", "Body"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PostsControllerError::Sync(LiveSyncError::mutation_rejected(
            "Unauthorized to edit this post"
        ))
    );
    assert_eq!(hub.state(&list_key()), Some(QueryResult::Value(before)));
    assert!(hub.pending_mutations(&list_key()).is_empty());
}

#[tokio::test]
async fn mutations_are_dispatched_by_wire_name() {
    let data = live_service(Duration::ZERO);
    let gateway: Arc<dyn MutationGateway> = data.clone();

    let id = gateway
        .mutate(MutationCall::new(
            CREATE_POST,
            json!({ "title": "T", "body": "B", "authorId": "a@x.com", "authorName": "Alice" }),
        ))
        .await
        .unwrap();
    assert!(id.is_string());

    let err = gateway
        .mutate(MutationCall::new(CREATE_POST, json!({ "title": "T" })))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArguments { .. }));

    let err = gateway
        .mutate(MutationCall::new(
            CREATE_POST,
            json!({ "title": "T", "body": "B", "authorId": "", "authorName": "" }),
        ))
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::rejected("Must be logged in to create a post"));

    let err = gateway
        .mutate(MutationCall::new("posts:archive", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::unknown_function("posts:archive"));

    let first = gateway
        .mutate(MutationCall::new(
            STORE_USER,
            json!({ "tokenIdentifier": "a@x.com", "name": "Alice" }),
        ))
        .await
        .unwrap();
    let again = gateway
        .mutate(MutationCall::new(
            STORE_USER,
            json!({ "tokenIdentifier": "a@x.com", "name": "Alice" }),
        ))
        .await
        .unwrap();
    assert_eq!(first, again);

    let seeded = gateway.mutate(MutationCall::new(SEED_DEMO, json!({}))).await.unwrap();
    assert_eq!(seeded["success"], true);
    assert_eq!(data.service().list_posts().await.unwrap().len(), 3);
}

#[tokio::test]
async fn webhook_stores_new_users_and_ignores_other_events() {
    let data = live_service(Duration::ZERO);
    let body = json!({
        "type": "user.created",
        "data": {
            "email_addresses": [{ "email_address": "c@z.com" }],
            "first_name": "Carol"
        }
    })
    .to_string();

    let outcome = webhook::handle(&*data, &body).await.unwrap();
    assert_eq!(
        outcome,
        webhook::WebhookOutcome::UserStored {
            token_identifier: "c@z.com".to_string()
        }
    );

    let ignored = webhook::handle(&*data, r#"{"type":"user.deleted","data":{}}"#)
        .await
        .unwrap();
    assert_eq!(
        ignored,
        webhook::WebhookOutcome::Ignored {
            event_type: "user.deleted".to_string()
        }
    );
}
