//! Scripted reader/author session: everything a user does on the pages,
//! driven through the live-sync core against the in-process data service.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use blog_posts::config::BlogPostsConfig;
use blog_posts::demo::placeholder_posts;
use blog_posts::functions::list_key;
use blog_posts::{BlogPostsModule, PostDraft, PostsController};
use chrono::Utc;
use futures::{Stream, StreamExt};
use live_sync::{
    Access, Credentials, LiveQueryHub, LoginFlow, MutationDispatcher, OwnedPostsView, Post,
    QueryResult, ReconciledFeed, Route, RouteGuard, SessionCache,
};
use runtime::AppConfig;
use tracing::{info, instrument};

pub const POSTS_MODULE: &str = "blog_posts";

const DEMO_EMAIL: &str = "reader@example.com";
const DEMO_PASSWORD: &str = "secret1";
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

fn titles(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|p| p.title.as_str()).collect()
}

/// Wait for the next pushed list satisfying `pred`.
async fn wait_for<S, F>(stream: &mut S, what: &str, push_delay: Duration, pred: F) -> Result<Vec<Post>>
where
    S: Stream<Item = QueryResult<Vec<Post>>> + Unpin,
    F: Fn(&[Post]) -> bool,
{
    let next = async {
        while let Some(result) = stream.next().await {
            match result {
                QueryResult::Value(posts) if pred(&posts) => return Ok(posts),
                QueryResult::Error(err) => bail!("live query failed: {err}"),
                _ => {}
            }
        }
        bail!("live query ended")
    };
    tokio::time::timeout(STEP_TIMEOUT + push_delay, next)
        .await
        .with_context(|| format!("timed out waiting for {what}"))?
}

#[instrument(name = "blog_demo.session.run", skip_all)]
pub async fn run(config: &AppConfig) -> Result<()> {
    let posts_cfg: BlogPostsConfig = config.module_config(POSTS_MODULE)?;
    let push_delay = Duration::from_millis(posts_cfg.push_delay_ms);

    let module = BlogPostsModule::new();
    module.init(&posts_cfg).await?;
    let data = module.data_service()?;

    let hub = LiveQueryHub::new(data.clone());
    let session = SessionCache::shared();
    let controller = PostsController::new(
        MutationDispatcher::new(hub.clone(), data.clone()),
        session.clone(),
    );
    let login = LoginFlow::new(session.clone(), data.clone());
    let guard = RouteGuard::new(session.clone());

    // Public home and dashboard views, mounted before any data arrives.
    let feed = ReconciledFeed::mount_with(
        &hub,
        list_key(),
        placeholder_posts(Utc::now()),
        |view| {
            info!(
                origin = ?view.origin,
                degraded = view.degraded,
                titles = ?titles(&view.items),
                "Public feed rendered"
            )
        },
    );
    let owned = OwnedPostsView::mount_with(&hub, list_key(), &session, |posts| {
        info!(count = posts.len(), titles = ?titles(posts), "Your Blogs rendered")
    });
    let mut live = hub.watch(list_key());

    wait_for(&mut live, "the first live list", push_delay, |_| true).await?;

    if let Access::Redirect(to) = guard.check(&Route::Dashboard) {
        info!(redirect = %to, "Dashboard requires a signed-in user");
    }

    let identity = login
        .sign_in(&Credentials {
            email: DEMO_EMAIL.to_string(),
            password: DEMO_PASSWORD.to_string(),
        })
        .context("demo sign-in failed")?;
    let (landing, _) = guard.resolve(Route::Landing);
    info!(user = %identity.id, landing = %landing, "Signed in");

    let id = controller
        .create_post(PostDraft::new(
            "Hello from blog-demo",
            "Written through the optimistic dispatcher.",
        ))
        .await?;
    wait_for(&mut live, "the new post", push_delay, |posts| {
        posts.iter().any(|p| p.id == id)
    })
    .await?;
    info!(post_id = %id, owned = owned.len(), "Post published");

    controller
        .update_post(
            id.clone(),
            PostDraft::new("Hello again", "Edited in place; the list order is unchanged."),
        )
        .await?;
    wait_for(&mut live, "the edited post", push_delay, |posts| {
        posts.iter().any(|p| p.id == id && p.title == "Hello again")
    })
    .await?;

    controller.delete_post(id.clone()).await?;
    wait_for(&mut live, "the deletion", push_delay, |posts| {
        posts.iter().all(|p| p.id != id)
    })
    .await?;

    session.logout();
    if !owned.is_empty() {
        bail!("owned view still shows posts after logout");
    }
    let view = feed.current();
    info!(
        origin = ?view.origin,
        shown = view.items.len(),
        empty_state = view.is_empty_state(),
        "Session finished"
    );

    drop(live);
    drop(owned);
    drop(feed);
    info!(open_queries = data.open_queries(), "Views unmounted");
    Ok(())
}
