use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use arc_swap::ArcSwapOption;
use tracing::{debug, info, instrument};

use crate::config::BlogPostsConfig;
use crate::contract::client::BlogPostsApi;
use crate::domain::service::{Service, ServiceConfig};
use crate::gateways::live::LiveDataService;
use crate::gateways::local::BlogPostsLocalClient;
use crate::infra::change_feed::ChangeFeed;
use crate::infra::storage::InMemoryPostsRepository;

/// Owns the posts service and its live facade once initialized.
#[derive(Default)]
pub struct BlogPostsModule {
    service: ArcSwapOption<Service>,
    live: ArcSwapOption<LiveDataService>,
}

impl BlogPostsModule {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(name = "blog_posts.module.init", skip_all)]
    pub async fn init(&self, cfg: &BlogPostsConfig) -> anyhow::Result<()> {
        debug!(
            "Loaded blog_posts config: max_title_length={}, max_body_length={}, push_delay_ms={}",
            cfg.max_title_length, cfg.max_body_length, cfg.push_delay_ms
        );

        let repo = Arc::new(InMemoryPostsRepository::new());
        let feed = ChangeFeed::new(cfg.change_feed_capacity);
        let service = Arc::new(Service::new(
            repo,
            Arc::new(feed.clone()),
            ServiceConfig {
                max_title_length: cfg.max_title_length,
                max_body_length: cfg.max_body_length,
            },
        ));

        if cfg.seed_demo_data {
            service
                .seed_demo()
                .await
                .context("failed to seed demo data")?;
        }

        let live = Arc::new(LiveDataService::new(
            service.clone(),
            feed,
            Duration::from_millis(cfg.push_delay_ms),
        ));
        self.service.store(Some(service));
        self.live.store(Some(live));

        info!("blog_posts module initialized");
        Ok(())
    }

    /// In-process client for other modules.
    pub fn api(&self) -> anyhow::Result<Arc<dyn BlogPostsApi>> {
        let service = self
            .service
            .load_full()
            .ok_or_else(|| anyhow!("blog_posts module is not initialized"))?;
        Ok(Arc::new(BlogPostsLocalClient::new(service)))
    }

    /// The reactive data service the live-sync core binds to.
    pub fn data_service(&self) -> anyhow::Result<Arc<LiveDataService>> {
        self.live
            .load_full()
            .ok_or_else(|| anyhow!("blog_posts module is not initialized"))
    }
}
