use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

use crate::contract::model::{NewPost, NewUser, Post, PostEdit, PostId, User};
use crate::demo::{self, DEMO_USER_NAME, DEMO_USER_TOKEN};
use crate::domain::error::DomainError;
use crate::domain::events::PostDomainEvent;
use crate::domain::ports::EventPublisher;
use crate::domain::repo::PostsRepository;

/// Domain service with the posts business rules.
/// Depends only on the repository and publisher ports, not on infra types.
#[derive(Clone)]
pub struct Service {
    repo: Arc<dyn PostsRepository>,
    events: Arc<dyn EventPublisher<PostDomainEvent>>,
    clock: Arc<MonotonicClock>,
    config: ServiceConfig,
}

/// Configuration for the domain service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub max_title_length: usize,
    pub max_body_length: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_title_length: 200,
            max_body_length: 20_000,
        }
    }
}

/// Wall clock that never hands out the same instant twice.
#[derive(Default)]
struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

impl Service {
    /// Create a service with dependencies.
    pub fn new(
        repo: Arc<dyn PostsRepository>,
        events: Arc<dyn EventPublisher<PostDomainEvent>>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            repo,
            events,
            clock: Arc::new(MonotonicClock::default()),
            config,
        }
    }

    #[instrument(name = "blog_posts.service.list_posts", skip(self))]
    pub async fn list_posts(&self) -> Result<Vec<Post>, DomainError> {
        let posts = self
            .repo
            .list_newest_first()
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        debug!("Listed {} posts", posts.len());
        Ok(posts)
    }

    #[instrument(name = "blog_posts.service.posts_by_author", skip(self))]
    pub async fn posts_by_author(&self, author_id: &str) -> Result<Vec<Post>, DomainError> {
        let posts = self
            .repo
            .list_by_author(author_id)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        debug!("Listed {} posts for author", posts.len());
        Ok(posts)
    }

    #[instrument(
        name = "blog_posts.service.create_post",
        skip(self, new_post),
        fields(author_id = %new_post.author_id)
    )]
    pub async fn create_post(&self, new_post: NewPost) -> Result<Post, DomainError> {
        info!("Creating new post");

        if new_post.author_id.trim().is_empty() {
            return Err(DomainError::not_logged_in());
        }
        self.validate_content(&new_post.title, &new_post.body, new_post.image_url.as_ref())?;

        let post = Post {
            id: PostId::new(Uuid::new_v4().simple().to_string()),
            title: new_post.title,
            body: new_post.body,
            author_id: new_post.author_id,
            author_name: new_post.author_name,
            image_ref: new_post.image_url,
            created_at: self.clock.now(),
        };

        self.repo
            .insert(post.clone())
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;

        self.events.publish(&PostDomainEvent::Created {
            id: post.id.clone(),
            author_id: post.author_id.clone(),
            at: post.created_at,
        });

        info!("Successfully created post with id={}", post.id);
        Ok(post)
    }

    #[instrument(
        name = "blog_posts.service.update_post",
        skip(self, edit),
        fields(post_id = %edit.post_id, author_id = %edit.author_id)
    )]
    pub async fn update_post(&self, edit: PostEdit) -> Result<Post, DomainError> {
        info!("Updating post");

        let current = self.authorized_post(&edit.post_id, &edit.author_id, "edit").await?;
        self.validate_content(&edit.title, &edit.body, edit.image_url.as_ref())?;

        let post = Post {
            title: edit.title,
            body: edit.body,
            image_ref: edit.image_url,
            ..current
        };

        self.repo
            .update(post.clone())
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;

        self.events.publish(&PostDomainEvent::Updated {
            id: post.id.clone(),
            author_id: post.author_id.clone(),
            at: Utc::now(),
        });

        info!("Successfully updated post");
        Ok(post)
    }

    #[instrument(
        name = "blog_posts.service.delete_post",
        skip(self),
        fields(post_id = %id)
    )]
    pub async fn delete_post(&self, id: &PostId, author_id: &str) -> Result<(), DomainError> {
        info!("Deleting post");

        let post = self.authorized_post(id, author_id, "delete").await?;

        let deleted = self
            .repo
            .delete(&post.id)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        if !deleted {
            // Removed concurrently between lookup and delete.
            return Err(DomainError::not_post_author("delete"));
        }

        self.events.publish(&PostDomainEvent::Deleted {
            id: post.id,
            author_id: post.author_id,
            at: Utc::now(),
        });

        info!("Successfully deleted post");
        Ok(())
    }

    #[instrument(
        name = "blog_posts.service.store_user",
        skip(self, new_user),
        fields(token = %new_user.token_identifier)
    )]
    pub async fn store_user(&self, new_user: NewUser) -> Result<User, DomainError> {
        if new_user.token_identifier.trim().is_empty() {
            return Err(DomainError::validation("tokenIdentifier", "must not be empty"));
        }

        if let Some(existing) = self
            .repo
            .find_user(&new_user.token_identifier)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?
        {
            debug!("User already stored");
            return Ok(existing);
        }

        let user = self
            .repo
            .insert_user_if_absent(User {
                id: Uuid::new_v4(),
                token_identifier: new_user.token_identifier,
                name: new_user.name,
                profile_image: new_user.profile_image,
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;

        info!("Stored user with id={}", user.id);
        Ok(user)
    }

    /// Replace every post with the demo set, making sure the demo user exists.
    #[instrument(name = "blog_posts.service.seed_demo", skip(self))]
    pub async fn seed_demo(&self) -> Result<usize, DomainError> {
        info!("Seeding demo data");

        self.store_user(NewUser {
            token_identifier: DEMO_USER_TOKEN.to_string(),
            name: DEMO_USER_NAME.to_string(),
            profile_image: None,
        })
        .await?;

        let removed = self
            .repo
            .delete_all()
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        debug!("Removed {} existing posts", removed);

        let now = self.clock.now();
        let posts = demo::seed_posts(now, || PostId::new(Uuid::new_v4().simple().to_string()));
        let count = posts.len();
        for post in posts {
            self.repo
                .insert(post)
                .await
                .map_err(|e| DomainError::database(e.to_string()))?;
        }

        self.events.publish(&PostDomainEvent::Reset { at: now });

        info!("Seeded {} demo posts", count);
        Ok(count)
    }

    /// The post `id` if it exists and belongs to `author_id`.
    async fn authorized_post(
        &self,
        id: &PostId,
        author_id: &str,
        action: &'static str,
    ) -> Result<Post, DomainError> {
        let found = self
            .repo
            .find_by_id(id)
            .await
            .map_err(|e| DomainError::database(e.to_string()))?;
        match found {
            Some(post) if post.author_id == author_id => Ok(post),
            Some(_) => {
                debug!("Post belongs to another author");
                Err(DomainError::not_post_author(action))
            }
            None => {
                debug!("Post does not exist");
                Err(DomainError::not_post_author(action))
            }
        }
    }

    fn validate_content(
        &self,
        title: &str,
        body: &str,
        image_url: Option<&Url>,
    ) -> Result<(), DomainError> {
        if title.trim().is_empty() {
            return Err(DomainError::empty_field("title"));
        }
        if body.trim().is_empty() {
            return Err(DomainError::empty_field("body"));
        }

        let title_len = title.chars().count();
        if title_len > self.config.max_title_length {
            return Err(DomainError::too_long("title", title_len, self.config.max_title_length));
        }
        let body_len = body.chars().count();
        if body_len > self.config.max_body_length {
            return Err(DomainError::too_long("body", body_len, self.config.max_body_length));
        }

        if let Some(url) = image_url {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(DomainError::validation(
                    "imageUrl",
                    format!("unsupported scheme '{}'", url.scheme()),
                ));
            }
        }
        Ok(())
    }
}
