use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::{
    client::BlogPostsApi,
    error::BlogPostsError,
    model::{NewPost, NewUser, Post, PostEdit, PostId, User},
};
use crate::domain::service::Service;

/// Local implementation of the BlogPostsApi trait that delegates to the domain service
pub struct BlogPostsLocalClient {
    service: Arc<Service>,
}

impl BlogPostsLocalClient {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl BlogPostsApi for BlogPostsLocalClient {
    async fn list_posts(&self) -> Result<Vec<Post>, BlogPostsError> {
        self.service.list_posts().await.map_err(Into::into)
    }

    async fn posts_by_author(&self, author_id: &str) -> Result<Vec<Post>, BlogPostsError> {
        self.service
            .posts_by_author(author_id)
            .await
            .map_err(Into::into)
    }

    async fn create_post(&self, new_post: NewPost) -> Result<Post, BlogPostsError> {
        self.service.create_post(new_post).await.map_err(Into::into)
    }

    async fn update_post(&self, edit: PostEdit) -> Result<Post, BlogPostsError> {
        self.service.update_post(edit).await.map_err(Into::into)
    }

    async fn delete_post(&self, id: &PostId, author_id: &str) -> Result<(), BlogPostsError> {
        self.service
            .delete_post(id, author_id)
            .await
            .map_err(Into::into)
    }

    async fn store_user(&self, new_user: NewUser) -> Result<User, BlogPostsError> {
        self.service.store_user(new_user).await.map_err(Into::into)
    }

    async fn seed_demo(&self) -> Result<usize, BlogPostsError> {
        self.service.seed_demo().await.map_err(Into::into)
    }
}
