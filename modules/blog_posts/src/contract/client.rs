use async_trait::async_trait;

use crate::contract::{
    error::BlogPostsError,
    model::{NewPost, NewUser, Post, PostEdit, PostId, User},
};

/// Public API trait for the blog_posts module that other modules can use
#[async_trait]
pub trait BlogPostsApi: Send + Sync {
    /// Every post, newest first
    async fn list_posts(&self) -> Result<Vec<Post>, BlogPostsError>;

    /// Posts written by `author_id`, newest first
    async fn posts_by_author(&self, author_id: &str) -> Result<Vec<Post>, BlogPostsError>;

    async fn create_post(&self, new_post: NewPost) -> Result<Post, BlogPostsError>;

    async fn update_post(&self, edit: PostEdit) -> Result<Post, BlogPostsError>;

    async fn delete_post(&self, id: &PostId, author_id: &str) -> Result<(), BlogPostsError>;

    /// Idempotent: returns the already stored user for a known token
    async fn store_user(&self, new_user: NewUser) -> Result<User, BlogPostsError>;

    /// Replace every post with the demo set; returns the number inserted
    async fn seed_demo(&self) -> Result<usize, BlogPostsError>;
}
