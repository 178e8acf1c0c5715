use async_trait::async_trait;

use crate::contract::model::{Post, PostId, User};

/// Port for the domain layer: persistence operations the domain needs.
/// Object-safe and async-friendly via `async_trait`.
#[async_trait]
pub trait PostsRepository: Send + Sync {
    /// All posts, newest first.
    async fn list_newest_first(&self) -> anyhow::Result<Vec<Post>>;
    /// One author's posts, newest first.
    async fn list_by_author(&self, author_id: &str) -> anyhow::Result<Vec<Post>>;
    async fn find_by_id(&self, id: &PostId) -> anyhow::Result<Option<Post>>;
    /// Insert a new post. Fails if the id is taken.
    async fn insert(&self, post: Post) -> anyhow::Result<()>;
    /// Replace an existing post by id.
    async fn update(&self, post: Post) -> anyhow::Result<()>;
    /// Delete by id. Returns true if a row was deleted.
    async fn delete(&self, id: &PostId) -> anyhow::Result<bool>;
    /// Delete every post. Returns how many were removed.
    async fn delete_all(&self) -> anyhow::Result<usize>;

    async fn find_user(&self, token_identifier: &str) -> anyhow::Result<Option<User>>;
    /// Insert unless the token is already known; returns the stored user.
    async fn insert_user_if_absent(&self, user: User) -> anyhow::Result<User>;
}
