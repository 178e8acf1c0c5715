use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::contract::model::{Post, PostId, User};
use crate::domain::repo::PostsRepository;

/// In-memory implementation of the repository port.
#[derive(Default)]
pub struct InMemoryPostsRepository {
    posts: RwLock<HashMap<PostId, Post>>,
    users: DashMap<String, User>,
}

impl InMemoryPostsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted<'a>(posts: impl Iterator<Item = &'a Post>) -> Vec<Post> {
        let mut out: Vec<Post> = posts.cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        out
    }
}

#[async_trait]
impl PostsRepository for InMemoryPostsRepository {
    async fn list_newest_first(&self) -> Result<Vec<Post>> {
        Ok(Self::sorted(self.posts.read().values()))
    }

    async fn list_by_author(&self, author_id: &str) -> Result<Vec<Post>> {
        let posts = self.posts.read();
        Ok(Self::sorted(posts.values().filter(|p| p.author_id == author_id)))
    }

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>> {
        Ok(self.posts.read().get(id).cloned())
    }

    async fn insert(&self, post: Post) -> Result<()> {
        let mut posts = self.posts.write();
        if posts.contains_key(&post.id) {
            bail!("duplicate post id {}", post.id);
        }
        posts.insert(post.id.clone(), post);
        Ok(())
    }

    async fn update(&self, post: Post) -> Result<()> {
        match self.posts.write().get_mut(&post.id) {
            Some(slot) => {
                *slot = post;
                Ok(())
            }
            None => bail!("post {} does not exist", post.id),
        }
    }

    async fn delete(&self, id: &PostId) -> Result<bool> {
        Ok(self.posts.write().remove(id).is_some())
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut posts = self.posts.write();
        let n = posts.len();
        posts.clear();
        Ok(n)
    }

    async fn find_user(&self, token_identifier: &str) -> Result<Option<User>> {
        Ok(self.users.get(token_identifier).map(|u| u.value().clone()))
    }

    async fn insert_user_if_absent(&self, user: User) -> Result<User> {
        let stored = self
            .users
            .entry(user.token_identifier.clone())
            .or_insert(user);
        Ok(stored.value().clone())
    }
}
