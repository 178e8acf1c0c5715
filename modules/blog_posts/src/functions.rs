//! Wire names of the data-service functions and the query keys built on them.

use live_sync::QueryKey;
use serde_json::json;

pub const LIST_POSTS: &str = "posts:list";
pub const POSTS_BY_AUTHOR: &str = "posts:byAuthor";
pub const CREATE_POST: &str = "posts:create";
pub const UPDATE_POST: &str = "posts:update";
pub const DELETE_POST: &str = "posts:delete";
pub const STORE_USER: &str = "users:store";
pub const SEED_DEMO: &str = "posts:seedDemo";

/// Key of the all-posts list.
pub fn list_key() -> QueryKey {
    QueryKey::without_args(LIST_POSTS)
}

/// Key of one author's posts.
pub fn by_author_key(author_id: &str) -> QueryKey {
    QueryKey::new(POSTS_BY_AUTHOR, json!({ "authorId": author_id }))
}
