pub mod client;
pub mod error;
pub mod model;

pub use client::BlogPostsApi;
pub use error::BlogPostsError;
pub use model::{NewPost, NewUser, Post, PostEdit, PostId, User};
