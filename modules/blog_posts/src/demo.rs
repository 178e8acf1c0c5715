//! Demo content: the client-side placeholder shown before any real post
//! exists, and the server-side seed set.

use chrono::{DateTime, Duration, Utc};
use url::Url;

use crate::contract::model::{Post, PostId};

pub const DEMO_USER_TOKEN: &str = "demo@example.com";
pub const DEMO_USER_NAME: &str = "Demo User";
pub const DEMO_AUTHOR_NAME: &str = "Manager";

const WEBSITE_IMAGE: &str =
    "https://images.unsplash.com/photo-1487180144351-b8472da7d491?w=500&h=300&fit=crop";
const TEAM_IMAGE: &str =
    "https://images.unsplash.com/photo-1552664730-d307ca884978?w=500&h=300&fit=crop";
const LOREM: &str =
    "Lorem ipsum dolor sit amet, consectetur adipiscing elit. Lorem ipsum standard dummy text.";

fn demo_post(id: PostId, title: &str, body: String, image: &str, created_at: DateTime<Utc>) -> Post {
    Post {
        id,
        title: title.to_string(),
        body,
        author_id: DEMO_USER_TOKEN.to_string(),
        author_name: DEMO_AUTHOR_NAME.to_string(),
        image_ref: Url::parse(image).ok(),
        created_at,
    }
}

/// Placeholder list (`demo-1`..`demo-3`), dated one to three days before `now`.
pub fn placeholder_posts(now: DateTime<Utc>) -> Vec<Post> {
    [
        (
            "Make Your Website",
            "Learn how to create stunning websites with modern technologies.",
            WEBSITE_IMAGE,
        ),
        (
            "Web Development Best Practices",
            "Discover best practices for modern web development.",
            TEAM_IMAGE,
        ),
        (
            "Getting Started with React",
            "A comprehensive guide to getting started with React.",
            TEAM_IMAGE,
        ),
    ]
    .into_iter()
    .zip(1..)
    .map(|((title, tail, image), n)| {
        demo_post(
            PostId::new(format!("demo-{n}")),
            title,
            format!("{LOREM} {tail}"),
            image,
            now - Duration::days(n),
        )
    })
    .collect()
}

/// Seed posts stored by `posts:seedDemo`; ids come from `next_id`.
pub(crate) fn seed_posts(now: DateTime<Utc>, mut next_id: impl FnMut() -> PostId) -> Vec<Post> {
    [WEBSITE_IMAGE, TEAM_IMAGE, TEAM_IMAGE]
        .into_iter()
        .zip(1..)
        .map(|(image, n)| {
            demo_post(
                next_id(),
                "Make Your Website",
                LOREM.to_string(),
                image,
                now - Duration::days(n),
            )
        })
        .collect()
}
