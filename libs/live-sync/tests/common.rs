#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use live_sync::{Identity, Post, PostId};

pub fn post(id: &str, author: &str, title: &str) -> Post {
    Post {
        id: PostId::new(id),
        title: title.to_string(),
        body: format!("body of {title}"),
        author_id: author.to_string(),
        author_name: author.split('@').next().unwrap_or(author).to_string(),
        image_ref: None,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
    }
}

/// The three demo posts shown before any real post exists.
pub fn demo_posts() -> Vec<Post> {
    (1..=3)
        .map(|n| {
            let mut p = post(&format!("demo-{n}"), "demo@example.com", &format!("Demo {n}"));
            p.author_name = "Manager".to_string();
            p.created_at = p.created_at - Duration::days(n);
            p
        })
        .collect()
}

pub fn alice() -> Identity {
    Identity::new("a@x.com", "Alice")
}

pub fn bob() -> Identity {
    Identity::new("b@y.com", "Bob")
}

pub fn ids(posts: &[Post]) -> Vec<String> {
    posts.iter().map(|p| p.id.to_string()).collect()
}
