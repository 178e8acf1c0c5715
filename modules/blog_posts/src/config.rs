use serde::{Deserialize, Serialize};

/// Configuration for the blog_posts module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlogPostsConfig {
    #[serde(default = "default_max_title_length")]
    pub max_title_length: usize,
    #[serde(default = "default_max_body_length")]
    pub max_body_length: usize,
    /// Delay before a freshly opened live query pushes its first value.
    #[serde(default)]
    pub push_delay_ms: u64,
    /// Replace all posts with the demo set on startup.
    #[serde(default)]
    pub seed_demo_data: bool,
    #[serde(default = "default_change_feed_capacity")]
    pub change_feed_capacity: usize,
}

impl Default for BlogPostsConfig {
    fn default() -> Self {
        Self {
            max_title_length: default_max_title_length(),
            max_body_length: default_max_body_length(),
            push_delay_ms: 0,
            seed_demo_data: false,
            change_feed_capacity: default_change_feed_capacity(),
        }
    }
}

fn default_max_title_length() -> usize {
    200
}

fn default_max_body_length() -> usize {
    20_000
}

fn default_change_feed_capacity() -> usize {
    1024
}
