//! Social-data source.
//!
//! Recent public posts of a will owner, used as an independent signal of
//! intent. Always best-effort: callers treat a failure as "no posts".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A public post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialPost {
    pub content: String,
    pub date: DateTime<Utc>,
}

impl SocialPost {
    pub fn new(content: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            date,
        }
    }
}

/// Error types for social lookups.
#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    #[error("Unknown handle: {0}")]
    UnknownHandle(String),

    #[error("Social source unavailable: {0}")]
    Unavailable(String),
}

/// Source of a user's recent posts.
#[async_trait]
pub trait SocialSource: Send + Sync {
    /// Up to `limit` posts for `handle`, newest first. May be empty.
    async fn get_recent_posts(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Vec<SocialPost>, SocialError>;
}

/// Fixed posts per handle, for tests and offline runs.
#[derive(Debug, Default)]
pub struct StaticSocialSource {
    posts: HashMap<String, Vec<SocialPost>>,
    unavailable: bool,
}

impl StaticSocialSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register posts for a handle (leading `@` ignored).
    pub fn with_posts(mut self, handle: &str, posts: Vec<SocialPost>) -> Self {
        self.posts.insert(normalize_handle(handle), posts);
        self
    }

    /// Fail every lookup.
    pub fn unavailable() -> Self {
        Self {
            posts: HashMap::new(),
            unavailable: true,
        }
    }
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

#[async_trait]
impl SocialSource for StaticSocialSource {
    async fn get_recent_posts(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Vec<SocialPost>, SocialError> {
        if self.unavailable {
            return Err(SocialError::Unavailable("static source disabled".to_string()));
        }

        let mut posts = self
            .posts
            .get(&normalize_handle(handle))
            .cloned()
            .ok_or_else(|| SocialError::UnknownHandle(handle.to_string()))?;
        posts.sort_by(|a, b| b.date.cmp(&a.date));
        posts.truncate(limit);
        Ok(posts)
    }
}
