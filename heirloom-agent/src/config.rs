//! Configuration for intent review.

use serde::{Deserialize, Serialize};

/// Configuration for the pre-execution plan review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReallocationConfig {
    /// Intent-match score (0-100) below which reallocation runs
    pub trigger_threshold: f64,
    /// Maximum posts fetched per review
    pub max_posts: usize,
    /// Token budget per LLM call
    pub max_tokens: u32,
    /// Sampling temperature per LLM call
    pub temperature: f32,
}

impl Default for ReallocationConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 50.0,
            max_posts: 20,
            max_tokens: 1024,
            temperature: 0.1,
        }
    }
}
