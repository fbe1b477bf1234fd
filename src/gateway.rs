use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest follower page the remote will hand out in one call.
pub const MAX_FOLLOWERS_PER_PAGE: u32 = 1000;

/// Largest number of recent posts fetched for one follower in one call.
pub const MAX_POSTS_PER_FOLLOWER: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque cursor for resuming follower enumeration after a page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationMarker(String);

impl ContinuationMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of followers, in the order the remote enumerated them.
/// `next_marker` is `None` once enumeration is exhausted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FollowerPage {
    pub ids: Vec<UserId>,
    pub next_marker: Option<ContinuationMarker>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub text: String,
    pub author_id: UserId,
    pub language: String,
}

/// Every post fetched for one follower, before filtering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowerPostBatch {
    pub author_id: UserId,
    pub posts: Vec<Post>,
}

impl FollowerPostBatch {
    pub fn empty(author_id: UserId) -> Self {
        Self {
            author_id,
            posts: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("account not found: {0}")]
    NotFound(String),

    #[error("continuation marker rejected: {0}")]
    InvalidMarker(String),

    #[error("rate limited by remote")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl GatewayError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited)
    }
}

/// The remote social graph: account lookup, follower listing and recent posts.
///
/// Implementations validate responses at this boundary so nothing downstream
/// sees wire shapes.
#[async_trait]
pub trait GraphGateway: Send + Sync {
    async fn resolve_account(&self, name: &str) -> Result<UserId, GatewayError>;

    async fn list_followers(
        &self,
        user_id: &UserId,
        max_count: u32,
        marker: Option<&ContinuationMarker>,
    ) -> Result<FollowerPage, GatewayError>;

    /// Recent original posts (reposts excluded), each carrying its language.
    async fn list_recent_posts(
        &self,
        user_id: &UserId,
        max_count: u32,
    ) -> Result<Vec<Post>, GatewayError>;
}
