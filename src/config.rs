use crate::backoff::RetryPolicy;
use crate::error::{HarvestError, Result};
use crate::filter::ActivityCriteria;
use regex::Regex;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

pub const BEARER_TOKEN_VAR: &str = "TWITTER_BEARER_TOKEN";

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_POSTS_PER_FOLLOWER: u32 = 50;
pub const DEFAULT_MIN_POSTS: usize = 10;
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Credentials {
    pub bearer_token: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        match env::var(BEARER_TOKEN_VAR) {
            Ok(token) if !token.trim().is_empty() => Ok(Self {
                bearer_token: token.trim().to_string(),
            }),
            _ => Err(HarvestError::Config(format!("{BEARER_TOKEN_VAR} is not set"))),
        }
    }
}

// NB: hand-rolled so the token never ends up in logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

/// Tuning for one run, independent of which account is harvested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarvestConfig {
    pub language: String,
    pub min_posts: usize,
    pub posts_per_follower: u32,
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            min_posts: DEFAULT_MIN_POSTS,
            posts_per_follower: DEFAULT_POSTS_PER_FOLLOWER,
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl HarvestConfig {
    pub fn criteria(&self) -> ActivityCriteria {
        ActivityCriteria {
            language: self.language.clone(),
            min_posts: self.min_posts,
        }
    }
}

/// Twitter handles are 1-15 word characters; anything else is rejected before
/// it reaches the network or the file system.
pub fn validate_account(name: &str) -> Result<()> {
    static HANDLE: OnceLock<Regex> = OnceLock::new();
    let handle = HANDLE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]{1,15}$").expect("handle pattern compiles")
    });
    if handle.is_match(name) {
        Ok(())
    } else {
        Err(HarvestError::InvalidAccount(name.to_string()))
    }
}
