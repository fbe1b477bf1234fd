use crate::backoff::{retry_rate_limited, RetryPolicy};
use crate::error::{HarvestError, Result, Stage};
use crate::gateway::{
    FollowerPostBatch, GatewayError, GraphGateway, UserId, MAX_POSTS_PER_FOLLOWER,
};
use futures_util::{future, stream, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Batches for one page of followers, in follower page order.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub batches: Vec<FollowerPostBatch>,
    /// Followers whose fetch failed or timed out and were counted as empty.
    pub degraded: Vec<UserId>,
}

pub struct PostFetcher<'a, G> {
    gateway: &'a G,
    retry: &'a RetryPolicy,
    max_posts: u32,
    concurrency: usize,
    timeout: Duration,
    abort: Option<&'a AtomicBool>,
}

impl<'a, G: GraphGateway> PostFetcher<'a, G> {
    pub fn new(
        gateway: &'a G,
        retry: &'a RetryPolicy,
        max_posts: u32,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            retry,
            max_posts: max_posts.clamp(1, MAX_POSTS_PER_FOLLOWER),
            concurrency: concurrency.max(1),
            timeout,
            abort: None,
        }
    }

    /// Stops handing out new follower fetches once `abort` is set.
    pub fn with_abort(mut self, abort: &'a AtomicBool) -> Self {
        self.abort = Some(abort);
        self
    }

    fn aborted(&self) -> bool {
        self.abort.map_or(false, |abort| abort.load(Ordering::SeqCst))
    }

    /// Fetches every follower with at most `concurrency` calls in flight.
    /// Results come back in the order of `followers`, whatever order the calls
    /// finish in. Only rate-limit exhaustion aborts; any other failure leaves
    /// that follower with an empty batch. An abort lets in-flight calls finish
    /// but schedules no more, and fails with `Cancelled`.
    pub async fn fetch_all(&self, followers: Vec<UserId>) -> Result<FetchReport> {
        let outcomes: Vec<(FollowerPostBatch, bool)> = stream::iter(followers)
            .take_while(|_| future::ready(!self.aborted()))
            .map(|follower| self.fetch_one(follower))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        if self.aborted() {
            return Err(HarvestError::Cancelled);
        }

        let mut report = FetchReport::default();
        for (batch, degraded) in outcomes {
            if degraded {
                report.degraded.push(batch.author_id.clone());
            }
            report.batches.push(batch);
        }
        Ok(report)
    }

    /// The `bool` is set when the batch was degraded to empty.
    pub async fn fetch_one(&self, follower: UserId) -> Result<(FollowerPostBatch, bool)> {
        let id = &follower;
        let fetched = retry_rate_limited(self.retry, || async move {
            tokio::time::timeout(self.timeout, self.gateway.list_recent_posts(id, self.max_posts))
                .await
                .unwrap_or(Err(GatewayError::Timeout))
        })
        .await;

        match fetched {
            Ok(posts) => {
                debug!(follower = %follower, posts = posts.len(), "Fetched posts");
                Ok((
                    FollowerPostBatch {
                        author_id: follower,
                        posts,
                    },
                    false,
                ))
            }
            Err(GatewayError::RateLimited) => Err(HarvestError::RateLimited {
                stage: Stage::FetchPosts,
                attempts: self.retry.max_attempts.max(1),
            }),
            Err(err) => {
                warn!(follower = %follower, error = %err, "Could not fetch posts, skipping follower");
                Ok((FollowerPostBatch::empty(follower), true))
            }
        }
    }
}
