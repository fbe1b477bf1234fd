use crate::backoff::{retry_rate_limited, RetryPolicy};
use crate::error::{HarvestError, Result, Stage};
use crate::gateway::{
    ContinuationMarker, FollowerPage, GatewayError, GraphGateway, UserId, MAX_FOLLOWERS_PER_PAGE,
};
use itertools::Itertools;
use tracing::{debug, info};

/// Fetches exactly one page of followers per call. Walking further pages is
/// up to the caller, by handing back the returned marker on a later run.
pub struct FollowerPager<'a, G> {
    gateway: &'a G,
    retry: &'a RetryPolicy,
}

impl<'a, G: GraphGateway> FollowerPager<'a, G> {
    pub fn new(gateway: &'a G, retry: &'a RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    pub async fn resolve(&self, account: &str) -> Result<UserId> {
        retry_rate_limited(self.retry, || self.gateway.resolve_account(account))
            .await
            .map_err(|err| match err {
                GatewayError::NotFound(_) => HarvestError::NotFound {
                    stage: Stage::FetchFollowers,
                    account: account.to_string(),
                },
                err => self.fatal(err),
            })
    }

    pub async fn page(
        &self,
        seed: &UserId,
        count: u32,
        marker: Option<&ContinuationMarker>,
    ) -> Result<FollowerPage> {
        let count = count.clamp(1, MAX_FOLLOWERS_PER_PAGE);
        debug!(seed = %seed, count, marker = ?marker, "Listing followers");

        let page = retry_rate_limited(self.retry, || {
            self.gateway.list_followers(seed, count, marker)
        })
        .await
        .map_err(|err| match err {
            GatewayError::InvalidMarker(message) => HarvestError::InvalidMarker {
                stage: Stage::FetchFollowers,
                message,
            },
            err => self.fatal(err),
        })?;

        let received = page.ids.len();
        let ids: Vec<UserId> = page.ids.into_iter().unique().collect();
        if ids.len() != received {
            debug!(
                dropped = received - ids.len(),
                "Dropped repeated follower ids"
            );
        }
        info!(
            followers = ids.len(),
            exhausted = page.next_marker.is_none(),
            "Fetched follower page"
        );

        Ok(FollowerPage {
            ids,
            next_marker: page.next_marker,
        })
    }

    fn fatal(&self, err: GatewayError) -> HarvestError {
        match err {
            GatewayError::RateLimited => HarvestError::RateLimited {
                stage: Stage::FetchFollowers,
                attempts: self.retry.max_attempts.max(1),
            },
            source => HarvestError::Gateway {
                stage: Stage::FetchFollowers,
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Post;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves a fixed follower list; the marker is the offset of the next page.
    struct ListGateway {
        followers: Vec<&'static str>,
        throttled_calls: Mutex<u32>,
    }

    impl ListGateway {
        fn new(followers: Vec<&'static str>) -> Self {
            Self {
                followers,
                throttled_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl GraphGateway for ListGateway {
        async fn resolve_account(&self, name: &str) -> std::result::Result<UserId, GatewayError> {
            if name == "seed" {
                Ok(UserId::new("1"))
            } else {
                Err(GatewayError::NotFound(name.to_string()))
            }
        }

        async fn list_followers(
            &self,
            _user_id: &UserId,
            max_count: u32,
            marker: Option<&ContinuationMarker>,
        ) -> std::result::Result<FollowerPage, GatewayError> {
            {
                let mut throttled = self.throttled_calls.lock().unwrap();
                if *throttled > 0 {
                    *throttled -= 1;
                    return Err(GatewayError::RateLimited);
                }
            }
            let start = match marker {
                Some(marker) => marker
                    .as_str()
                    .parse::<usize>()
                    .map_err(|_| GatewayError::InvalidMarker(marker.to_string()))?,
                None => 0,
            };
            let end = (start + max_count as usize).min(self.followers.len());
            Ok(FollowerPage {
                ids: self.followers[start..end].iter().map(|id| UserId::new(*id)).collect(),
                next_marker: (end < self.followers.len())
                    .then(|| ContinuationMarker::new(end.to_string())),
            })
        }

        async fn list_recent_posts(
            &self,
            _user_id: &UserId,
            _max_count: u32,
        ) -> std::result::Result<Vec<Post>, GatewayError> {
            Ok(Vec::new())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn ids(page: &FollowerPage) -> Vec<&str> {
        page.ids.iter().map(UserId::as_str).collect()
    }

    #[tokio::test]
    async fn test_unknown_seed_is_not_found() {
        let gateway = ListGateway::new(vec![]);
        let retry = policy();
        let pager = FollowerPager::new(&gateway, &retry);

        let err = pager.resolve("ghost").await.unwrap_err();
        assert!(matches!(err, HarvestError::NotFound { stage: Stage::FetchFollowers, .. }));
    }

    #[tokio::test]
    async fn test_same_marker_yields_same_page() {
        let gateway = ListGateway::new(vec!["a", "b", "c", "d", "e"]);
        let retry = policy();
        let pager = FollowerPager::new(&gateway, &retry);
        let seed = pager.resolve("seed").await.unwrap();
        let marker = ContinuationMarker::new("1");

        let first = pager.page(&seed, 2, Some(&marker)).await.unwrap();
        let second = pager.page(&seed, 2, Some(&marker)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(ids(&first), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_consecutive_pages_match_one_larger_page() {
        let gateway = ListGateway::new(vec!["a", "b", "c", "d", "e", "f", "g"]);
        let retry = policy();
        let pager = FollowerPager::new(&gateway, &retry);
        let seed = UserId::new("1");
        let t1 = ContinuationMarker::new("1");

        let first = pager.page(&seed, 3, Some(&t1)).await.unwrap();
        let second = pager
            .page(&seed, 3, first.next_marker.as_ref())
            .await
            .unwrap();
        let whole = pager.page(&seed, 6, Some(&t1)).await.unwrap();

        assert!(first.ids.iter().all(|id| !second.ids.contains(id)));
        let joined: Vec<&str> = ids(&first).into_iter().chain(ids(&second)).collect();
        assert_eq!(joined, ids(&whole));
        assert_eq!(second.next_marker, None);
    }

    #[tokio::test]
    async fn test_repeated_ids_are_dropped_in_order() {
        let gateway = ListGateway::new(vec!["a", "b", "a", "c", "b"]);
        let retry = policy();
        let pager = FollowerPager::new(&gateway, &retry);

        let page = pager.page(&UserId::new("1"), 100, None).await.unwrap();
        assert_eq!(ids(&page), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_rejected_marker_is_surfaced() {
        let gateway = ListGateway::new(vec!["a"]);
        let retry = policy();
        let pager = FollowerPager::new(&gateway, &retry);
        let stale = ContinuationMarker::new("not-an-offset");

        let err = pager
            .page(&UserId::new("1"), 10, Some(&stale))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::InvalidMarker { .. }));
    }

    #[tokio::test]
    async fn test_throttling_recovers_then_escalates() {
        let gateway = ListGateway::new(vec!["a", "b"]);
        let retry = policy();
        let pager = FollowerPager::new(&gateway, &retry);
        let seed = UserId::new("1");

        *gateway.throttled_calls.lock().unwrap() = 2;
        let page = pager.page(&seed, 10, None).await.unwrap();
        assert_eq!(ids(&page), vec!["a", "b"]);

        *gateway.throttled_calls.lock().unwrap() = 3;
        let err = pager.page(&seed, 10, None).await.unwrap_err();
        assert!(matches!(
            err,
            HarvestError::RateLimited { stage: Stage::FetchFollowers, attempts: 3 }
        ));
    }
}
