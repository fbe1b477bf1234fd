pub mod api;

use crate::config::Credentials;
use crate::gateway::{
    ContinuationMarker, FollowerPage, GatewayError, GraphGateway, Post, UserId,
    MAX_FOLLOWERS_PER_PAGE, MAX_POSTS_PER_FOLLOWER,
};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use nonzero_ext::nonzero;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

const API_BASE: &str = "https://api.twitter.com/2";

/// The user timeline endpoint refuses page sizes below this.
const MIN_POSTS_PER_CALL: u32 = 5;

/// Requests per minute shared by every call made through one client.
pub fn default_quota() -> Quota {
    Quota::per_minute(nonzero!(60u32)).allow_burst(nonzero!(5u32))
}

pub struct TwitterClient {
    https_client: Client<HttpsConnector<HttpConnector>>,
    bearer_token: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl TwitterClient {
    pub fn new(credentials: &Credentials) -> Self {
        Self::with_quota(credentials, default_quota())
    }

    pub fn with_quota(credentials: &Credentials, quota: Quota) -> Self {
        let https = HttpsConnector::new();
        let https_client = Client::builder().build::<_, hyper::Body>(https);
        Self {
            https_client,
            bearer_token: credentials.bearer_token.clone(),
            limiter: RateLimiter::direct(quota),
        }
    }

    async fn get<Data: DeserializeOwned>(
        &self,
        uri: Url,
        sent_marker: bool,
    ) -> Result<api::Response<Data>, GatewayError> {
        self.limiter.until_ready().await;
        debug!(uri = %uri, "GET");

        let req = Request::builder()
            .method(Method::GET)
            .uri(uri.as_str())
            .header("Authorization", format!("Bearer {}", self.bearer_token))
            .body(Body::empty())
            .map_err(|err| GatewayError::Network(err.to_string()))?;

        let resp = self.https_client.request(req).await?;
        let status = resp.status();
        let body = hyper::body::to_bytes(resp.into_body()).await?;

        if !status.is_success() {
            return Err(classify_failure(status, &body, sent_marker));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl GraphGateway for TwitterClient {
    async fn resolve_account(&self, name: &str) -> Result<UserId, GatewayError> {
        let uri = endpoint(&format!("users/by/username/{name}"))?;
        let resp: api::Response<api::User> = self.get(uri, false).await?;
        match resp.data {
            Some(user) => Ok(UserId::new(user.id)),
            None => Err(GatewayError::NotFound(
                resp.errors
                    .first()
                    .map(api::ApiError::describe)
                    .unwrap_or_else(|| name.to_string()),
            )),
        }
    }

    async fn list_followers(
        &self,
        user_id: &UserId,
        max_count: u32,
        marker: Option<&ContinuationMarker>,
    ) -> Result<FollowerPage, GatewayError> {
        let mut uri = endpoint(&format!("users/{user_id}/followers"))?;
        uri.query_pairs_mut().append_pair(
            "max_results",
            &max_count.clamp(1, MAX_FOLLOWERS_PER_PAGE).to_string(),
        );
        if let Some(marker) = marker {
            uri.query_pairs_mut()
                .append_pair("pagination_token", marker.as_str());
        }

        let resp: api::Response<Vec<api::User>> = self.get(uri, marker.is_some()).await?;
        follower_page(resp, marker.is_some())
    }

    async fn list_recent_posts(
        &self,
        user_id: &UserId,
        max_count: u32,
    ) -> Result<Vec<Post>, GatewayError> {
        let mut uri = endpoint(&format!("users/{user_id}/tweets"))?;
        uri.query_pairs_mut()
            .append_pair(
                "max_results",
                &max_count
                    .clamp(MIN_POSTS_PER_CALL, MAX_POSTS_PER_FOLLOWER)
                    .to_string(),
            )
            .append_pair("exclude", "retweets")
            .append_pair("tweet.fields", "lang,author_id");

        let resp: api::Response<Vec<api::Tweet>> = self.get(uri, false).await?;
        into_posts(user_id, resp.data.unwrap_or_default())
    }
}

impl From<hyper::Error> for GatewayError {
    fn from(err: hyper::Error) -> Self {
        GatewayError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Parse(err.to_string())
    }
}

fn endpoint(path: &str) -> Result<Url, GatewayError> {
    Url::parse(&format!("{API_BASE}/{path}"))
        .map_err(|err| GatewayError::Parse(format!("bad endpoint {path:?}: {err}")))
}

/// A 200 can still carry `errors` instead of `data`; that is a failure, not
/// an exhausted enumeration.
fn follower_page(
    resp: api::Response<Vec<api::User>>,
    sent_marker: bool,
) -> Result<FollowerPage, GatewayError> {
    if resp.data.is_none() {
        if let Some(err) = resp.errors.first() {
            let message = err.describe();
            return Err(if sent_marker {
                GatewayError::InvalidMarker(message)
            } else {
                GatewayError::Api {
                    status: StatusCode::OK.as_u16(),
                    message,
                }
            });
        }
    }

    Ok(FollowerPage {
        ids: resp
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|user| UserId::new(user.id))
            .collect(),
        next_marker: resp
            .meta
            .and_then(|meta| meta.next_token)
            .map(ContinuationMarker::new),
    })
}

/// Every post must carry a language; the author falls back to the account
/// whose timeline was requested.
fn into_posts(user_id: &UserId, tweets: Vec<api::Tweet>) -> Result<Vec<Post>, GatewayError> {
    tweets
        .into_iter()
        .map(|tweet| {
            let language = tweet
                .lang
                .ok_or_else(|| GatewayError::Parse(format!("tweet {} has no lang", tweet.id)))?;
            Ok(Post {
                text: tweet.text,
                author_id: tweet.author_id.map_or_else(|| user_id.clone(), UserId::new),
                language,
            })
        })
        .collect()
}

fn classify_failure(status: StatusCode, body: &[u8], sent_marker: bool) -> GatewayError {
    let problem: api::Problem = serde_json::from_slice(body).unwrap_or_default();
    let message = problem
        .errors
        .first()
        .map(api::ApiError::describe)
        .or(problem.detail)
        .or(problem.title)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    match status {
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited,
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        // CR: the remote has no dedicated error type for stale tokens, so sniff the body
        StatusCode::BAD_REQUEST
            if sent_marker && String::from_utf8_lossy(body).contains("pagination_token") =>
        {
            GatewayError::InvalidMarker(message)
        }
        status => GatewayError::Api {
            status: status.as_u16(),
            message,
        },
    }
}
