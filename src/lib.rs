pub mod backoff;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod gateway;
pub mod pager;
pub mod pipeline;
pub mod sink;
pub mod twitter_client;

pub use error::{HarvestError, Result, Stage};
pub use gateway::{ContinuationMarker, FollowerPage, FollowerPostBatch, GraphGateway, Post, UserId};
pub use pipeline::{Harvester, RunRequest, RunSummary};
