use crate::config::{validate_account, HarvestConfig};
use crate::error::{HarvestError, Result, Stage};
use crate::fetcher::PostFetcher;
use crate::filter::filter_batches;
use crate::gateway::{ContinuationMarker, GraphGateway, UserId};
use crate::pager::FollowerPager;
use crate::sink::ResultSink;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

/// What to harvest in one run.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub account: String,
    pub page_size: u32,
    /// Resume follower enumeration after this point; `None` starts over.
    pub marker: Option<ContinuationMarker>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub artifact: PathBuf,
    /// Holds `next_marker` on disk, even when the artifact has no rows.
    pub marker_file: PathBuf,
    pub followers: usize,
    pub degraded: Vec<UserId>,
    pub qualifying_followers: usize,
    pub rows: usize,
    /// Hand this to the next run to continue with the following page.
    pub next_marker: Option<ContinuationMarker>,
}

/// One page of followers, their posts, filtered and written out. Nothing is
/// written unless every stage before persisting succeeds.
pub struct Harvester<G> {
    gateway: G,
    sink: ResultSink,
    config: HarvestConfig,
    abort: Arc<AtomicBool>,
}

impl<G: GraphGateway> Harvester<G> {
    pub fn new(gateway: G, sink: ResultSink, config: HarvestConfig) -> Self {
        Self {
            gateway,
            sink,
            config,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an existing abort flag, e.g. one a signal handler already owns.
    pub fn with_abort_handle(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Flag checked between stages and before each follower fetch; once set
    /// the run stops and nothing is written.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    fn check_abort(&self) -> Result<()> {
        if self.abort.load(Ordering::SeqCst) {
            return Err(HarvestError::Cancelled);
        }
        Ok(())
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunSummary> {
        validate_account(&request.account)?;
        let span = info_span!("harvest", account = %request.account);
        self.run_stages(request).instrument(span).await
    }

    async fn run_stages(&self, request: RunRequest) -> Result<RunSummary> {
        let config = &self.config;

        self.check_abort()?;
        info!(stage = %Stage::FetchFollowers, page_size = request.page_size, "Getting followers");
        let pager = FollowerPager::new(&self.gateway, &config.retry);
        let seed = pager.resolve(&request.account).await?;
        self.check_abort()?;
        let page = pager
            .page(&seed, request.page_size, request.marker.as_ref())
            .await?;
        let followers = page.ids.len();

        self.check_abort()?;
        info!(stage = %Stage::FetchPosts, followers, "Getting posts of followers");
        let fetcher = PostFetcher::new(
            &self.gateway,
            &config.retry,
            config.posts_per_follower,
            config.concurrency,
            config.fetch_timeout,
        )
        .with_abort(&self.abort);
        let report = fetcher.fetch_all(page.ids).await?;

        info!(
            stage = %Stage::Filter,
            language = %config.language,
            min_posts = config.min_posts,
            "Filtering posts"
        );
        let filtered = filter_batches(report.batches, &config.criteria());
        let rows = filtered.posts.len();

        self.check_abort()?;
        info!(stage = %Stage::Persist, rows, "Saving posts");
        let artifact = self
            .sink
            .persist(&request.account, filtered.posts, page.next_marker.as_ref())?;

        let summary = RunSummary {
            marker_file: ResultSink::marker_path(&artifact),
            artifact,
            followers,
            degraded: report.degraded,
            qualifying_followers: filtered.qualifying_followers,
            rows,
            next_marker: page.next_marker,
        };
        info!(
            followers = summary.followers,
            degraded = summary.degraded.len(),
            qualifying = summary.qualifying_followers,
            rows = summary.rows,
            exhausted = summary.next_marker.is_none(),
            "Done"
        );
        Ok(summary)
    }
}
