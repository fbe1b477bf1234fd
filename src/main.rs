use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use follower_harvest::config::{self, Credentials, HarvestConfig};
use follower_harvest::gateway::{MAX_FOLLOWERS_PER_PAGE, MAX_POSTS_PER_FOLLOWER};
use follower_harvest::sink::ResultSink;
use follower_harvest::twitter_client::TwitterClient;
use follower_harvest::{ContinuationMarker, Harvester, RunRequest};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Save recent posts written by the followers of a Twitter account.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Twitter username of the account to extract.
    account: String,

    /// Followers fetched in this run.
    #[arg(short, long, default_value_t = config::DEFAULT_PAGE_SIZE,
          value_parser = clap::value_parser!(u32).range(1..=MAX_FOLLOWERS_PER_PAGE as i64))]
    count: u32,

    /// Resume after the page that printed this token.
    #[arg(short = 't', long)]
    next_token: Option<String>,

    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Language code posts must be written in.
    #[arg(long, default_value = config::DEFAULT_LANGUAGE)]
    lang: String,

    /// Matching posts a follower needs before any of them are kept.
    #[arg(long, default_value_t = config::DEFAULT_MIN_POSTS)]
    min_posts: usize,

    #[arg(long, default_value_t = config::DEFAULT_POSTS_PER_FOLLOWER,
          value_parser = clap::value_parser!(u32).range(5..=MAX_POSTS_PER_FOLLOWER as i64))]
    posts_per_follower: u32,

    /// Followers whose posts are fetched at the same time.
    #[arg(long, default_value_t = config::DEFAULT_CONCURRENCY as u32,
          value_parser = clap::value_parser!(u32).range(1..=16))]
    concurrency: u32,

    /// Seconds one follower fetch may take before it is skipped.
    #[arg(long, default_value_t = config::DEFAULT_FETCH_TIMEOUT.as_secs(),
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("follower_harvest=info".parse()?),
        )
        .init();

    if let Err(err) = run(args).await {
        error!("{err:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let harvest_config = HarvestConfig {
        language: args.lang,
        min_posts: args.min_posts,
        posts_per_follower: args.posts_per_follower,
        concurrency: args.concurrency as usize,
        fetch_timeout: Duration::from_secs(args.timeout_secs),
        ..HarvestConfig::default()
    };

    let sink = ResultSink::create(&args.data_dir)
        .with_context(|| format!("Preparing {}", args.data_dir.display()))?;
    let harvester = Harvester::new(TwitterClient::new(&credentials), sink, harvest_config);

    let abort = harvester.abort_handle();
    ctrlc::set_handler(move || {
        warn!("Interrupted, nothing will be saved");
        abort.store(true, Ordering::SeqCst);
    })?;

    let summary = harvester
        .run(RunRequest {
            account: args.account,
            page_size: args.count,
            marker: args.next_token.map(ContinuationMarker::new),
        })
        .await?;

    // NB: stdout carries only the token so it can be piped into the next run
    match summary.next_marker {
        Some(marker) => println!("{marker}"),
        None => println!("exhausted"),
    }
    Ok(())
}
