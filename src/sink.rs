use crate::error::{HarvestError, Result};
use crate::gateway::{ContinuationMarker, Post, UserId};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Highest suffix tried before giving up on finding a free artifact name.
pub const MAX_ARTIFACT_SUFFIX: u32 = 100_000;

const HEADERS: [&str; 4] = ["tweet", "user_id", "account", "next_token"];

/// One output line. Every row of a run carries the same `next_token`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Row {
    pub tweet: String,
    pub user_id: UserId,
    pub account: String,
    pub next_token: Option<ContinuationMarker>,
}

impl Row {
    pub fn stamp(
        posts: Vec<Post>,
        account: &str,
        next_token: Option<&ContinuationMarker>,
    ) -> Vec<Row> {
        posts
            .into_iter()
            .map(|post| Row {
                tweet: post.text,
                user_id: post.author_id,
                account: account.to_string(),
                next_token: next_token.cloned(),
            })
            .collect()
    }
}

/// Writes one CSV artifact per run under a fixed directory, never reusing a
/// name that already exists. Next to it, `<account>-<n>.next_token` holds the
/// run's next token (empty once enumeration is exhausted), so the token is
/// kept on disk even when no rows survive.
#[derive(Debug, Clone)]
pub struct ResultSink {
    dir: PathBuf,
}

impl ResultSink {
    /// Creates the output directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| HarvestError::Persist {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, account: &str, suffix: u32) -> PathBuf {
        self.dir.join(format!("{account}-{suffix}.csv"))
    }

    pub fn marker_path(artifact: &Path) -> PathBuf {
        artifact.with_extension("next_token")
    }

    /// Lowest suffix with no artifact on disk. Only a hint: `persist` claims
    /// the name atomically and moves on if someone else took it first.
    pub fn next_free_suffix(&self, account: &str) -> Result<u32> {
        (0..=MAX_ARTIFACT_SUFFIX)
            .find(|suffix| !self.artifact_path(account, *suffix).exists())
            .ok_or_else(|| HarvestError::NamesExhausted(account.to_string()))
    }

    pub fn persist(
        &self,
        account: &str,
        posts: Vec<Post>,
        next_token: Option<&ContinuationMarker>,
    ) -> Result<PathBuf> {
        let rows = Row::stamp(posts, account, next_token);
        let (path, file) = self.claim(account)?;

        // NB: a half-written artifact would look like a finished run
        if let Err(source) = write_rows(file, &rows) {
            discard(&path);
            return Err(HarvestError::Persist { path, source });
        }
        let marker_path = Self::marker_path(&path);
        if let Err(source) = write_marker(&marker_path, next_token) {
            discard(&path);
            return Err(HarvestError::Persist {
                path: marker_path,
                source,
            });
        }

        info!(path = %path.display(), rows = rows.len(), "Wrote artifact");
        Ok(path)
    }

    fn claim(&self, account: &str) -> Result<(PathBuf, File)> {
        let mut suffix = self.next_free_suffix(account)?;
        while suffix <= MAX_ARTIFACT_SUFFIX {
            let path = self.artifact_path(account, suffix);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(source) => return Err(HarvestError::Persist { path, source }),
            }
        }
        Err(HarvestError::NamesExhausted(account.to_string()))
    }
}

fn write_rows(file: File, rows: &[Row]) -> io::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    // Written by hand so an empty run still records its columns.
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let mut file = writer.into_inner().map_err(|err| err.into_error())?;
    file.flush()?;
    file.sync_all()
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "Could not remove partial artifact");
    }
}

fn write_marker(path: &Path, next_token: Option<&ContinuationMarker>) -> io::Result<()> {
    let mut file = File::create(path)?;
    let written = match next_token {
        Some(marker) => file.write_all(marker.as_str().as_bytes()),
        None => Ok(()),
    }
    .and_then(|()| file.sync_all());
    if written.is_err() {
        discard(path);
    }
    written
}
