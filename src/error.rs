use crate::gateway::GatewayError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    FetchFollowers,
    FetchPosts,
    Filter,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FetchFollowers => "fetch-followers",
            Stage::FetchPosts => "fetch-posts",
            Stage::Filter => "filter",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid account name {0:?}")]
    InvalidAccount(String),

    #[error("{stage}: seed account {account:?} not found")]
    NotFound { stage: Stage, account: String },

    #[error("{stage}: continuation marker rejected: {message}")]
    InvalidMarker { stage: Stage, message: String },

    #[error("{stage}: still rate limited after {attempts} attempts")]
    RateLimited { stage: Stage, attempts: u32 },

    #[error("{stage}: {source}")]
    Gateway {
        stage: Stage,
        #[source]
        source: GatewayError,
    },

    #[error("persist: could not write {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("persist: no unused artifact name left for {0:?}")]
    NamesExhausted(String),

    #[error("run cancelled before persist")]
    Cancelled,
}

impl HarvestError {
    /// The stage a fatal error aborted, if it happened inside one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            HarvestError::NotFound { stage, .. }
            | HarvestError::InvalidMarker { stage, .. }
            | HarvestError::RateLimited { stage, .. }
            | HarvestError::Gateway { stage, .. } => Some(*stage),
            HarvestError::Persist { .. } | HarvestError::NamesExhausted(_) => Some(Stage::Persist),
            HarvestError::Config(_) | HarvestError::InvalidAccount(_) | HarvestError::Cancelled => {
                None
            }
        }
    }
}
