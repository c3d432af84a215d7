use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config declares no targets")]
    NoTargets,

    #[error("duplicate target name: {0}")]
    DuplicateTarget(String),

    #[error("empty target name")]
    EmptyTargetName,

    #[error("simulation needs at least two targets, got {0}")]
    TooFewTargets(usize),

    #[error("simulation task failed: {0}")]
    TaskFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;
