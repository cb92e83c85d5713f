//! Error types for robomanip.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Refusing to overwrite existing file: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("NPY error: {0}")]
    Npy(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Environment '{env}' matches both train keyword '{train}' and test keyword '{test}'")]
    SplitOverlap {
        env: String,
        train: String,
        test: String,
    },

    #[error("Process error: {0}")]
    Process(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error on {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
