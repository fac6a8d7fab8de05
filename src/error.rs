use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtfError {
    #[error("failed to create temp directory under {root}: {source}")]
    TempDir { root: PathBuf, source: io::Error },

    #[error("failed to create temp file in {dir}: {source}")]
    TempFile { dir: PathBuf, source: io::Error },

    #[error("failed to write extracted object: {0}")]
    Write(io::Error),

    #[error("failed to remove temp file {path}: {source}")]
    Unlink { path: PathBuf, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("downstream scanner failed: {0}")]
    Scanner(String),

    #[error("threat detected: {0}")]
    Detected(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RtfError>;
