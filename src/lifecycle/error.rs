use std::path::PathBuf;
use thiserror::Error;

use crate::cache::BackendError;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot at {path} is unreadable: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("snapshot format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("failed to encode snapshot: {0}")]
    Encode(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
