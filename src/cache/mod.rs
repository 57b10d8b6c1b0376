//! Fingerprint-keyed cache of previously gathered context.
//!
//! Independent of the state store: it has its own directory, index and lock,
//! and nothing in the engine waits on it.

pub mod context_cache;
pub mod fingerprint;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use context_cache::{CacheEntry, CacheLookup, CacheStats, CacheStatus, ContextCache, IndexEntry};
pub use fingerprint::{fingerprint, Fingerprint, NOISE_DIRS};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("'{0}' is not a fingerprint")]
    InvalidFingerprint(String),
}

impl CacheError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
