//! Error types for indexing and searching.
//!
//! Cancellation is not represented here: a cancelled run ends with a status
//! value (see [`Outcome`]), not an error.

use crate::index::types::Generation;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of an indexing run or an index query
#[derive(Debug, Error)]
pub enum IndexError {
    /// The file could not be opened, stat-ed or read
    #[error("cannot read {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A query referred to a snapshot that has since been replaced
    #[error("index generation {held} is stale, current generation is {current}")]
    IndexStale { held: Generation, current: Generation },

    /// The offset table could not grow
    #[error("not enough memory to index {lines} lines")]
    OutOfMemory { lines: usize },
}

impl IndexError {
    pub fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IndexError::FileUnreadable {
            path: path.into(),
            source,
        }
    }

    /// Stale snapshots are a signal to refetch, not a real failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::IndexStale { .. })
    }
}

/// Failures of a search or filter pass
#[derive(Debug, Error)]
pub enum SearchError {
    /// The pattern did not compile; reported before any line is read
    #[error("invalid pattern {pattern:?}: {source}")]
    PatternInvalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Reading line content failed mid-pass
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Terminal status of a long-running operation that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}
