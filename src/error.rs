//! Error taxonomy for the reference corpus.
//!
//! Per-file parse failures are not errors: they become References with
//! `status = failure`. Everything here is a store-level or run-level failure.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    /// Store path or reference id absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store file exists but cannot be parsed.
    #[error("corrupt reference store at {path}: {source}")]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The external parser could not be reached (or stopped answering).
    #[error("parser service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("parser batch exceeded its deadline of {0:?}")]
    ParserTimeout(Duration),

    /// A request was missing a valid selector or carried an invalid patch.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CorpusError>;

impl CorpusError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CorpusError::NotFound(_))
    }
}
