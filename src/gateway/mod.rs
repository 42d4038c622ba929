//! Gateway to the external PDF → structured-text parser.
//!
//! The parser works directory-to-directory: every PDF in the input directory
//! produces exactly one artifact in the output directory.
//!
//! | Outcome | Artifact                  |
//! |---------|---------------------------|
//! | parsed  | `{stem}.tei.xml`          |
//! | failed  | `{stem}_{code}.txt`       |
//!
//! A file with no artifact at all was never processed (for instance because
//! the batch timed out) and gets no Reference in this run.
//!
//! - **[`GrobidGateway`]**: talks to a GROBID server over HTTP.
//!
//! Implement [`ParserGateway`] to plug in another parser, or a fake in tests.

pub mod grobid;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ParseMode;
use crate::error::Result;

pub use grobid::GrobidGateway;

/// One directory-to-directory parser invocation.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub mode: ParseMode,
    /// Re-parse files whose success artifact already exists.
    pub force: bool,
    /// Deadline for the whole batch.
    pub timeout: Duration,
}

#[async_trait]
pub trait ParserGateway: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Parse every PDF in `request.input_dir`, writing one artifact per file
    /// into `request.output_dir`. Blocks until the batch finishes.
    ///
    /// # Errors
    ///
    /// - [`CorpusError::ServiceUnavailable`](crate::error::CorpusError::ServiceUnavailable)
    ///   when the service cannot be reached; no retry happens here.
    /// - [`CorpusError::ParserTimeout`](crate::error::CorpusError::ParserTimeout)
    ///   when the batch outlives its deadline.
    ///
    /// Artifacts written before an error stay in place.
    async fn process(&self, request: &ParseRequest) -> Result<()>;
}

pub fn success_artifact_name(stem: &str) -> String {
    format!("{stem}.tei.xml")
}

pub fn failure_artifact_name(stem: &str, code: u16) -> String {
    format!("{stem}_{code}.txt")
}

/// What the parser left behind for one staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Success(PathBuf),
    Failure { path: PathBuf, code: String },
    Missing,
}

/// Look up the artifact for `stem` in `output_dir`.
pub fn classify_output(output_dir: &Path, stem: &str) -> ParseOutcome {
    let success = output_dir.join(success_artifact_name(stem));
    if success.is_file() {
        return ParseOutcome::Success(success);
    }
    match failure_artifacts(output_dir, stem).into_iter().next() {
        Some((path, code)) => ParseOutcome::Failure { path, code },
        None => ParseOutcome::Missing,
    }
}

/// Failure artifacts for exactly `stem`; `paper_v2_500.txt` belongs to
/// `paper_v2`, not to `paper`.
fn failure_artifacts(output_dir: &Path, stem: &str) -> Vec<(PathBuf, String)> {
    let Ok(entries) = std::fs::read_dir(output_dir) else {
        return Vec::new();
    };
    let mut found: Vec<(PathBuf, String)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .filter_map(|p| {
            let file_stem = p.file_stem()?.to_string_lossy().to_string();
            let (owner, code) = file_stem.rsplit_once('_')?;
            (owner == stem).then(|| (p.clone(), code.to_string()))
        })
        .collect();
    found.sort();
    found
}

/// Delete every artifact the parser may have written for `stem`.
pub fn remove_artifacts(output_dir: &Path, stem: &str) -> std::io::Result<()> {
    remove_if_exists(&output_dir.join(success_artifact_name(stem)))?;
    for (path, _) in failure_artifacts(output_dir, stem) {
        remove_if_exists(&path)?;
    }
    Ok(())
}

pub(crate) fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
