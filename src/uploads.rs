use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;

/// List `*.pdf` files (any extension case) directly inside `dir`, sorted by
/// file name. A missing directory has no uploads.
pub fn list_pdf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "directory does not exist; no PDFs");
        return Ok(Vec::new());
    }

    let matcher = pdf_matcher()?;
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            files.push(entry.into_path());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// File name of a path as an owned string.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// File name without its final extension.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn pdf_matcher() -> Result<GlobMatcher> {
    let glob = GlobBuilder::new("*.pdf")
        .case_insensitive(true)
        .literal_separator(true)
        .build()
        .map_err(std::io::Error::other)?;
    Ok(glob.compile_matcher())
}
