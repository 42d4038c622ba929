//! JSON-file-backed reference store.
//!
//! The whole project lives in one `references.json` array. The in-memory list
//! is the source of truth: every mutation rewrites the complete file through a
//! temporary sibling and a rename, so a crash never leaves a half-written
//! store behind.
//!
//! After every load or mutation the store rebuilds its [`Corpus`], the flat
//! chunk view the ranker reads.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::chunk::chunk_reference;
use crate::config::ChunkingConfig;
use crate::error::{CorpusError, Result};
use crate::models::{Chunk, DeleteRequest, IngestStatus, Reference, ReferencePatch};

/// Every chunk of every reference, in reference-then-chunk order, with three
/// parallel views: the chunk itself, its text, and its lowercase tokens.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub chunks: Vec<Chunk>,
    pub texts: Vec<String>,
    pub tokenized: Vec<Vec<String>>,
    /// Id of the reference each chunk belongs to.
    pub reference_ids: Vec<String>,
}

impl Corpus {
    fn build(references: &[Reference]) -> Self {
        let mut corpus = Corpus::default();
        for r in references {
            for chunk in &r.chunks {
                corpus.texts.push(chunk.text.clone());
                corpus.tokenized.push(tokenize(&chunk.text));
                corpus.reference_ids.push(r.id.clone());
                corpus.chunks.push(chunk.clone());
            }
        }
        corpus
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Lowercase, whitespace-split tokens. Queries and documents share this.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

#[derive(Debug)]
pub struct ReferenceStore {
    path: PathBuf,
    chunking: ChunkingConfig,
    references: Vec<Reference>,
    corpus: Corpus,
}

impl ReferenceStore {
    /// An empty, unloaded store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunking: ChunkingConfig::default(),
            references: Vec::new(),
            corpus: Corpus::default(),
        }
    }

    /// Chunking used when a patch replaces a reference's contents.
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Creates a store and loads it from `path`.
    pub fn open(path: impl Into<PathBuf>, chunking: ChunkingConfig) -> Result<Self> {
        let mut store = Self::new(path).with_chunking(chunking);
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory list with the file's contents.
    ///
    /// A missing file is [`CorpusError::NotFound`]; an existing file that is
    /// not a reference array is [`CorpusError::CorruptStore`]. `[]` loads as
    /// an empty store.
    pub fn load(&mut self) -> Result<()> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CorpusError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        self.references =
            serde_json::from_str(&content).map_err(|source| CorpusError::CorruptStore {
                path: self.path.clone(),
                source,
            })?;
        self.rebuild_corpus();
        debug!(
            path = %self.path.display(),
            references = self.references.len(),
            chunks = self.corpus.len(),
            "loaded reference store"
        );
        Ok(())
    }

    /// Writes the full list to disk, replacing the previous file atomically.
    pub fn save(&self) -> Result<()> {
        write_atomic(&self.path, &self.references)
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.id == id)
    }

    pub fn contains_source(&self, source_filename: &str) -> bool {
        self.references
            .iter()
            .any(|r| r.source_filename == source_filename)
    }

    /// Appends one reference and persists.
    pub fn add(&mut self, reference: Reference) -> Result<()> {
        self.extend(std::iter::once(reference))
    }

    /// Appends a batch in order and persists once.
    pub fn extend(&mut self, references: impl IntoIterator<Item = Reference>) -> Result<()> {
        let mut next = self.references.clone();
        next.extend(references);
        self.commit(next)
    }

    /// Merges `patch` onto the reference with `id` and persists.
    ///
    /// Only patched fields change. A patched `citation_key` must not belong to
    /// another reference, and a reference marked complete must keep contents.
    /// New contents are re-chunked.
    pub fn update(&mut self, id: &str, patch: &ReferencePatch) -> Result<()> {
        let idx = self
            .references
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CorpusError::NotFound(format!("reference {id}")))?;

        if let Some(Some(key)) = &patch.citation_key {
            let clash = self
                .references
                .iter()
                .any(|r| r.id != id && r.citation_key.as_deref() == Some(key.as_str()));
            if clash {
                return Err(CorpusError::Validation(format!(
                    "citation_key {key:?} is already in use"
                )));
            }
        }

        let mut updated = self.references[idx].clone();
        let contents_changed = patch.apply_to(&mut updated);
        if updated.status == IngestStatus::Complete && updated.contents.is_none() {
            return Err(CorpusError::Validation(
                "a complete reference must have contents".to_string(),
            ));
        }
        if contents_changed {
            updated.chunks = chunk_reference(&updated, &self.chunking);
        }

        let mut next = self.references.clone();
        next[idx] = updated;
        self.commit(next)
    }

    /// Removes the selected references and persists. Returns how many went.
    ///
    /// If any requested id is unknown nothing is removed.
    pub fn delete(&mut self, request: &DeleteRequest) -> Result<usize> {
        if !request.all && request.reference_ids.is_empty() {
            return Err(CorpusError::Validation(
                "delete needs reference_ids or all=true".to_string(),
            ));
        }

        let next = if request.all {
            Vec::new()
        } else {
            let known: HashSet<&str> = self.references.iter().map(|r| r.id.as_str()).collect();
            let unknown: Vec<&str> = request
                .reference_ids
                .iter()
                .map(String::as_str)
                .filter(|id| !known.contains(id))
                .collect();
            if !unknown.is_empty() {
                return Err(CorpusError::NotFound(format!(
                    "references {}",
                    unknown.join(", ")
                )));
            }
            let doomed: HashSet<&String> = request.reference_ids.iter().collect();
            self.references
                .iter()
                .filter(|r| !doomed.contains(&r.id))
                .cloned()
                .collect()
        };

        let removed = self.references.len() - next.len();
        self.commit(next)?;
        Ok(removed)
    }

    /// Persists `next`, then makes it the in-memory state. A failed write
    /// leaves both memory and disk as they were.
    fn commit(&mut self, next: Vec<Reference>) -> Result<()> {
        write_atomic(&self.path, &next)?;
        self.references = next;
        self.rebuild_corpus();
        Ok(())
    }

    fn rebuild_corpus(&mut self) {
        self.corpus = Corpus::build(&self.references);
    }
}

fn write_atomic(path: &Path, references: &[Reference]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(references)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use crate::models::Author;
    use tempfile::TempDir;

    fn reference(file: &str, key: &str, contents: &str) -> Reference {
        let mut r = Reference::new(file, IngestStatus::Complete);
        r.citation_key = Some(key.to_string());
        r.title = Some(format!("Title of {file}"));
        r.contents = Some(contents.to_string());
        r.authors = vec![Author::new("John Smith", None, None, None)];
        r.chunks = chunk_text(contents, 1000, 200);
        r
    }

    fn seeded(tmp: &TempDir) -> ReferenceStore {
        let mut store = ReferenceStore::new(tmp.path().join("references.json"));
        store.add(reference("a.pdf", "smith", "alpha text")).unwrap();
        store.add(reference("b.pdf", "smitha", "beta text")).unwrap();
        store.add(reference("c.pdf", "smithb", "gamma text")).unwrap();
        store
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = seeded(&tmp);
        let reopened = ReferenceStore::open(store.path(), ChunkingConfig::default()).unwrap();
        assert_eq!(reopened.references(), store.references());
        assert_eq!(reopened.corpus().texts, ["alpha text", "beta text", "gamma text"]);
        assert_eq!(reopened.corpus().tokenized[0], ["alpha", "text"]);
    }

    #[test]
    fn missing_file_differs_from_empty_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("references.json");
        let err = ReferenceStore::open(&path, ChunkingConfig::default()).unwrap_err();
        assert!(err.is_not_found());

        std::fs::write(&path, "[]").unwrap();
        let store = ReferenceStore::open(&path, ChunkingConfig::default()).unwrap();
        assert!(store.is_empty());
        assert!(store.corpus().is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("references.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ReferenceStore::open(&path, ChunkingConfig::default()).unwrap_err();
        assert!(matches!(err, CorpusError::CorruptStore { .. }), "{err}");
    }

    #[test]
    fn load_replaces_memory_state() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        std::fs::write(store.path(), "[]").unwrap();
        store.load().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn delete_all_empties_store() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        let removed = store
            .delete(&DeleteRequest {
                reference_ids: Vec::new(),
                all: true,
            })
            .unwrap();
        assert_eq!(removed, 3);
        let reopened = ReferenceStore::open(store.path(), ChunkingConfig::default()).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn delete_with_unknown_id_removes_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        let before = std::fs::read_to_string(store.path()).unwrap();
        let known = store.references()[0].id.clone();

        let err = store
            .delete(&DeleteRequest {
                reference_ids: vec![known, "no-such-id".to_string()],
                all: false,
            })
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.len(), 3);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn delete_needs_a_selector() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        let err = store.delete(&DeleteRequest::default()).unwrap_err();
        assert!(matches!(err, CorpusError::Validation(_)));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn delete_by_id_keeps_the_rest_in_order() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        let middle = store.references()[1].id.clone();
        store
            .delete(&DeleteRequest {
                reference_ids: vec![middle],
                all: false,
            })
            .unwrap();
        let files: Vec<&str> = store
            .references()
            .iter()
            .map(|r| r.source_filename.as_str())
            .collect();
        assert_eq!(files, ["a.pdf", "c.pdf"]);
        assert_eq!(store.corpus().texts, ["alpha text", "gamma text"]);
    }

    #[test]
    fn update_changes_only_patched_fields() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        let before = store.references().to_vec();
        let id = before[1].id.clone();

        let patch: ReferencePatch =
            serde_json::from_str(r#"{"title": "Renamed", "doi": "10.1/xyz"}"#).unwrap();
        store.update(&id, &patch).unwrap();

        let reopened = ReferenceStore::open(store.path(), ChunkingConfig::default()).unwrap();
        let after = reopened.references();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);

        let mut expected = before[1].clone();
        expected.title = Some("Renamed".into());
        expected.doi = Some("10.1/xyz".into());
        assert_eq!(after[1], expected);
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        let err = store
            .update("missing", &ReferencePatch::default())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn update_rejects_duplicate_citation_key() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        let id = store.references()[0].id.clone();
        let patch: ReferencePatch = serde_json::from_str(r#"{"citation_key": "smitha"}"#).unwrap();
        let err = store.update(&id, &patch).unwrap_err();
        assert!(matches!(err, CorpusError::Validation(_)));
        assert_eq!(store.references()[0].citation_key.as_deref(), Some("smith"));
    }

    #[test]
    fn update_rejects_complete_without_contents() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        let id = store.references()[0].id.clone();
        let patch: ReferencePatch = serde_json::from_str(r#"{"contents": null}"#).unwrap();
        assert!(matches!(
            store.update(&id, &patch),
            Err(CorpusError::Validation(_))
        ));
    }

    #[test]
    fn update_contents_rechunks() {
        let tmp = TempDir::new().unwrap();
        let mut store = ReferenceStore::new(tmp.path().join("references.json")).with_chunking(
            ChunkingConfig {
                chunk_size: 4,
                chunk_overlap: 0,
            },
        );
        store.add(reference("a.pdf", "smith", "ab")).unwrap();
        let id = store.references()[0].id.clone();

        let patch: ReferencePatch = serde_json::from_str(r#"{"contents": "abcdefgh"}"#).unwrap();
        store.update(&id, &patch).unwrap();

        let texts: Vec<&str> = store.references()[0]
            .chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(texts, ["abcd", "efgh"]);
        assert_eq!(store.corpus().texts, ["abcd", "efgh"]);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = seeded(&tmp);
        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["references.json"]);
        assert!(store.path().exists());
    }

    #[test]
    fn failed_write_leaves_memory_and_disk_unchanged() {
        let tmp = TempDir::new().unwrap();
        let mut store = seeded(&tmp);
        let id = store.references()[0].id.clone();
        let chunks = store.corpus().len();
        std::fs::create_dir(tmp.path().join("references.json.tmp")).unwrap();

        let all = DeleteRequest {
            reference_ids: Vec::new(),
            all: true,
        };
        assert!(store.delete(&all).is_err());
        let patch: ReferencePatch = serde_json::from_str(r#"{"title": "Renamed"}"#).unwrap();
        assert!(store.update(&id, &patch).is_err());
        assert!(store.add(reference("d.pdf", "smithc", "delta text")).is_err());

        assert_eq!(store.len(), 3);
        assert_eq!(store.corpus().len(), chunks);
        assert_eq!(store.references()[0].title.as_deref(), Some("Title of a.pdf"));
        let on_disk = ReferenceStore::open(store.path(), ChunkingConfig::default()).unwrap();
        assert_eq!(on_disk.len(), 3);

        std::fs::remove_dir(tmp.path().join("references.json.tmp")).unwrap();
        assert_eq!(store.delete(&all).unwrap(), 3);
        assert!(store.is_empty());
    }
}
