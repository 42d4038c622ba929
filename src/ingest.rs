//! Ingestion pipeline orchestration.
//!
//! One run takes a project's uploads directory to an updated
//! `references.json`:
//!
//! ```text
//! uploads/*.pdf ─delta─▶ .staging/ ─parser─▶ .grobid/{stem}.tei.xml | {stem}_{code}.txt
//!        ─▶ .storage/{stem}.json ─▶ Reference ─▶ citation keys ─▶ chunks ─▶ references.json
//! ```
//!
//! Only uploads without a persisted Reference (matched by file name) are
//! processed. A file the parser rejects becomes a `failure` Reference rather
//! than aborting the batch, and so does a success artifact that cannot be
//! read or converted. Staging and parser output are emptied before a run
//! stages anything, and every transient file of the run (staged PDF, parser
//! artifact, intermediate JSON) is removed when the run ends, whether it
//! succeeded or not; the uploads directory is never written to.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::chunk::chunk_reference;
use crate::citation::assign_citation_keys;
use crate::config::{Config, ProjectLayout};
use crate::error::{CorpusError, Result};
use crate::extract::{PdfTextExtractor, TextExtractor};
use crate::gateway::{
    classify_output, remove_artifacts, remove_if_exists, ParseOutcome, ParseRequest,
    ParserGateway,
};
use crate::models::{
    IngestResponse, IngestStatus, IngestStatusResponse, Reference, ReferenceStatus,
    ResponseStatus,
};
use crate::output::OutputChannel;
use crate::store::ReferenceStore;
use crate::tei::{parse_tei, ParsedDocument};
use crate::uploads::{file_name, file_stem, list_pdf_files};

/// One upload copied into staging for the current run.
#[derive(Debug, Clone)]
struct StagedFile {
    filename: String,
    stem: String,
    staged: PathBuf,
}

pub struct IngestionPipeline<'a> {
    layout: ProjectLayout,
    config: &'a Config,
    gateway: &'a dyn ParserGateway,
    extractor: &'a dyn TextExtractor,
    output: OutputChannel,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(
        layout: ProjectLayout,
        config: &'a Config,
        gateway: &'a dyn ParserGateway,
        output: OutputChannel,
    ) -> Self {
        Self {
            layout,
            config,
            gateway,
            extractor: &PdfTextExtractor,
            output,
        }
    }

    /// Replace the fallback text source used for failed or body-less parses.
    pub fn with_extractor(mut self, extractor: &'a dyn TextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Ingest every new upload and return the project's full reference list.
    ///
    /// If the parser fails mid-batch, References for the files it did finish
    /// are still persisted before the error is returned, so the next run only
    /// picks up the rest.
    pub async fn run(&self) -> Result<IngestResponse> {
        self.layout.ensure_dirs()?;
        let mut store = open_or_empty(&self.layout, self.config)?;

        let uploads = list_pdf_files(&self.layout.uploads_dir)?;
        let delta: Vec<PathBuf> = uploads
            .into_iter()
            .filter(|p| !store.contains_source(&file_name(p)))
            .collect();

        if delta.is_empty() {
            info!(project = %self.layout.project_name, "no new uploads; nothing to ingest");
            return Ok(self.response(&store));
        }
        info!(
            project = %self.layout.project_name,
            files = delta.len(),
            parser = self.gateway.name(),
            "ingesting new uploads"
        );

        self.sweep_leftovers()?;
        let mut staged = Vec::with_capacity(delta.len());
        let result = self.ingest_delta(&mut store, &delta, &mut staged).await;
        self.cleanup(&staged);
        result?;

        Ok(self.response(&store))
    }

    async fn ingest_delta(
        &self,
        store: &mut ReferenceStore,
        delta: &[PathBuf],
        staged: &mut Vec<StagedFile>,
    ) -> Result<()> {
        for upload in delta {
            let file = self.stage(upload)?;
            staged.push(file);
        }

        let request = ParseRequest {
            input_dir: self.layout.staging_dir.clone(),
            output_dir: self.layout.parser_output_dir.clone(),
            mode: self.config.parser.mode,
            force: self.config.parser.force,
            timeout: self.config.parser.batch_timeout(staged.len()),
        };

        let parsed = {
            let _quiet = self.output.mute();
            self.gateway.process(&request).await
        };
        if let Err(e) = &parsed {
            error!(error = %e, "parser run failed; keeping results produced so far");
        }

        let mut batch = self.harvest(staged);
        assign_citation_keys(store.references(), &mut batch);
        for reference in &mut batch {
            reference.chunks = chunk_reference(reference, &self.config.chunking);
        }

        let complete = batch
            .iter()
            .filter(|r| r.status == IngestStatus::Complete)
            .count();
        info!(
            complete,
            failed = batch.len() - complete,
            skipped = staged.len() - batch.len(),
            "built references"
        );

        store.extend(batch)?;
        parsed
    }

    /// Clear staging and parser output left behind by an interrupted run, so
    /// the parser only sees the current delta.
    fn sweep_leftovers(&self) -> Result<()> {
        for dir in [&self.layout.staging_dir, &self.layout.parser_output_dir] {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_file() {
                    debug!(path = %path.display(), "removing leftover from an earlier run");
                    std::fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }

    /// Copy one upload into staging, clearing stale artifacts of a previous
    /// interrupted run first.
    fn stage(&self, upload: &Path) -> Result<StagedFile> {
        let filename = file_name(upload);
        let stem = file_stem(upload);
        remove_artifacts(&self.layout.parser_output_dir, &stem)?;

        let staged = self.layout.staging_dir.join(&filename);
        std::fs::copy(upload, &staged)?;
        debug!(file = %filename, "staged");
        Ok(StagedFile {
            filename,
            stem,
            staged,
        })
    }

    /// Turn parser artifacts into References, in staging order. A success
    /// artifact that cannot be read or converted degrades that one file to a
    /// failure Reference.
    fn harvest(&self, staged: &[StagedFile]) -> Vec<Reference> {
        let mut batch = Vec::with_capacity(staged.len());
        for file in staged {
            match classify_output(&self.layout.parser_output_dir, &file.stem) {
                ParseOutcome::Success(path) => match self.convert(file, &path) {
                    Ok(doc) => batch.push(complete_reference(file, doc, self.extractor)),
                    Err((code, e)) => {
                        warn!(file = %file.filename, code, error = %e, "unusable parser output; recording failure");
                        batch.push(failure_reference(file, code, self.extractor));
                    }
                },
                ParseOutcome::Failure { code, .. } => {
                    warn!(file = %file.filename, code = %code, "parser rejected file");
                    batch.push(failure_reference(file, &code, self.extractor));
                }
                ParseOutcome::Missing => {
                    warn!(file = %file.filename, "no parser output; will retry on next run");
                }
            }
        }
        batch
    }

    /// TEI artifact → intermediate JSON → document. Errors carry the
    /// `parse_error` code to record: `io` or `tei`.
    fn convert(
        &self,
        file: &StagedFile,
        tei_path: &Path,
    ) -> std::result::Result<ParsedDocument, (&'static str, String)> {
        let xml = std::fs::read_to_string(tei_path).map_err(|e| ("io", e.to_string()))?;
        let doc = parse_tei(&xml).map_err(|e| ("tei", e.to_string()))?;
        let json_path = self.intermediate_path(&file.stem);
        doc.save(&json_path)
            .and_then(|()| ParsedDocument::load(&json_path))
            .map_err(|e| ("io", e.to_string()))
    }

    fn intermediate_path(&self, stem: &str) -> PathBuf {
        self.layout.storage_dir.join(format!("{stem}.json"))
    }

    /// Remove every transient file tied to the staged uploads. Errors are
    /// logged, never returned, so they cannot mask the run's own result.
    fn cleanup(&self, staged: &[StagedFile]) {
        for file in staged {
            let results = [
                remove_if_exists(&file.staged),
                remove_artifacts(&self.layout.parser_output_dir, &file.stem),
                remove_if_exists(&self.intermediate_path(&file.stem)),
            ];
            for e in results.into_iter().filter_map(|r| r.err()) {
                warn!(file = %file.filename, error = %e, "cleanup failed");
            }
        }
    }

    fn response(&self, store: &ReferenceStore) -> IngestResponse {
        IngestResponse {
            project_name: self.layout.project_name.clone(),
            references: store.references().to_vec(),
        }
    }
}

fn complete_reference(
    file: &StagedFile,
    doc: ParsedDocument,
    extractor: &dyn TextExtractor,
) -> Reference {
    let mut r = Reference::new(&file.filename, IngestStatus::Complete);
    r.published_date = doc.published_date();
    let ParsedDocument {
        header,
        abstract_text,
        body,
    } = doc;

    // Header-only parses carry no body; fall back to the PDF's own text.
    let contents = body
        .filter(|b| !b.trim().is_empty())
        .or_else(|| extractor.extract(&file.staged))
        .or_else(|| abstract_text.clone())
        .unwrap_or_default();

    r.title = header.title;
    r.doi = header.doi;
    r.authors = header.authors;
    r.abstract_text = abstract_text;
    r.contents = Some(contents);
    r
}

fn failure_reference(file: &StagedFile, code: &str, extractor: &dyn TextExtractor) -> Reference {
    let mut r = Reference::new(&file.filename, IngestStatus::Failure);
    r.citation_key = Some("untitled".to_string());
    r.contents = extractor.extract(&file.staged);
    r.metadata
        .insert("parse_error".to_string(), Value::String(code.to_string()));
    r
}

fn open_or_empty(layout: &ProjectLayout, config: &Config) -> Result<ReferenceStore> {
    let path = layout.references_json_path();
    match ReferenceStore::open(&path, config.chunking) {
        Ok(store) => Ok(store),
        Err(e) if e.is_not_found() => {
            Ok(ReferenceStore::new(path).with_chunking(config.chunking))
        }
        Err(e) => Err(e),
    }
}

/// Ingest the uploads in `pdf_directory` with `gateway`.
pub async fn run_ingest(
    pdf_directory: &Path,
    config: &Config,
    gateway: &dyn ParserGateway,
    output: &OutputChannel,
) -> Result<IngestResponse> {
    let layout = ProjectLayout::from_uploads_dir(pdf_directory);
    IngestionPipeline::new(layout, config, gateway, output.clone())
        .run()
        .await
}

/// The persisted reference list, without ingesting anything. A project that
/// was never ingested has no references.
pub fn get_references(pdf_directory: &Path, config: &Config) -> Result<IngestResponse> {
    let layout = ProjectLayout::from_uploads_dir(pdf_directory);
    let store = open_or_empty(&layout, config)?;
    Ok(IngestResponse {
        project_name: layout.project_name,
        references: store.references().to_vec(),
    })
}

/// Reconciles uploads against the store without running ingestion.
pub struct IngestStatusFetcher {
    uploads_dir: PathBuf,
    store_path: PathBuf,
}

impl IngestStatusFetcher {
    pub fn new(layout: &ProjectLayout) -> Self {
        Self {
            uploads_dir: layout.uploads_dir.clone(),
            store_path: layout.references_json_path(),
        }
    }

    /// Never fails: an unreadable store yields an error envelope with no
    /// statuses.
    pub fn fetch(&self) -> IngestStatusResponse {
        match self.reconcile() {
            Ok(reference_statuses) => IngestStatusResponse {
                status: ResponseStatus::Ok,
                reference_statuses,
            },
            Err(e) => {
                error!(error = %e, "cannot reconcile ingest status");
                IngestStatusResponse {
                    status: ResponseStatus::Error,
                    reference_statuses: Vec::new(),
                }
            }
        }
    }

    fn reconcile(&self) -> Result<Vec<ReferenceStatus>> {
        let uploads = list_pdf_files(&self.uploads_dir)?;
        let mut store = ReferenceStore::new(&self.store_path);
        match store.load() {
            Ok(()) => {}
            Err(CorpusError::NotFound(_)) => {
                debug!(path = %self.store_path.display(), "no store yet; all uploads processing");
            }
            Err(e) => return Err(e),
        }

        Ok(uploads
            .iter()
            .map(|p| {
                let source_filename = file_name(p);
                let status = store
                    .references()
                    .iter()
                    .find(|r| r.source_filename == source_filename)
                    .map(|r| r.status)
                    .unwrap_or(IngestStatus::Processing);
                ReferenceStatus {
                    source_filename,
                    status,
                }
            })
            .collect())
    }
}

pub fn get_statuses(pdf_directory: &Path) -> IngestStatusResponse {
    let layout = ProjectLayout::from_uploads_dir(pdf_directory);
    IngestStatusFetcher::new(&layout).fetch()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use tempfile::TempDir;

    fn project(tmp: &TempDir, uploads: &[&str]) -> ProjectLayout {
        let dir = tmp.path().join("thesis").join("uploads");
        std::fs::create_dir_all(&dir).unwrap();
        for name in uploads {
            std::fs::write(dir.join(name), b"%PDF-1.4 stub").unwrap();
        }
        ProjectLayout::from_uploads_dir(&dir)
    }

    fn persist(layout: &ProjectLayout, refs: Vec<Reference>) {
        let mut store = ReferenceStore::new(layout.references_json_path());
        store.extend(refs).unwrap();
    }

    #[test]
    fn status_without_store_is_all_processing() {
        let tmp = TempDir::new().unwrap();
        let layout = project(&tmp, &["a.pdf", "b.pdf"]);
        let resp = IngestStatusFetcher::new(&layout).fetch();
        assert_eq!(resp.status, ResponseStatus::Ok);
        assert_eq!(resp.reference_statuses.len(), 2);
        assert!(resp
            .reference_statuses
            .iter()
            .all(|s| s.status == IngestStatus::Processing));
    }

    #[test]
    fn status_merges_store_and_uploads() {
        let tmp = TempDir::new().unwrap();
        let layout = project(&tmp, &["done.pdf", "new.pdf"]);
        let mut done = Reference::new("done.pdf", IngestStatus::Complete);
        done.contents = Some("text".into());
        persist(&layout, vec![done]);

        let resp = get_statuses(&layout.uploads_dir);
        assert_eq!(resp.status, ResponseStatus::Ok);
        assert_eq!(
            resp.reference_statuses,
            vec![
                ReferenceStatus {
                    source_filename: "done.pdf".into(),
                    status: IngestStatus::Complete
                },
                ReferenceStatus {
                    source_filename: "new.pdf".into(),
                    status: IngestStatus::Processing
                },
            ]
        );
    }

    #[test]
    fn status_with_corrupt_store_is_error_envelope() {
        let tmp = TempDir::new().unwrap();
        let layout = project(&tmp, &["a.pdf"]);
        std::fs::create_dir_all(&layout.storage_dir).unwrap();
        std::fs::write(layout.references_json_path(), "not json").unwrap();

        let resp = IngestStatusFetcher::new(&layout).fetch();
        assert_eq!(resp.status, ResponseStatus::Error);
        assert!(resp.reference_statuses.is_empty());
    }

    #[test]
    fn get_references_of_fresh_project_is_empty() {
        let tmp = TempDir::new().unwrap();
        let layout = project(&tmp, &["a.pdf"]);
        let resp = get_references(&layout.uploads_dir, &Config::default()).unwrap();
        assert_eq!(resp.project_name, "thesis");
        assert!(resp.references.is_empty());
    }

    #[test]
    fn complete_reference_takes_header_fields() {
        let tmp = TempDir::new().unwrap();
        let file = StagedFile {
            filename: "p.pdf".into(),
            stem: "p".into(),
            staged: tmp.path().join("p.pdf"),
        };
        let doc = ParsedDocument {
            header: crate::tei::DocumentHeader {
                title: Some("T".into()),
                authors: vec![Author::new("Ada Lovelace", None, None, None)],
                doi: Some("10.1/x".into()),
                date: Some("1843".into()),
            },
            abstract_text: Some("abs".into()),
            body: Some("body text".into()),
        };
        let r = complete_reference(&file, doc, &PdfTextExtractor);
        assert_eq!(r.status, IngestStatus::Complete);
        assert_eq!(r.title.as_deref(), Some("T"));
        assert_eq!(r.contents.as_deref(), Some("body text"));
        assert_eq!(r.published_date.map(|d| d.to_string()).as_deref(), Some("1843-01-01"));
        assert_eq!(r.authors[0].surname.as_deref(), Some("Lovelace"));
    }

    #[test]
    fn complete_reference_without_any_text_still_has_contents() {
        let tmp = TempDir::new().unwrap();
        let file = StagedFile {
            filename: "p.pdf".into(),
            stem: "p".into(),
            staged: tmp.path().join("missing.pdf"),
        };
        let r = complete_reference(&file, ParsedDocument::default(), &PdfTextExtractor);
        assert_eq!(r.contents.as_deref(), Some(""));
    }
}
