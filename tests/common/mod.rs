#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use refcorpus::error::{CorpusError, Result};
use refcorpus::extract::TextExtractor;
use refcorpus::gateway::{failure_artifact_name, success_artifact_name, ParseRequest, ParserGateway};
use refcorpus::output::OutputChannel;
use refcorpus::uploads::{file_stem, list_pdf_files};

/// Minimal valid PDF with one line of text.
pub fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({phrase}) Tj ET");
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

pub fn tei_document(title: &str, forename: &str, surname: &str, date: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader>
    <fileDesc>
      <titleStmt><title level="a" type="main">{title}</title></titleStmt>
      <publicationStmt><date type="published" when="{date}"/></publicationStmt>
      <sourceDesc><biblStruct><analytic>
        <author><persName><forename type="first">{forename}</forename><surname>{surname}</surname></persName></author>
      </analytic></biblStruct></sourceDesc>
    </fileDesc>
  </teiHeader>
  <text><body><div><p>{body}</p></div></body></text>
</TEI>"#
    )
}

/// Creates `<tmp>/<project>/uploads` holding one minimal PDF per name.
pub fn project_with_uploads(root: &Path, project: &str, files: &[&str]) -> PathBuf {
    let uploads = root.join(project).join("uploads");
    fs::create_dir_all(&uploads).unwrap();
    for name in files {
        fs::write(uploads.join(name), minimal_pdf_with_phrase(name)).unwrap();
    }
    uploads
}

/// Names of the entries in `dir`, sorted; empty if it does not exist.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[derive(Clone)]
pub enum FakeResult {
    Tei(Vec<u8>),
    Fail(u16),
}

/// Parser stand-in: writes a scripted artifact per staged stem.
///
/// Stems without a script get no artifact. With `fail_after`, the fake stops
/// after that many files and reports the service as unavailable.
pub struct FakeGateway {
    scripts: HashMap<String, FakeResult>,
    fail_after: Option<usize>,
    watched: Option<OutputChannel>,
    pub saw_muted_output: AtomicBool,
    pub calls: AtomicUsize,
    pub staged_seen: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            fail_after: None,
            watched: None,
            saw_muted_output: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            staged_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn parse(mut self, stem: &str, tei: String) -> Self {
        self.scripts.insert(stem.to_string(), FakeResult::Tei(tei.into_bytes()));
        self
    }

    /// Success artifact with arbitrary, possibly non-UTF-8, content.
    pub fn parse_bytes(mut self, stem: &str, bytes: &[u8]) -> Self {
        self.scripts.insert(stem.to_string(), FakeResult::Tei(bytes.to_vec()));
        self
    }

    pub fn reject(mut self, stem: &str, code: u16) -> Self {
        self.scripts.insert(stem.to_string(), FakeResult::Fail(code));
        self
    }

    pub fn fail_after(mut self, files: usize) -> Self {
        self.fail_after = Some(files);
        self
    }

    pub fn watching(mut self, output: &OutputChannel) -> Self {
        self.watched = Some(output.clone());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParserGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    async fn process(&self, request: &ParseRequest) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(out) = &self.watched {
            self.saw_muted_output.store(out.is_muted(), Ordering::SeqCst);
        }
        fs::create_dir_all(&request.output_dir)?;

        for (i, pdf) in list_pdf_files(&request.input_dir)?.iter().enumerate() {
            if self.fail_after == Some(i) {
                return Err(CorpusError::ServiceUnavailable("fake went away".into()));
            }
            let stem = file_stem(pdf);
            self.staged_seen.lock().unwrap().push(stem.clone());
            match self.scripts.get(&stem) {
                Some(FakeResult::Tei(xml)) => {
                    fs::write(request.output_dir.join(success_artifact_name(&stem)), xml)?;
                }
                Some(FakeResult::Fail(code)) => {
                    fs::write(
                        request.output_dir.join(failure_artifact_name(&stem, *code)),
                        "[GENERAL] An exception occurred",
                    )?;
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Fallback text source returning a fixed line per file.
pub struct FakeExtractor;

impl TextExtractor for FakeExtractor {
    fn extract(&self, path: &Path) -> Option<String> {
        Some(format!("extracted text of {}", file_stem(path)))
    }
}
