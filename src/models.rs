//! Core data models used throughout the reference corpus.
//!
//! These types are persisted verbatim in `references.json` and returned to
//! request handlers, so field names are part of the on-disk format.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Ingestion status of a single uploaded PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Processing,
    Failure,
    Complete,
}

/// Envelope status for request-facing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// One ingested academic document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    pub source_filename: String,
    pub status: IngestStatus,
    #[serde(default)]
    pub citation_key: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub contents: Option<String>,
    #[serde(default)]
    pub published_date: Option<NaiveDate>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Reference {
    /// A bare reference with a fresh id; every optional field empty.
    pub fn new(source_filename: impl Into<String>, status: IngestStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_filename: source_filename.into(),
            status,
            citation_key: None,
            doi: None,
            title: None,
            abstract_text: None,
            contents: None,
            published_date: None,
            authors: Vec::new(),
            chunks: Vec::new(),
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub full_name: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Author {
    /// Builds an author, deriving the surname from the last whitespace token
    /// of `full_name` when none is given.
    pub fn new(
        full_name: impl Into<String>,
        given_name: Option<String>,
        surname: Option<String>,
        email: Option<String>,
    ) -> Self {
        let full_name = full_name.into();
        let surname = surname
            .filter(|s| !s.trim().is_empty())
            .or_else(|| full_name.split_whitespace().last().map(str::to_string));
        Self {
            full_name,
            given_name,
            surname,
            email,
        }
    }

    /// Surname as recorded, falling back to the last token of the full name.
    pub fn effective_surname(&self) -> Option<&str> {
        self.surname
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| self.full_name.split_whitespace().last())
    }
}

/// A bounded slice of a Reference's contents; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Reserved for embeddings; always empty in lexical-only mode.
    #[serde(default)]
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Partial update of a [`Reference`]. Every field is optional; fields that are
/// nullable on the reference accept an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferencePatch {
    #[serde(default)]
    pub source_filename: Option<String>,
    #[serde(default)]
    pub status: Option<IngestStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub citation_key: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub doi: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, rename = "abstract", deserialize_with = "nullable")]
    pub abstract_text: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub contents: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub published_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub authors: Option<Vec<Author>>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Distinguishes a present `null` (`Some(None)`) from an absent field (`None`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ReferencePatch {
    pub fn is_empty(&self) -> bool {
        *self == ReferencePatch::default()
    }

    /// Merges the patched fields onto `target`. Returns true if `contents`
    /// changed, in which case the caller must re-derive chunks.
    pub fn apply_to(&self, target: &mut Reference) -> bool {
        if let Some(v) = &self.source_filename {
            target.source_filename = v.clone();
        }
        if let Some(v) = self.status {
            target.status = v;
        }
        if let Some(v) = &self.citation_key {
            target.citation_key = v.clone();
        }
        if let Some(v) = &self.doi {
            target.doi = v.clone();
        }
        if let Some(v) = &self.title {
            target.title = v.clone();
        }
        if let Some(v) = &self.abstract_text {
            target.abstract_text = v.clone();
        }
        if let Some(v) = self.published_date {
            target.published_date = v;
        }
        if let Some(v) = &self.authors {
            target.authors = v.clone();
        }
        if let Some(v) = &self.metadata {
            target.metadata = v.clone();
        }
        match &self.contents {
            Some(v) if *v != target.contents => {
                target.contents = v.clone();
                true
            }
            _ => false,
        }
    }
}

/// Result of an ingestion run: the full reference list of the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub project_name: String,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStatus {
    pub source_filename: String,
    pub status: IngestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStatusResponse {
    pub status: ResponseStatus,
    pub reference_statuses: Vec<ReferenceStatus>,
}

/// Status + message envelope returned by every mutating store operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub status: ResponseStatus,
    pub message: String,
}

impl MutationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }
}

/// Selector for bulk deletion. At least one of `reference_ids` or `all` is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub reference_ids: Vec<String>,
    #[serde(default)]
    pub all: bool,
}
