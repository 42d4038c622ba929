//! Request-facing operations over a project's store.
//!
//! Mutations never return `Err`: every outcome is a [`MutationResponse`]
//! envelope that callers forward as-is.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{CorpusError, Result};
use crate::models::{DeleteRequest, MutationResponse, ReferencePatch};
use crate::rank::Bm25Ranker;
use crate::store::ReferenceStore;

/// One retrieved chunk with the reference it came from.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f64,
    pub reference_id: String,
    pub citation_key: Option<String>,
    pub source_filename: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub query: String,
    pub chunks: Vec<RetrievedChunk>,
}

/// Parse a JSON patch, rejecting unknown fields.
pub fn parse_patch(json: &str) -> Result<ReferencePatch> {
    serde_json::from_str(json).map_err(|e| CorpusError::Validation(format!("bad patch: {e}")))
}

pub fn update_reference(
    store: &mut ReferenceStore,
    id: &str,
    patch: &ReferencePatch,
) -> MutationResponse {
    match store.update(id, patch) {
        Ok(()) => {
            info!(id, "reference updated");
            MutationResponse::ok(format!("updated reference {id}"))
        }
        Err(e) => {
            warn!(id, error = %e, "update rejected");
            MutationResponse::error(e.to_string())
        }
    }
}

pub fn delete_references(store: &mut ReferenceStore, request: &DeleteRequest) -> MutationResponse {
    match store.delete(request) {
        Ok(n) => {
            info!(removed = n, "references deleted");
            MutationResponse::ok(format!("deleted {n} reference(s)"))
        }
        Err(e) => {
            warn!(error = %e, "delete rejected");
            MutationResponse::error(e.to_string())
        }
    }
}

/// Top `limit` chunks for `query`, best first.
pub fn retrieve(store: &ReferenceStore, query: &str, limit: usize) -> RetrievalResponse {
    let ranker = Bm25Ranker::new(store);
    let chunks = ranker
        .search(query, limit)
        .into_iter()
        .filter_map(|hit| {
            let chunk = ranker.chunk(hit.index)?;
            let reference_id = ranker.reference_id(hit.index)?.to_string();
            let citation_key = store
                .get(&reference_id)
                .and_then(|r| r.citation_key.clone());
            let source_filename = chunk
                .metadata
                .get("source_filename")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            Some(RetrievedChunk {
                text: chunk.text.clone(),
                score: hit.score,
                reference_id,
                citation_key,
                source_filename,
            })
        })
        .collect();

    RetrievalResponse {
        query: query.to_string(),
        chunks,
    }
}
