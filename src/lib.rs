//! # refcorpus
//!
//! Local PDF ingestion and lexical retrieval for a per-project reference
//! corpus.
//!
//! Uploaded PDFs are parsed by an external structured-text service (GROBID),
//! turned into citation-keyed, chunked References, and persisted as one JSON
//! array per project. Retrieval ranks chunks with BM25+.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌─────────────────┐
//! │ uploads/ │──▶│ Pipeline  │──▶│  GROBID  │──▶│ TEI → Reference │
//! │  *.pdf   │   │ (staging) │   │ gateway  │   │ keys + chunks   │
//! └──────────┘   └───────────┘   └──────────┘   └────────┬────────┘
//!                                                        ▼
//!                                ┌──────────┐   ┌─────────────────┐
//!                                │  BM25+   │◀──│ references.json │
//!                                │  ranker  │   │     (store)     │
//!                                └──────────┘   └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and project directory layout |
//! | [`error`] | Error taxonomy |
//! | [`models`] | References, authors, chunks, request/response envelopes |
//! | [`chunk`] | Fixed-window text chunking |
//! | [`citation`] | Citation key assignment |
//! | [`gateway`] | External parser interface and GROBID client |
//! | [`tei`] | TEI XML → intermediate document |
//! | [`extract`] | Direct PDF text extraction |
//! | [`store`] | JSON-backed reference store and derived corpus |
//! | [`rank`] | BM25+ ranking |
//! | [`ingest`] | Ingestion pipeline and status reconciliation |
//! | [`service`] | Request-facing update/delete/retrieve |
//! | [`output`] | JSON response channel with scoped muting |
//! | [`retry`] | Retry policy for external calls |
//! | [`uploads`] | Upload directory listing |
//! | [`logging`] | Tracing subscriber setup |

pub mod chunk;
pub mod citation;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod output;
pub mod rank;
pub mod retry;
pub mod service;
pub mod store;
pub mod tei;
pub mod uploads;
