//! GROBID HTTP gateway.
//!
//! Probes `GET /api/isalive` once, then submits each staged PDF to
//! `POST /api/{mode}` as a multipart `input` field, in file-name order.
//!
//! Retry strategy (per file, via [`RetryPolicy`]):
//! - HTTP 503 (server busy) → retry; a failure artifact is written once
//!   attempts are exhausted
//! - connection errors → retry; the batch aborts with `ServiceUnavailable`
//!   once attempts are exhausted
//! - any other non-200 status → failure artifact, no retry
//! - request timeout → the batch deadline has passed, abort

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::{failure_artifact_name, success_artifact_name, ParseRequest, ParserGateway};
use crate::config::{ParseMode, ParserConfig};
use crate::error::{CorpusError, Result};
use crate::retry::RetryPolicy;
use crate::uploads::{file_name, file_stem, list_pdf_files};

const ALIVE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GrobidGateway {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

enum Submission {
    Parsed(String),
    Rejected { code: u16, body: String },
}

#[derive(Debug)]
enum AttemptError {
    Busy { body: String },
    Transport(reqwest::Error),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Busy { .. } => write!(f, "server busy (503)"),
            AttemptError::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Busy { .. } => true,
            AttemptError::Transport(e) => !e.is_timeout(),
        }
    }
}

impl GrobidGateway {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CorpusError::ServiceUnavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            retry: config.retry.policy(),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Single liveness probe; never retried.
    pub async fn is_alive(&self) -> Result<()> {
        let url = self.endpoint("isalive");
        let resp = self
            .client
            .get(&url)
            .timeout(ALIVE_TIMEOUT)
            .send()
            .await
            .map_err(|e| CorpusError::ServiceUnavailable(format!("{url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(CorpusError::ServiceUnavailable(format!(
                "{url} answered {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn submit_once(
        &self,
        url: &str,
        filename: &str,
        bytes: Vec<u8>,
        timeout: Duration,
    ) -> std::result::Result<Submission, AttemptError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(AttemptError::Transport)?;
        let form = reqwest::multipart::Form::new().part("input", part);

        let resp = self
            .client
            .post(url)
            .header("Accept", "application/xml")
            .multipart(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(AttemptError::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(AttemptError::Transport)?;
        match status {
            StatusCode::OK => Ok(Submission::Parsed(body)),
            StatusCode::SERVICE_UNAVAILABLE => Err(AttemptError::Busy { body }),
            other => Ok(Submission::Rejected {
                code: other.as_u16(),
                body,
            }),
        }
    }

    async fn submit(
        &self,
        pdf: &Path,
        bytes: Vec<u8>,
        mode: ParseMode,
        deadline: Instant,
    ) -> std::result::Result<Submission, AttemptError> {
        let url = self.endpoint(mode.endpoint());
        let filename = file_name(pdf);

        self.retry
            .run(
                |_attempt| {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    self.submit_once(&url, &filename, bytes.clone(), remaining)
                },
                AttemptError::is_retryable,
            )
            .await
    }
}

#[async_trait]
impl ParserGateway for GrobidGateway {
    fn name(&self) -> &str {
        "grobid"
    }

    async fn process(&self, request: &ParseRequest) -> Result<()> {
        self.is_alive().await?;

        let deadline = Instant::now() + request.timeout;
        let pdfs = list_pdf_files(&request.input_dir)?;
        tokio::fs::create_dir_all(&request.output_dir).await?;

        info!(files = pdfs.len(), mode = request.mode.endpoint(), "submitting PDFs to GROBID");

        for pdf in pdfs {
            let stem = file_stem(&pdf);
            let success_path = request.output_dir.join(success_artifact_name(&stem));
            if !request.force && success_path.exists() {
                debug!(file = %stem, "already parsed; skipping");
                continue;
            }
            if Instant::now() >= deadline {
                return Err(CorpusError::ParserTimeout(request.timeout));
            }

            let bytes = tokio::fs::read(&pdf).await?;
            match self.submit(&pdf, bytes, request.mode, deadline).await {
                Ok(Submission::Parsed(xml)) => {
                    tokio::fs::write(&success_path, xml).await?;
                }
                Ok(Submission::Rejected { code, body }) => {
                    warn!(file = %stem, code, "GROBID could not parse file");
                    let path = request.output_dir.join(failure_artifact_name(&stem, code));
                    tokio::fs::write(path, body).await?;
                }
                Err(AttemptError::Busy { body }) => {
                    warn!(file = %stem, "GROBID stayed busy; recording failure");
                    let code = StatusCode::SERVICE_UNAVAILABLE.as_u16();
                    let path = request.output_dir.join(failure_artifact_name(&stem, code));
                    tokio::fs::write(path, body).await?;
                }
                Err(AttemptError::Transport(e)) if e.is_timeout() => {
                    return Err(CorpusError::ParserTimeout(request.timeout));
                }
                Err(AttemptError::Transport(e)) => {
                    return Err(CorpusError::ServiceUnavailable(e.to_string()));
                }
            }
        }

        Ok(())
    }
}
