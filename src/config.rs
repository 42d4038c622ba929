use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{Backoff, RetryPolicy};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub chunking: ChunkingConfig,
    pub parser: ParserConfig,
    pub retrieval: RetrievalConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Which GROBID endpoint processes the staged PDFs.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    #[default]
    #[serde(rename = "processHeaderDocument")]
    HeaderDocument,
    #[serde(rename = "processFulltextDocument")]
    FulltextDocument,
}

impl ParseMode {
    pub fn endpoint(&self) -> &'static str {
        match self {
            ParseMode::HeaderDocument => "processHeaderDocument",
            ParseMode::FulltextDocument => "processFulltextDocument",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ParserConfig {
    pub url: String,
    pub mode: ParseMode,
    pub force: bool,
    pub timeout_per_file_secs: u64,
    pub retry: RetryConfig,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            url: default_parser_url(),
            mode: ParseMode::default(),
            force: true,
            timeout_per_file_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

fn default_parser_url() -> String {
    "https://kermitt2-grobid.hf.space".to_string()
}

impl ParserConfig {
    /// Batch deadline: scales linearly with the number of staged files.
    pub fn batch_timeout(&self, file_count: usize) -> Duration {
        Duration::from_secs(self.timeout_per_file_secs * file_count.max(1) as u64)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub wait_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wait_ms: 1000,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.wait_ms),
            self.backoff,
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_limit: 5 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub enable: bool,
    pub filepath: PathBuf,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            filepath: PathBuf::from("/tmp/refcorpus.log"),
            level: "info".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.parser.timeout_per_file_secs == 0 {
        anyhow::bail!("parser.timeout_per_file_secs must be > 0");
    }
    if config.parser.retry.max_attempts == 0 {
        anyhow::bail!("parser.retry.max_attempts must be >= 1");
    }
    if config.parser.url.trim().is_empty() {
        anyhow::bail!("parser.url must not be empty");
    }

    if config.retrieval.default_limit == 0 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }

    Ok(())
}

/// Per-project working directories, all derived from the uploads directory.
///
/// ```text
/// <project>/uploads/     immutable user uploads
/// <project>/.staging/    PDFs copied in for one run
/// <project>/.grobid/     parser output artifacts
/// <project>/.storage/    intermediate JSON + references.json
/// ```
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub project_name: String,
    pub uploads_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub parser_output_dir: PathBuf,
    pub storage_dir: PathBuf,
}

impl ProjectLayout {
    pub fn from_uploads_dir(uploads_dir: &Path) -> Self {
        let root = uploads_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let project_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            project_name,
            uploads_dir: uploads_dir.to_path_buf(),
            staging_dir: root.join(".staging"),
            parser_output_dir: root.join(".grobid"),
            storage_dir: root.join(".storage"),
        }
    }

    pub fn references_json_path(&self) -> PathBuf {
        self.storage_dir.join("references.json")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.staging_dir)?;
        std::fs::create_dir_all(&self.parser_output_dir)?;
        std::fs::create_dir_all(&self.storage_dir)?;
        Ok(())
    }
}
