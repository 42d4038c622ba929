//! Diagnostic logging.
//!
//! Logs never go to stdout, which carries the JSON responses. They go to
//! stderr, or append to `logging.filepath` when `logging.enable` is set.
//! `RUST_LOG` overrides `logging.level`.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid logging.level: {}", config.level))?;

    if config.enable {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.filepath)
            .with_context(|| format!("cannot open log file {}", config.filepath.display()))?;
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(filter)
            .try_init()
            .context("logger already installed")?;
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .try_init()
            .context("logger already installed")?;
    }

    Ok(())
}
