//! Structured logging setup.
//!
//! The dispatcher only emits `tracing` events; installing a subscriber is the
//! host's choice. [`init_logging`] is a ready-made one: an `EnvFilter`, JSON or
//! pretty output, optionally written through a non-blocking appender so a slow
//! log sink never stalls a partition worker.
//!
//! ## Environment Variables
//!
//! - `BRRTMESH_LOG_LEVEL`: `trace` .. `error` (default: `info`); `RUST_LOG` wins when set
//! - `BRRTMESH_LOG_FORMAT`: `json` or `pretty` (default: `json`)
//! - `BRRTMESH_LOG_ASYNC`: buffer output through `tracing-appender` (default: `true`)
//! - `BRRTMESH_LOG_TARGET_FILTER`: extra comma-separated directives,
//!   e.g. `brrtmesh::worker_pool=debug`
//! - `BRRTMESH_LOG_INCLUDE_LOCATION`: add file and line to every event (default: `false`)

use std::env;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub async_logging: bool,
    pub target_filter: Option<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            async_logging: true,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env::var("BRRTMESH_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: env::var("BRRTMESH_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(defaults.format),
            async_logging: env::var("BRRTMESH_LOG_ASYNC")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.async_logging),
            target_filter: env::var("BRRTMESH_LOG_TARGET_FILTER")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            include_location: env::var("BRRTMESH_LOG_INCLUDE_LOCATION")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.include_location),
        }
    }

    /// Pretty, synchronous, debug-level output for local runs and tests.
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            async_logging: false,
            target_filter: None,
            include_location: true,
        }
    }

    fn level(&self) -> Level {
        match self.log_level.trim().to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Build the filter: `RUST_LOG` if set, else the level, plus target directives.
    ///
    /// Invalid target directives are skipped with a warning on stderr.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));

        if let Some(targets) = &self.target_filter {
            for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {directive}"),
                }
            }
        }
        filter
    }
}

/// Install a global subscriber built from `config`.
///
/// With `async_logging` the returned guard owns the background writer; keep it
/// alive until shutdown or buffered lines are lost.
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
///
/// # Example
///
/// ```no_run
/// use brrtmesh::logging::{init_logging, LogConfig};
///
/// let _guard = init_logging(&LogConfig::from_env()).expect("logging");
/// tracing::info!("ready");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let (writer, guard) = if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        (
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(non_blocking),
            Some(guard),
        )
    } else {
        (
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout),
            None,
        )
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    registry
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}
