//! File logging for the CLI and library.
//!
//! Output goes to `<data dir>/logs/wadash.log` so the terminal stays free for
//! tables and QR codes. Options come from the environment:
//!
//! - `WADASH_LOG_FILTER` (falls back to `RUST_LOG`)
//! - `WADASH_LOG_FORMAT`: `json` (default) or `pretty`
//! - `WADASH_TRUNCATE_LOG_ON_START=1`
//! - `WADASH_RUN_ID` to correlate a run with external tooling

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "wadash.log";
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,tungstenite=warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub dir: PathBuf,
    pub filter: String,
    pub format: LogFormat,
    pub truncate: bool,
    pub run_id: String,
}

impl LogOptions {
    pub fn from_env(dir: impl Into<PathBuf>) -> Self {
        Self::from_lookup(dir, |key| std::env::var(key).ok())
    }

    fn from_lookup(dir: impl Into<PathBuf>, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("WADASH_LOG_FILTER")
            .or_else(|| lookup("RUST_LOG"))
            .filter(|f| EnvFilter::try_new(f).is_ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        // An unknown format is not worth refusing to start over.
        let format = lookup("WADASH_LOG_FORMAT")
            .and_then(|f| f.parse().ok())
            .unwrap_or_default();
        let run_id = lookup("WADASH_RUN_ID").unwrap_or_else(|| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            format!("pid-{}-{}", std::process::id(), now)
        });

        Self {
            dir: dir.into(),
            filter,
            format,
            truncate: lookup("WADASH_TRUNCATE_LOG_ON_START").as_deref() == Some("1"),
            run_id,
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }
}

/// Keep alive for the life of the process; dropping it flushes the file writer.
pub struct LoggingHandle {
    pub run_id: String,
    pub log_path: PathBuf,
    pub guard: WorkerGuard,
}

fn truncate_file(path: &Path) -> std::io::Result<()> {
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map(drop)
}

pub fn init_logging(options: &LogOptions) -> anyhow::Result<LoggingHandle> {
    std::fs::create_dir_all(&options.dir)?;
    let log_path = options.log_path();
    if options.truncate {
        truncate_file(&log_path)?;
    }

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&options.dir, LOG_FILE));
    let registry = tracing_subscriber::registry().with(EnvFilter::try_new(&options.filter)?);

    match options.format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?,
    }

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %options.run_id,
        log_path = %log_path.display(),
        format = ?options.format,
        filter = %options.filter,
    );

    Ok(LoggingHandle {
        run_id: options.run_id.clone(),
        log_path,
        guard,
    })
}
