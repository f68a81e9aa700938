//! Shared observability helpers for the binary and integration tests.
//!
//! All Fieldtrip processes log through one rolling file sink so that a run's
//! trace survives the terminal session. Call [`init_logging`] once near
//! process start; later calls are no-ops that hand back the path resolved by
//! the first.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Output encoding for the log sink.
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Text,
    Json,
}

/// Configuration passed to [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Logical process name; names the log file and the default directory.
    pub app_name: &'static str,
    /// Explicit log directory. When `None`, `FIELDTRIP_LOG_DIR` is consulted
    /// and the platform data directory is the final fallback.
    pub log_dir: Option<PathBuf>,
    /// Mirror events to `stderr` in addition to the file sink. The scenario
    /// runner relies on this to surface report entries as they happen.
    pub emit_stderr: bool,
    /// Preferred log encoding.
    pub format: LogFormat,
    /// Filter applied when `RUST_LOG` is unset.
    pub default_filter: &'static str,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "fieldtrip",
            log_dir: None,
            emit_stderr: false,
            format: LogFormat::Text,
            default_filter: "info",
        }
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Returns the concrete log file path for the current day. Subsequent calls
/// are cheap and simply return the originally resolved location.
pub fn init_logging(config: LogConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = LOG_PATH.get() {
        return Ok(path.clone());
    }

    let sink_dir = resolve_sink_dir(config.app_name, config.log_dir.as_deref());
    std::fs::create_dir_all(&sink_dir)
        .with_context(|| format!("failed to create log directory: {}", sink_dir.display()))?;

    let file_name = format!("{}.log", config.app_name);
    let today = Local::now().format("%Y-%m-%d").to_string();
    let full_path = sink_dir.join(&today).join(&file_name);

    let appender = rolling::daily(sink_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    let init_result = match config.format {
        LogFormat::Text => {
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            if config.emit_stderr {
                registry
                    .with(file_layer)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .try_init()
            } else {
                registry.with(file_layer).try_init()
            }
        }
        LogFormat::Json => {
            let file_layer = fmt::layer().json().with_writer(writer);
            if config.emit_stderr {
                registry
                    .with(file_layer)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .try_init()
            } else {
                registry.with(file_layer).try_init()
            }
        }
    };
    init_result.map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;

    let _ = LOG_PATH.set(full_path.clone());
    Ok(full_path)
}

fn resolve_sink_dir(app_name: &str, explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return expand_home(dir);
    }

    if let Ok(env_dir) = std::env::var("FIELDTRIP_LOG_DIR") {
        return expand_home(Path::new(&env_dir));
    }

    dirs::data_local_dir()
        .map(|base| base.join(app_name))
        .unwrap_or_else(|| PathBuf::from(".").join(app_name))
}

fn expand_home(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
