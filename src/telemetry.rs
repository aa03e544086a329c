//! Logging setup for the controller and the simulator binary.
//!
//! Axis loops log from worker threads, so every layer records thread names:
//! `camera-axis-0` and `camera-axis-1` tell the yaw and pitch loops apart.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_FILTER_ENV: &str = "CAMERA_LOG";
/// Set to `json` to switch console output to JSON.
pub const LOG_FORMAT_ENV: &str = "CAMERA_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log to stderr (default: true)
    pub console_enabled: bool,
    /// JSON console output instead of compact lines (default: false)
    pub json_format: bool,
    /// Also write plain-text logs here (default: none)
    pub log_file: Option<PathBuf>,
    /// Filter used when neither environment variable is set (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            json_format: false,
            log_file: None,
            default_level: "info".to_string(),
        }
    }
}

/// Whether console output should be JSON, given the format variable's value.
fn wants_json(format_env: Option<&str>, configured: bool) -> bool {
    format_env.map_or(configured, |v| v.eq_ignore_ascii_case("json"))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit when a log file is configured;
/// dropping it flushes the file writer.
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let format_env = std::env::var(LOG_FORMAT_ENV).ok();
    let use_json = wants_json(format_env.as_deref(), config.json_format);

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console = config.console_enabled;
    let json_layer = (console && use_json).then(|| {
        fmt::layer()
            .json()
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
    });
    let compact_layer = (console && !use_json).then(|| {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_names(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        json = use_json,
        log_file = ?config.log_file,
        "Logging initialized"
    );

    Ok(guard)
}
