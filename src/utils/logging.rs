//! Console and file logging built on `tracing`
//!
//! The console layer never goes below INFO and the file layer never below
//! DEBUG; `LOG_LEVEL` can only make either of them stricter. `RUST_LOG`
//! overrides target filtering when set.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Keeps the non-blocking file writer flushing until dropped
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Map a `LOG_LEVEL` value to a level filter
///
/// Accepts the usual tracing names as well as `WARNING` and `CRITICAL`.
pub fn parse_log_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_uppercase().as_str() {
        "TRACE" => Some(LevelFilter::TRACE),
        "DEBUG" => Some(LevelFilter::DEBUG),
        "INFO" => Some(LevelFilter::INFO),
        "WARN" | "WARNING" => Some(LevelFilter::WARN),
        "ERROR" | "CRITICAL" | "FATAL" => Some(LevelFilter::ERROR),
        "OFF" => Some(LevelFilter::OFF),
        _ => None,
    }
}

fn target_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("youtube_download={}", level)))
}

/// Initialise tracing with a console layer and an optional file layer
///
/// `console` switches the stderr layer off while a progress display owns
/// the terminal.
pub fn init_tracing(log_level: &str, log_file: Option<&Path>, console: bool) -> LogGuard {
    let level = parse_log_level(log_level).unwrap_or(LevelFilter::INFO);
    let console_level = level.min(LevelFilter::INFO);
    let file_level = level.min(LevelFilter::DEBUG);

    let console_writer = if console {
        BoxMakeWriter::new(io::stderr)
    } else {
        BoxMakeWriter::new(io::sink)
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(console_writer)
        .with_filter(console_level);

    let mut file_guard = None;
    let file_layer = log_file.and_then(|path| {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty())?;
        let file_name = path.file_name()?;

        if let Err(err) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory: {err}");
            return None;
        }

        let file_appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        file_guard = Some(guard);

        Some(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_filter(file_level),
        )
    });

    // 忽略重复初始化错误
    let _ = tracing_subscriber::registry()
        .with(target_filter(level))
        .with(console_layer)
        .with(file_layer)
        .try_init();

    LogGuard {
        _file_guard: file_guard,
    }
}
