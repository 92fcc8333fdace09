//! Tracing setup for the backend and the webview.
//!
//! Logs go to `<app data>/logs/doc-chat.log` when a directory is given,
//! otherwise to stderr. `RUST_LOG` overrides the default filter.

use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,doc_chat_lib=debug";
const LOG_FILE_NAME: &str = "doc-chat.log";

// Keeps the non-blocking writer alive for the whole process.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(log_dir: Option<&Path>) {
    if LOG_GUARD.get().is_some() {
        return;
    }

    let Some(dir) = log_dir else {
        init_stderr_logging();
        return;
    };

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("[doc-chat] Failed to create log directory {:?}: {}", dir, e);
        init_stderr_logging();
        return;
    }

    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let subscriber = tracing_subscriber::registry().with(env_filter()).with(
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true),
    );

    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => {
            let _ = LOG_GUARD.set(guard);
            tracing::info!("Logging initialized, writing to {:?}", dir.join(LOG_FILE_NAME));
        }
        Err(e) => eprintln!("[doc-chat] Failed to set tracing subscriber: {}", e),
    }
}

fn init_stderr_logging() {
    let subscriber = tracing_subscriber::registry().with(env_filter()).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Forward a webview log line into the same subscriber.
pub fn log_frontend(level: &str, source: &str, message: &str) {
    match level.to_lowercase().as_str() {
        "error" => tracing::error!(target: "frontend", source = %source, "{}", message),
        "warn" => tracing::warn!(target: "frontend", source = %source, "{}", message),
        "debug" => tracing::debug!(target: "frontend", source = %source, "{}", message),
        "trace" => tracing::trace!(target: "frontend", source = %source, "{}", message),
        _ => tracing::info!(target: "frontend", source = %source, "{}", message),
    }
}
