//! Logging and tracing configuration
//!
//! Logs go to stderr so machine-readable reports on stdout stay clean. A run
//! log file can be added with full details for later inspection.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize tracing for the CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate (DEBUG with `verbose`), WARN for
/// dependencies. Returns the log file path when file logging is active.
pub fn init_cli(verbose: bool, log_file: Option<&Path>) -> Option<PathBuf> {
    let default_directives = if verbose {
        "fleet=debug,info"
    } else {
        "fleet=info,warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let (file_layer, active_path) = match log_file.and_then(open_log_file) {
        Some((file, path)) => {
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    active_path
}

/// Open (append) a log file, creating parent directories
fn open_log_file(path: &Path) -> Option<(std::fs::File, PathBuf)> {
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            eprintln!("Warning: Could not create log directory {}", parent.display());
            return None;
        }
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => Some((file, path.to_path_buf())),
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            None
        }
    }
}
