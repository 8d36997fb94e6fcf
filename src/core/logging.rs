//! Logging Module
//!
//! Structured logging for the generation core:
//! - JSON file log with daily rotation (tracing-appender)
//! - Optional human-readable stdout layer
//! - `log` crate events redirected into `tracing`
//! - Background gzip compression of rotated files

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Base name of the rolling log file.
const LOG_FILE_NAME: &str = "adventure-forge.log";

/// Target used for refunds that could not be written back to the ledger.
pub const RECONCILIATION_TARGET: &str = "adventure_forge::reconciliation";

// ============================================================================
// Logging Initialization
// ============================================================================

/// Initialize the logging system.
///
/// This sets up:
/// 1. A file logger (JSON formatted) in `<data_dir>/logs`.
/// 2. A stdout logger (pretty formatted) when enabled in config.
/// 3. Redirects standard `log` crate events to `tracing`.
///
/// Returns a `WorkerGuard` which must be kept alive for the duration of the
/// process so buffered logs are flushed on shutdown.
pub fn init(config: &LoggingConfig, data_dir: &Path) -> WorkerGuard {
    let log_dir = data_dir.join("logs");

    if !log_dir.exists() {
        if let Err(e) = fs::create_dir_all(&log_dir) {
            eprintln!("Failed to create logs directory: {}", e);
        }
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_filter(env_filter.clone());

    let stdout_layer = config.stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .pretty()
            .with_filter(env_filter)
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
    {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }

    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to initialize LogTracer: {}", e);
    }

    // Compress old logs in background (after init so log macros work)
    let log_dir_clone = log_dir.clone();
    std::thread::spawn(move || {
        compress_old_logs(log_dir_clone);
    });

    tracing::info!(
        path = %log_dir.join(LOG_FILE_NAME).display(),
        "Logging initialized (daily rolling)"
    );

    guard
}

/// Whether a file in the log directory is a rotated log that should be gzipped.
fn should_compress(name: &str, today_suffix: &str) -> bool {
    let prefix = format!("{}.", LOG_FILE_NAME);
    name.starts_with(&prefix) && !name.ends_with(today_suffix) && !name.ends_with(".gz")
}

/// Compress old log files in the background
fn compress_old_logs(log_dir: PathBuf) {
    let today_suffix = chrono::Local::now().format("%Y-%m-%d").to_string();

    let Ok(entries) = fs::read_dir(&log_dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if should_compress(name, &today_suffix) {
            match compress_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Compressed old log"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to compress old log"),
            }
        }
    }
}

fn compress_file(path: &Path) -> io::Result<()> {
    let file = fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);

    let mut gz_path_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "No filename"))?
        .to_os_string();
    gz_path_name.push(".gz");
    let parent_dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "No parent directory"))?;
    let gz_path = parent_dir.join(gz_path_name);

    // Skip if already exists
    if gz_path.exists() {
        return Ok(());
    }

    let output = fs::File::create(&gz_path)?;
    let mut encoder = GzEncoder::new(output, Compression::default());

    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;

    fs::remove_file(path)?;

    Ok(())
}
