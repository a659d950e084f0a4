use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use glint_config::{LoggingConfig, ProjectPaths};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Initialize logging for the `glint` binary.
///
/// `RUST_LOG` wins over the configured filter, which wins over `info`.
/// With `config.file` set, output is also appended to `glint.log` in the data
/// directory. Returns a guard that must be kept alive for the duration of the
/// program.
pub fn init_logging(config: &LoggingConfig, verbose: u8) -> io::Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let directive = match verbose {
                0 => config.filter.clone().unwrap_or_else(|| "info".to_string()),
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
            EnvFilter::new(directive)
        })
    };

    if !config.file {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(io::stderr)
            .init();
        return Ok(None);
    }

    let log_path = log_directory()?.join("glint.log");
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)?;
    }
    truncate_if_needed(&log_path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(io::stderr).with_ansi(true))
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!("Logging to file: {}", log_path.display());
    Ok(Some(guard))
}

fn log_directory() -> io::Result<PathBuf> {
    ProjectPaths::new("glint")
        .map(|paths| paths.log_dir())
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find home directory"))
}

/// Empty the log file once it grows past MAX_LOG_SIZE
fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() && fs::metadata(log_path)?.len() > MAX_LOG_SIZE {
        File::create(log_path)?.set_len(0)?;
    }
    Ok(())
}
