//! Tracing setup for the `cs` binary

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Verbosity flags to a default filter directive
pub fn log_level(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    }
}

/// Install the global subscriber.
///
/// Console output always goes to stderr. When `debug_file` is set, a
/// second layer writes debug-level logs to that file; the returned path is
/// where they end up.
pub fn init_logging(
    verbose: u8,
    quiet: bool,
    debug_file: Option<DebugFile>,
) -> Result<Option<PathBuf>> {
    let console_filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| log_level(verbose, quiet).into()),
    );
    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file_layer, path) = match debug_file {
        Some(target) => {
            let (file, path) = target.open()?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    Ok(path)
}

/// Where `--debug` output goes
#[derive(Debug, Clone)]
pub enum DebugFile {
    /// A fresh file in the temp directory that outlives the process
    Temp,
    Path(PathBuf),
}

impl DebugFile {
    fn open(&self) -> Result<(File, PathBuf)> {
        match self {
            DebugFile::Temp => tempfile::Builder::new()
                .prefix("cs-ssh-")
                .suffix(".log")
                .tempfile()
                .context("creating debug file")?
                .keep()
                .context("keeping debug file"),
            DebugFile::Path(path) => Ok((create(path)?, path.clone())),
        }
    }
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("creating debug file {}", path.display()))
}
