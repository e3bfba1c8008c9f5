use std::{
    fs::{self, File, OpenOptions},
    path::Path,
    sync::Arc,
};

use anyhow::Context;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber: stderr always, plus an append-only file
/// when `log_file` is given and can be opened.
pub fn init(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut open_error = None;
    let file_layer = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        ),
        Err(e) => {
            open_error = Some(e);
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(e) = open_error {
        warn!("Logging to stderr only: {e:#}");
    }
}

fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Couldn't create log directory {}", dir.display()))?;
    }
    return OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Couldn't open log file {}", path.display()));
}

/// Last `lines` lines of the log, `None` when there is no log yet.
pub fn tail(path: &Path, lines: usize) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Couldn't read {}", path.display()))?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    let mut log = all[start..].join("\n");
    if !log.is_empty() {
        log.push('\n');
    }
    return Ok(Some(log));
}
