use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Path from `$GMTUI_LOG`, if logging is wanted at all.
pub fn log_path() -> Option<PathBuf> {
    std::env::var_os("GMTUI_LOG")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// Install the tracing subscriber. Output goes to the `$GMTUI_LOG` file
/// only, since the terminal belongs to the UI; without it nothing is
/// installed and events are dropped. `$GMTUI_LOG_LEVEL` takes an
/// `EnvFilter` directive (default `info`).
pub fn init() -> Result<()> {
    let Some(path) = log_path() else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter =
        EnvFilter::try_from_env("GMTUI_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))?;

    tracing::info!(path = %path.display(), "logging started");
    Ok(())
}
