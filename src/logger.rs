use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing::warn;
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter directives for the terminal, e.g. `OE_LOG=debug`.
pub const LOG_ENV: &str = "OE_LOG";

static INIT: OnceLock<()> = OnceLock::new();

pub fn init(verbose: bool) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    init_inner(verbose)?;
    let _ = INIT.set(());
    Ok(())
}

fn init_inner(verbose: bool) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(terminal_filter(verbose, std::env::var(LOG_ENV).ok().as_deref()));

    // The appender writes synchronously: the process image is replaced at
    // the end of a normal run and nothing would flush a background worker.
    let (file_layer, file_error) = match open_log_file() {
        Ok(appender) => {
            let layer = fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(false)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), None)
        }
        Err(err) => (None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(err) = file_error {
        warn!("file logging disabled: {err:#}");
    }
    Ok(())
}

fn terminal_filter(verbose: bool, directives: Option<&str>) -> EnvFilter {
    if let Some(directives) = directives.filter(|d| !d.is_empty())
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return filter;
    }
    EnvFilter::new(if verbose { "debug" } else { "info" })
}

fn open_log_file() -> Result<rolling::RollingFileAppender> {
    let log_path = determine_log_path(
        std::env::var_os("XDG_STATE_HOME").map(PathBuf::from),
        home::home_dir(),
    )?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory at {}", parent.display()))?;
    }
    let (directory, file_name) = split_path(&log_path)?;
    Ok(rolling::never(directory, file_name))
}

fn determine_log_path(state_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(state_home) = state_home.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(state_home.join("omnienv").join("omnienv.log"));
    }

    // XDG default: ~/.local/state/omnienv/omnienv.log
    if let Some(home_dir) = home_dir {
        return Ok(home_dir
            .join(".local")
            .join("state")
            .join("omnienv")
            .join("omnienv.log"));
    }

    Err(anyhow!("Cannot determine a state directory for the log file"))
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name"))?;

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((dir, file_name))
}
