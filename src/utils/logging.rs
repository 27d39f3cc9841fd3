/// Tracing subscriber setup
///
/// The terminal dashboard owns the screen, so in that mode logs go to a
/// daily-rotated file under the config directory. Every other mode logs to
/// stderr so stdout stays clean for `--json` output.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "cm_monitor=info,tower_http=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Human-readable logs on stderr
pub fn init_stderr() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to initialise logging")
}

/// Logs to `<dir>/cm-monitor.log.<date>`; keep the guard alive until exit
pub fn init_file(dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, "cm-monitor.log"));
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(guard)
}
