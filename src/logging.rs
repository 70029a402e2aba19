//! Tracing setup. Output goes to a daily-rolled file so stdout stays clean
//! for command output.

use std::path::{Path, PathBuf};

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "swbrowse=info";

/// Default log directory ($XDG_DATA_HOME/swbrowse/logs)
pub fn default_log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("swbrowse").join("logs"))
}

fn appender(dir: &Path) -> Result<RollingFileAppender> {
  RollingFileAppender::builder()
    .rotation(Rotation::DAILY)
    .filename_prefix("swbrowse")
    .filename_suffix("log")
    .build(dir)
    .map_err(|e| eyre!("Failed to open log directory {}: {}", dir.display(), e))
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
  let (writer, guard) = tracing_appender::non_blocking(appender(dir)?);

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
