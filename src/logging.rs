use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber: a daily log file in `log_dir`, plus stderr when `verbose`.
///
/// `RUST_LOG` overrides `default_level`. Keep the returned guard alive until
/// exit or buffered lines are lost.
pub fn init(log_dir: &Path, default_level: &str, verbose: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

  let appender = tracing_appender::rolling::daily(log_dir, "agent.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

  let stderr_layer = verbose.then(|| {
    fmt::layer()
      .with_writer(std::io::stderr)
      .with_target(false)
  });

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
