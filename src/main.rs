mod app;
mod auth;
mod board;
mod cache;
mod commands;
mod config;
mod event;
mod remote;
mod requests;
mod service;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

const LOG_FILE: &str = "intake.log";

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let cli = Cli::parse();

  // Load configuration
  let config = config::Config::load(cli.config.as_deref())?;
  let data_dir = config.data_dir()?;

  // Held until exit so buffered log lines get flushed
  let _log_guard = init_logging(&data_dir, cli.verbose)?;

  let app = app::App::new(config, &data_dir, cli.ephemeral)?;
  app.run(cli.command).await
}

/// Log to `intake.log` in the data directory, or to stderr with `--verbose`.
/// The filter comes from INTAKE_LOG and defaults to `info`.
fn init_logging(data_dir: &Path, verbose: bool) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_env("INTAKE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  if verbose {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  }

  std::fs::create_dir_all(data_dir)
    .map_err(|e| eyre!("Failed to create data directory {}: {}", data_dir.display(), e))?;
  let appender = tracing_appender::rolling::never(data_dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Ok(Some(guard))
}
