//! Binary entrypoint: wrap a line-oriented log stream, pass it through to
//! stdout, and surface error incidents to a notification channel.
//!
//! Diagnostics go to stderr; stdout carries only the echoed stream.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use parking_lot::Mutex;
use tracing::error;

use errwatch::config::Config;
use errwatch::engine::Aggregator;
use errwatch::notify::{LogNotifier, Notifier, WebhookNotifier};
use errwatch::runtime::{self, FlushScheduler};

#[derive(Parser)]
#[command(
  name = "errwatch",
  version,
  about = "Watch a log stream and batch error incidents to a notification channel"
)]
struct Cli {
  /// Path to a dotenv-style config file. Defaults to ./.errwatch when that
  /// file exists; environment variables win over file values.
  config: Option<PathBuf>,

  /// Log scheduler and delivery diagnostics at debug level.
  #[arg(long)]
  verbose: bool,
}

fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
      }),
    )
    .init();

  let config_path = cli.config.or_else(|| {
    let default = PathBuf::from(".errwatch");
    default.exists().then_some(default)
  });
  let config = Config::load(config_path.as_deref()).context("configuration")?;

  let notifier: Arc<dyn Notifier> = match &config.webhook_url {
    Some(url) => {
      Arc::new(WebhookNotifier::new(&config.app_name, url).context("webhook client")?)
    }
    None => Arc::new(LogNotifier),
  };

  let flush_interval = config.flush_interval;
  let agg = Arc::new(Mutex::new(Aggregator::new(config, Instant::now())));

  let scheduler = FlushScheduler::spawn(Arc::clone(&agg), Arc::clone(&notifier), flush_interval);

  let stdin = io::stdin();
  let stdout = io::stdout();
  if let Err(e) = runtime::run_ingest(&agg, stdin.lock(), stdout.lock()) {
    error!(error = %e, "input stream error, shutting down");
  }

  // One last forced seal-and-flush so nothing queued is silently lost,
  // subject to the startup grace period.
  scheduler.shutdown();
  runtime::flush(&agg, notifier.as_ref(), Instant::now(), true);

  Ok(())
}
