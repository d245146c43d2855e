//! Runtime configuration: compiled patterns plus the aggregator tunables.
//!
//! Values come from a dotenv-style config file (optional) layered with
//! process environment variables; the environment wins because the file is
//! loaded without overwriting variables that are already set. A malformed
//! pattern or number is a fatal startup error, never a per-line failure.

use std::path::Path;
use std::time::Duration;

use regex::Regex;

use crate::error::ConfigError;

const VAR_MATCH_PATTERN: &str = "ERRWATCH_MATCH_PATTERN";
const VAR_IGNORE_PATTERN: &str = "ERRWATCH_IGNORE_PATTERN";
const VAR_APP_NAME: &str = "ERRWATCH_APP_NAME";
const VAR_WEBHOOK_URL: &str = "ERRWATCH_WEBHOOK_URL";
const VAR_MAX_ALERTS_PER_HOUR: &str = "ERRWATCH_MAX_ALERTS_PER_HOUR";
const VAR_CONTEXT_SIZE: &str = "ERRWATCH_CONTEXT_SIZE";
const VAR_QUEUE_CAPACITY: &str = "ERRWATCH_QUEUE_CAPACITY";
const VAR_RUNNING_TIME_WINDOW_SECS: &str = "ERRWATCH_RUNNING_TIME_WINDOW_SECS";
const VAR_FLUSH_INTERVAL_SECS: &str = "ERRWATCH_FLUSH_INTERVAL_SECS";
const VAR_STARTUP_GRACE_SECS: &str = "ERRWATCH_STARTUP_GRACE_SECS";
const VAR_DEBUG: &str = "ERRWATCH_DEBUG";

/// Tunables for the incident aggregator.
#[derive(Debug, Clone)]
pub struct Config {
  /// Lines matching this pattern open or extend an incident.
  pub match_pattern: Regex,
  /// Lines matching this pattern are never errors, even when the match
  /// pattern hits.
  pub ignore_pattern: Option<Regex>,
  /// Application name carried in outbound notifications.
  pub app_name: String,
  /// Webhook endpoint; when unset, batches go to the log channel.
  pub webhook_url: Option<String>,
  /// Max deliveries per rolling hour.
  pub max_alerts_per_hour: usize,
  /// Lines of context kept before and after an error.
  pub context_size: usize,
  /// Max sealed incidents awaiting delivery.
  pub queue_capacity: usize,
  /// An open incident whose first error is older than this is sealed by
  /// the next flush.
  pub running_time_window: Duration,
  /// Flush actor period.
  pub flush_interval: Duration,
  /// Suppress the shutdown delivery when the process dies younger than
  /// this.
  pub startup_grace: Duration,
  /// Debug override: deliver even within the startup grace period.
  pub debug: bool,
}

impl Config {
  /// Default tunables for the given match pattern.
  pub fn new(match_pattern: Regex) -> Self {
    Self {
      match_pattern,
      ignore_pattern: None,
      app_name: "app".to_string(),
      webhook_url: None,
      max_alerts_per_hour: 5,
      context_size: 8,
      queue_capacity: 5,
      running_time_window: Duration::from_secs(120),
      flush_interval: Duration::from_secs(30),
      startup_grace: Duration::from_secs(60),
      debug: false,
    }
  }

  /// Load from an optional dotenv-style file layered with the process
  /// environment.
  pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
    if let Some(path) = file {
      dotenv::from_path(path).map_err(|e| ConfigError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
      })?;
    }
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  /// Build from a key lookup. The injection point for tests; `load` passes
  /// the process environment.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let raw_match = lookup(VAR_MATCH_PATTERN)
      .filter(|v| !v.is_empty())
      .ok_or(ConfigError::MissingVar {
        name: VAR_MATCH_PATTERN,
      })?;
    let match_pattern = compile_pattern(VAR_MATCH_PATTERN, &raw_match)?;

    let mut config = Self::new(match_pattern);

    if let Some(raw) = lookup(VAR_IGNORE_PATTERN).filter(|v| !v.is_empty()) {
      config.ignore_pattern = Some(compile_pattern(VAR_IGNORE_PATTERN, &raw)?);
    }
    if let Some(name) = lookup(VAR_APP_NAME).filter(|v| !v.is_empty()) {
      config.app_name = name;
    }
    config.webhook_url = lookup(VAR_WEBHOOK_URL).filter(|v| !v.is_empty());

    if let Some(raw) = lookup(VAR_MAX_ALERTS_PER_HOUR) {
      config.max_alerts_per_hour = parse_number(VAR_MAX_ALERTS_PER_HOUR, &raw)?;
    }
    if let Some(raw) = lookup(VAR_CONTEXT_SIZE) {
      config.context_size = parse_number(VAR_CONTEXT_SIZE, &raw)?;
    }
    if let Some(raw) = lookup(VAR_QUEUE_CAPACITY) {
      config.queue_capacity = parse_number(VAR_QUEUE_CAPACITY, &raw)?;
    }
    if let Some(raw) = lookup(VAR_RUNNING_TIME_WINDOW_SECS) {
      config.running_time_window =
        Duration::from_secs(parse_number(VAR_RUNNING_TIME_WINDOW_SECS, &raw)? as u64);
    }
    if let Some(raw) = lookup(VAR_FLUSH_INTERVAL_SECS) {
      config.flush_interval =
        Duration::from_secs(parse_number(VAR_FLUSH_INTERVAL_SECS, &raw)? as u64);
    }
    if let Some(raw) = lookup(VAR_STARTUP_GRACE_SECS) {
      config.startup_grace =
        Duration::from_secs(parse_number(VAR_STARTUP_GRACE_SECS, &raw)? as u64);
    }
    config.debug = lookup(VAR_DEBUG)
      .map(|v| v == "true" || v == "1")
      .unwrap_or(false);

    Ok(config)
  }
}

fn compile_pattern(name: &'static str, raw: &str) -> Result<Regex, ConfigError> {
  Regex::new(raw).map_err(|source| ConfigError::BadPattern { name, source })
}

fn parse_number(name: &'static str, raw: &str) -> Result<usize, ConfigError> {
  raw.trim().parse().map_err(|_| ConfigError::BadNumber {
    name,
    value: raw.to_string(),
  })
}
