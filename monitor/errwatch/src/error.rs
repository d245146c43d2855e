//! Structured error types for errwatch.

use thiserror::Error;

/// Fatal configuration problems, reported once before ingestion starts.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("missing required config value: {name}")]
  MissingVar { name: &'static str },

  #[error("invalid regular expression in {name}: {source}")]
  BadPattern {
    name: &'static str,
    #[source]
    source: regex::Error,
  },

  #[error("invalid number in {name}: {value:?}")]
  BadNumber { name: &'static str, value: String },

  #[error("cannot read config file {path}: {reason}")]
  File { path: String, reason: String },
}

/// Delivery failures. Delivery is best-effort, at most once: the batch in
/// flight is dropped, ingestion is unaffected.
#[derive(Debug, Error)]
pub enum NotifyError {
  #[error("webhook request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("webhook returned status {status}")]
  Status { status: u16 },

  #[error("payload serialization failed: {0}")]
  Json(#[from] serde_json::Error),
}
