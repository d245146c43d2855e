//! Notification channels: how assembled batches leave the process.
//!
//! The aggregator hands a [`Batch`] to a [`Notifier`]; message formatting
//! and transport are the channel's concern. Delivery is best-effort and at
//! most once: a failed batch is dropped, never retried.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::NotifyError;
use crate::types::Batch;

/// Delivery channel for sealed incident batches.
///
/// Implementations are only ever invoked from the flush actor, outside the
/// aggregator lock, so a slow channel never stalls ingestion.
pub trait Notifier: Send + Sync {
  fn name(&self) -> &str;

  fn deliver(&self, batch: &Batch) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// Outbound payload (JSON contract)
// ---------------------------------------------------------------------------

/// JSON body for webhook deliveries.
#[derive(Debug, Serialize)]
pub struct BatchPayload {
  pub app: String,
  pub generated_at: String,
  pub error_count: usize,
  pub incidents: Vec<IncidentPayload>,
}

#[derive(Debug, Serialize)]
pub struct IncidentPayload {
  pub id: String,
  pub lines: Vec<String>,
}

impl BatchPayload {
  pub fn from_batch(app: &str, batch: &Batch) -> Self {
    Self {
      app: app.to_string(),
      generated_at: Utc::now().to_rfc3339(),
      error_count: batch.error_count,
      incidents: batch
        .incidents
        .iter()
        .map(|incident| IncidentPayload {
          id: incident.id.clone(),
          lines: incident.lines.clone(),
        })
        .collect(),
    }
  }
}

/// Render a batch as plain text: lines verbatim in seal order, an ellipsis
/// marker between incidents.
pub fn render_text(batch: &Batch) -> String {
  let mut out = String::new();
  for (idx, incident) in batch.incidents.iter().enumerate() {
    for line in &incident.lines {
      out.push_str(line);
      out.push('\n');
    }
    if idx + 1 < batch.incidents.len() {
      out.push_str("…\n");
    }
  }
  out
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Channel that writes batches to the process log. The default when no
/// webhook endpoint is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn name(&self) -> &str {
    "log"
  }

  fn deliver(&self, batch: &Batch) -> Result<(), NotifyError> {
    info!(
      incidents = batch.incidents.len(),
      errors = batch.error_count,
      batch = %render_text(batch),
      "incident batch"
    );
    Ok(())
  }
}

/// Channel that POSTs the JSON payload to a configured endpoint. Any
/// non-success status is a delivery failure.
#[derive(Debug)]
pub struct WebhookNotifier {
  app_name: String,
  url: String,
  client: reqwest::blocking::Client,
}

impl WebhookNotifier {
  pub fn new(
    app_name: impl Into<String>,
    url: impl Into<String>,
  ) -> Result<Self, NotifyError> {
    let client = reqwest::blocking::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()?;
    Ok(Self {
      app_name: app_name.into(),
      url: url.into(),
      client,
    })
  }

  /// Serialize the outbound body; exposed so the contract is testable
  /// without a live endpoint.
  pub fn format_payload(&self, batch: &Batch) -> Result<String, NotifyError> {
    let payload = BatchPayload::from_batch(&self.app_name, batch);
    Ok(serde_json::to_string(&payload)?)
  }
}

impl Notifier for WebhookNotifier {
  fn name(&self) -> &str {
    "webhook"
  }

  fn deliver(&self, batch: &Batch) -> Result<(), NotifyError> {
    let body = self.format_payload(batch)?;
    let response = self
      .client
      .post(&self.url)
      .header("content-type", "application/json")
      .body(body)
      .send()?;

    let status = response.status();
    if !status.is_success() {
      return Err(NotifyError::Status {
        status: status.as_u16(),
      });
    }
    debug!(
      status = status.as_u16(),
      incidents = batch.incidents.len(),
      "batch delivered"
    );
    Ok(())
  }
}
