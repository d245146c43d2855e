//! Core types for the aggregator (incident model + dispatch contract).

use std::fmt;

// ---------------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------------

/// One sealed error event: the triggering error line(s) plus bounded
/// surrounding context, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
  /// Stable short id derived from the incident content.
  pub id: String,
  /// Raw lines: pre-error context, error line(s), trailing context.
  pub lines: Vec<String>,
}

impl Incident {
  /// Build an incident from accumulated lines, deriving its id.
  pub fn from_lines(lines: Vec<String>) -> Self {
    let mut hasher = blake3::Hasher::new();
    for line in &lines {
      hasher.update(line.as_bytes());
      hasher.update(b"\n");
    }
    let hex = hasher.finalize().to_hex();
    Self {
      id: format!("inc-{}", &hex[..16]),
      lines,
    }
  }

  pub fn len(&self) -> usize {
    self.lines.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// An ordered batch of sealed incidents handed to the notifier as one
/// delivery. Batch order equals seal order equals detection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
  pub incidents: Vec<Incident>,
  /// Number of lines across the batch that classify as errors (context
  /// lines that happen to match the pattern are counted too).
  pub error_count: usize,
}

// ---------------------------------------------------------------------------
// Seal reason
// ---------------------------------------------------------------------------

/// Why an open incident was closed and moved to the delivery queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealReason {
  /// The trailing context window after the last error line filled up.
  WindowExpired,
  /// The open incident grew past the hard size cap.
  SizeCap,
  /// A flush found the incident older than the running-time window.
  Stale,
  /// Final flush at end of stream.
  Shutdown,
}

impl fmt::Display for SealReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SealReason::WindowExpired => write!(f, "window_expired"),
      SealReason::SizeCap => write!(f, "size_cap"),
      SealReason::Stale => write!(f, "stale"),
      SealReason::Shutdown => write!(f, "shutdown"),
    }
  }
}
