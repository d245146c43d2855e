//! Core aggregator: the per-line incident state machine.
//!
//! The aggregator is either Idle (no open incident) or Open (incident
//! accumulating behind a last-error marker). Error lines open or extend the
//! incident; normal lines within the trailing window extend it; the incident
//! seals into the delivery queue when the window fills, when the incident
//! hits the runaway size cap, when a flush finds it stale, or at shutdown.
//!
//! Both the ingest loop and the flush actor mutate this state; callers
//! serialize access with one exclusive lock per logical operation (see
//! `runtime`). Time is passed in as `Instant` arguments so the state machine
//! stays deterministic under test.

use std::time::Instant;

use tracing::debug;

use crate::config::Config;
use crate::context::ContextRing;
use crate::limiter::SendLedger;
use crate::matcher::{LineClass, PatternMatcher};
use crate::queue::DeliveryQueue;
use crate::types::{Batch, Incident, SealReason};

/// In-progress incident: accumulated lines plus the index of its most
/// recent error line.
#[derive(Debug)]
struct OpenIncident {
  lines: Vec<String>,
  last_error_index: u64,
}

/// The streaming incident aggregator. Owns every piece of shared state:
/// context ring, open incident, delivery queue, and send ledger.
pub struct Aggregator {
  config: Config,
  matcher: PatternMatcher,
  ring: ContextRing,
  open: Option<OpenIncident>,
  queue: DeliveryQueue,
  ledger: SendLedger,
  /// 1-based index of the most recent non-blank line.
  line_index: u64,
  /// When the open incident's first error arrived. Cleared on seal.
  error_since: Option<Instant>,
  started_at: Instant,
}

impl Aggregator {
  pub fn new(config: Config, started_at: Instant) -> Self {
    let matcher = PatternMatcher::new(
      config.match_pattern.clone(),
      config.ignore_pattern.clone(),
    );
    Self {
      matcher,
      ring: ContextRing::new(config.context_size),
      open: None,
      queue: DeliveryQueue::new(config.queue_capacity),
      ledger: SendLedger::new(config.max_alerts_per_hour),
      line_index: 0,
      error_since: None,
      started_at,
      config,
    }
  }

  /// Process one raw input line at `now`.
  ///
  /// Whitespace-only lines are ignored entirely: never indexed, never
  /// pushed to the ring, never part of an incident.
  pub fn handle_line(&mut self, line: &str, now: Instant) {
    if line.trim().is_empty() {
      return;
    }
    self.line_index += 1;
    let i = self.line_index;

    if self.queue.is_full() {
      // Queue saturated: keep the context rolling, drop incident content.
      self.ring.push(line);
      return;
    }

    match self.matcher.classify(line) {
      LineClass::Error => match &mut self.open {
        Some(open) => {
          // An error inside the trailing window extends the incident
          // instead of starting a new one.
          open.lines.push(line.to_string());
          open.last_error_index = i;
        }
        None => {
          let mut lines = self.ring.snapshot();
          lines.push(line.to_string());
          self.open = Some(OpenIncident {
            lines,
            last_error_index: i,
          });
          if self.error_since.is_none() {
            self.error_since = Some(now);
          }
          debug!(line = i, "incident opened");
        }
      },
      LineClass::Normal => {
        if let Some(open) = &mut self.open {
          let gap = i - open.last_error_index;
          if gap <= self.config.context_size as u64 {
            open.lines.push(line.to_string());
          }
        }
      }
    }

    // The ring reflects lines *before* the one being processed, so the
    // current line lands in it only now, as future context.
    self.ring.push(line);

    if let Some(open) = &self.open {
      let gap = i - open.last_error_index;
      if gap >= self.config.context_size as u64 {
        self.seal(SealReason::WindowExpired);
      } else if open.lines.len() > self.size_cap() {
        self.seal(SealReason::SizeCap);
      }
    }
  }

  /// Seal any stale open incident, then hand back everything queued as one
  /// batch, subject to the startup grace period and the hourly rate limit.
  ///
  /// Returns `None` when there is nothing to deliver. The caller must run
  /// the actual delivery *outside* the aggregator lock and report success
  /// through [`Aggregator::confirm_delivery`].
  pub fn collect_batch(&mut self, now: Instant, final_run: bool) -> Option<Batch> {
    if self.open.is_some() {
      let stale = self.error_since.map_or(false, |t| {
        now.saturating_duration_since(t) > self.config.running_time_window
      });
      if final_run || stale {
        self.seal(if final_run {
          SealReason::Shutdown
        } else {
          SealReason::Stale
        });
      }
    }

    // Don't deliver when the process dies less than the grace period
    // after boot (crash loop), unless the debug override is set.
    if final_run
      && now.saturating_duration_since(self.started_at) < self.config.startup_grace
      && !self.config.debug
    {
      debug!("within startup grace period, suppressing final delivery");
      return None;
    }

    if self.queue.is_empty() {
      return None;
    }

    if !self.ledger.allows(now) {
      // Over the hourly budget: discard rather than let a backlog grow
      // through an alert storm. Not retried, not requeued.
      let dropped = self.queue.drain_all();
      debug!(dropped = dropped.len(), "rate limit reached, discarding batch");
      return None;
    }

    let incidents = self.queue.drain_all();
    let error_count = incidents
      .iter()
      .flat_map(|incident| incident.lines.iter())
      .filter(|line| self.matcher.is_error(line))
      .count();
    Some(Batch {
      incidents,
      error_count,
    })
  }

  /// Record a completed delivery against the hourly budget.
  pub fn confirm_delivery(&mut self, now: Instant) {
    self.ledger.record(now);
  }

  pub fn queue_len(&self) -> usize {
    self.queue.len()
  }

  pub fn has_open_incident(&self) -> bool {
    self.open.is_some()
  }

  fn size_cap(&self) -> usize {
    self.config.context_size * 3
  }

  fn seal(&mut self, reason: SealReason) {
    let Some(open) = self.open.take() else {
      return;
    };
    self.error_since = None;
    let incident = Incident::from_lines(open.lines);
    if self.queue.enqueue(incident) {
      debug!(reason = %reason, depth = self.queue.len(), "incident sealed");
    } else {
      debug!(reason = %reason, "delivery queue full, incident dropped");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use regex::Regex;
  use std::time::Duration;

  fn make_config(context_size: usize) -> Config {
    let mut config = Config::new(Regex::new("error").unwrap());
    config.context_size = context_size;
    config.debug = true;
    config
  }

  fn feed(agg: &mut Aggregator, lines: &[&str], now: Instant) {
    for line in lines {
      agg.handle_line(line, now);
    }
  }

  #[test]
  fn round_trip_context_window() {
    let now = Instant::now();
    let mut agg = Aggregator::new(make_config(3), now);
    feed(
      &mut agg,
      &[
        "ok1",
        "ok2",
        "boom error",
        "ok3",
        "ok4",
        "ok5",
        "ok6",
        "ok7",
        "ok8",
        "ok9",
      ],
      now,
    );

    assert_eq!(agg.queue_len(), 1);
    assert!(!agg.has_open_incident());

    let batch = agg.collect_batch(now, false).unwrap();
    assert_eq!(batch.incidents.len(), 1);
    assert_eq!(
      batch.incidents[0].lines,
      vec!["ok1", "ok2", "boom error", "ok3", "ok4", "ok5"]
    );
    assert_eq!(batch.error_count, 1);
  }

  #[test]
  fn pre_context_limited_by_availability() {
    let now = Instant::now();
    let mut agg = Aggregator::new(make_config(3), now);
    feed(&mut agg, &["error here", "a", "b", "c"], now);

    let batch = agg.collect_batch(now, false).unwrap();
    assert_eq!(batch.incidents[0].lines, vec!["error here", "a", "b", "c"]);
  }

  #[test]
  fn overlapping_errors_extend_one_incident() {
    let now = Instant::now();
    let mut agg = Aggregator::new(make_config(3), now);
    feed(
      &mut agg,
      &["ok", "error one", "mid", "error two", "a", "b", "c"],
      now,
    );

    assert_eq!(agg.queue_len(), 1);
    let batch = agg.collect_batch(now, false).unwrap();
    assert_eq!(
      batch.incidents[0].lines,
      vec!["ok", "error one", "mid", "error two", "a", "b", "c"]
    );
    assert_eq!(batch.error_count, 2);
  }

  #[test]
  fn error_after_window_opens_new_incident() {
    let now = Instant::now();
    let mut agg = Aggregator::new(make_config(2), now);
    // First incident seals after two trailing lines; the next error opens
    // a fresh one seeded from the ring, overlapping delivered lines.
    feed(&mut agg, &["error one", "a", "b", "error two"], now);

    assert_eq!(agg.queue_len(), 1);
    assert!(agg.has_open_incident());

    let batch = agg.collect_batch(now, true).unwrap();
    assert_eq!(batch.incidents.len(), 2);
    assert_eq!(batch.incidents[0].lines, vec!["error one", "a", "b"]);
    assert_eq!(batch.incidents[1].lines, vec!["a", "b", "error two"]);
  }

  #[test]
  fn blank_lines_are_invisible() {
    let now = Instant::now();
    let mut agg = Aggregator::new(make_config(3), now);
    feed(
      &mut agg,
      &["error boom", "", "   ", "a", "\t", "b", "c"],
      now,
    );

    assert_eq!(agg.queue_len(), 1);
    let batch = agg.collect_batch(now, false).unwrap();
    assert_eq!(batch.incidents[0].lines, vec!["error boom", "a", "b", "c"]);
  }

  #[test]
  fn runaway_burst_seals_at_size_cap() {
    let now = Instant::now();
    let mut agg = Aggregator::new(make_config(2), now);
    // Cap is 3 * C = 6 lines; consecutive errors keep resetting the
    // window, so only the cap can close the incident.
    for n in 0..7 {
      agg.handle_line(&format!("error {}", n), now);
    }

    assert_eq!(agg.queue_len(), 1);
    assert!(!agg.has_open_incident());
    let batch = agg.collect_batch(now, false).unwrap();
    assert_eq!(batch.incidents[0].len(), 7);
  }

  #[test]
  fn saturated_queue_sheds_new_incidents() {
    let now = Instant::now();
    let mut config = make_config(2);
    config.queue_capacity = 2;
    let mut agg = Aggregator::new(config, now);

    for _ in 0..4 {
      feed(&mut agg, &["error boom", "a", "b"], now);
    }

    assert_eq!(agg.queue_len(), 2);
    assert!(!agg.has_open_incident());
  }

  #[test]
  fn stale_incident_sealed_by_flush() {
    let t0 = Instant::now();
    let mut agg = Aggregator::new(make_config(3), t0);
    agg.handle_line("error lonely", t0);
    assert!(agg.has_open_incident());

    // Within the running-time window: not stale yet.
    assert!(agg
      .collect_batch(t0 + Duration::from_secs(30), false)
      .is_none());
    assert!(agg.has_open_incident());

    let batch = agg
      .collect_batch(t0 + Duration::from_secs(121), false)
      .unwrap();
    assert_eq!(batch.incidents[0].lines, vec!["error lonely"]);
    assert!(!agg.has_open_incident());
  }

  #[test]
  fn staleness_measured_from_first_error() {
    let t0 = Instant::now();
    let mut agg = Aggregator::new(make_config(5), t0);
    agg.handle_line("error first", t0);
    // A later error extends the incident but does not move the clock.
    agg.handle_line("error again", t0 + Duration::from_secs(100));

    let batch = agg
      .collect_batch(t0 + Duration::from_secs(121), false)
      .unwrap();
    assert_eq!(batch.incidents.len(), 1);
    assert_eq!(batch.error_count, 2);
  }

  #[test]
  fn final_run_seals_and_delivers() {
    let now = Instant::now();
    let mut agg = Aggregator::new(make_config(3), now);
    agg.handle_line("error at eof", now);

    let batch = agg.collect_batch(now, true).unwrap();
    assert_eq!(batch.incidents[0].lines, vec!["error at eof"]);
  }

  #[test]
  fn grace_period_suppresses_final_delivery() {
    let now = Instant::now();
    let mut config = make_config(3);
    config.debug = false;
    let mut agg = Aggregator::new(config, now);
    agg.handle_line("error young", now);

    assert!(agg
      .collect_batch(now + Duration::from_secs(5), true)
      .is_none());
  }

  #[test]
  fn grace_period_expires_with_uptime() {
    let t0 = Instant::now();
    let mut config = make_config(3);
    config.debug = false;
    let mut agg = Aggregator::new(config, t0);
    let later = t0 + Duration::from_secs(61);
    agg.handle_line("error old enough", later);

    assert!(agg.collect_batch(later, true).is_some());
  }

  #[test]
  fn grace_period_does_not_gate_periodic_flush() {
    let now = Instant::now();
    let mut config = make_config(2);
    config.debug = false;
    let mut agg = Aggregator::new(config, now);
    feed(&mut agg, &["error boom", "a", "b"], now);

    assert!(agg.collect_batch(now, false).is_some());
  }

  #[test]
  fn rate_limit_discards_queued_batch() {
    let now = Instant::now();
    let mut config = make_config(2);
    config.max_alerts_per_hour = 1;
    let mut agg = Aggregator::new(config, now);

    feed(&mut agg, &["error one", "a", "b"], now);
    assert!(agg.collect_batch(now, false).is_some());
    agg.confirm_delivery(now);

    feed(&mut agg, &["error two", "a", "b"], now);
    assert!(agg.collect_batch(now, false).is_none());
    // Discarded, not requeued.
    assert_eq!(agg.queue_len(), 0);
  }

  #[test]
  fn failed_delivery_does_not_consume_budget() {
    let now = Instant::now();
    let mut config = make_config(2);
    config.max_alerts_per_hour = 1;
    let mut agg = Aggregator::new(config, now);

    feed(&mut agg, &["error one", "a", "b"], now);
    // Batch collected but never confirmed (delivery failed).
    assert!(agg.collect_batch(now, false).is_some());

    feed(&mut agg, &["error two", "a", "b"], now);
    assert!(agg.collect_batch(now, false).is_some());
  }

  #[test]
  fn error_count_counts_every_matching_line() {
    let now = Instant::now();
    let mut agg = Aggregator::new(make_config(2), now);
    feed(&mut agg, &["error-ish prelude", "error boom", "a", "b"], now);

    let batch = agg.collect_batch(now, false).unwrap();
    assert_eq!(batch.error_count, 2);
  }
}
