//! Bounded delivery queue of sealed incidents.

use std::collections::VecDeque;

use crate::types::Incident;

/// FIFO queue with a hard capacity. Enqueue on a full queue is a silent
/// no-op: lost telemetry is preferred over unbounded memory growth or a
/// blocked ingest path. Entries leave only as one whole batch.
#[derive(Debug)]
pub struct DeliveryQueue {
  capacity: usize,
  incidents: VecDeque<Incident>,
}

impl DeliveryQueue {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      incidents: VecDeque::with_capacity(capacity),
    }
  }

  /// Append at the tail. Returns false (dropping the incident) when full.
  pub fn enqueue(&mut self, incident: Incident) -> bool {
    if self.incidents.len() >= self.capacity {
      return false;
    }
    self.incidents.push_back(incident);
    true
  }

  /// Atomically remove and return every queued incident, in seal order.
  pub fn drain_all(&mut self) -> Vec<Incident> {
    self.incidents.drain(..).collect()
  }

  pub fn len(&self) -> usize {
    self.incidents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.incidents.is_empty()
  }

  pub fn is_full(&self) -> bool {
    self.incidents.len() >= self.capacity
  }
}
