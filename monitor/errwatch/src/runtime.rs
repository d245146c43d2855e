//! Concurrent wiring: the ingest loop, the periodic flush actor, and the
//! dispatch path that runs outside the aggregator lock.
//!
//! Two actors share the aggregator for the lifetime of the process: the
//! ingest loop consuming the input stream, and the flush scheduler forcing
//! delivery on a timer. Every logical operation takes the one exclusive
//! lock; the notifier call itself always runs with the lock released, so a
//! slow channel never stalls ingestion.

use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::engine::Aggregator;
use crate::notify::Notifier;

/// Shared handle to the aggregator state.
pub type SharedAggregator = Arc<Mutex<Aggregator>>;

/// Seal anything stale, drain the queue under the lock, then deliver the
/// snapshot outside it. `final_run` marks the one forced flush at shutdown.
pub fn flush(
  agg: &SharedAggregator,
  notifier: &dyn Notifier,
  now: Instant,
  final_run: bool,
) {
  let batch = agg.lock().collect_batch(now, final_run);
  let Some(batch) = batch else {
    return;
  };

  match notifier.deliver(&batch) {
    Ok(()) => {
      agg.lock().confirm_delivery(Instant::now());
      info!(
        channel = notifier.name(),
        incidents = batch.incidents.len(),
        errors = batch.error_count,
        "delivered incident batch"
      );
    }
    Err(e) => {
      // At most once: the batch is gone. Ingestion is unaffected.
      warn!(
        channel = notifier.name(),
        error = %e,
        "delivery failed, batch dropped"
      );
    }
  }
}

/// Handle for the background flush actor.
pub struct FlushScheduler {
  stop: Sender<()>,
  handle: JoinHandle<()>,
}

impl FlushScheduler {
  /// Spawn the periodic flush actor.
  pub fn spawn(
    agg: SharedAggregator,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
  ) -> Self {
    let (stop, ticker) = mpsc::channel::<()>();
    let handle = thread::spawn(move || run_scheduler(&agg, notifier.as_ref(), interval, &ticker));
    Self { stop, handle }
  }

  /// Stop the actor and wait for it to exit. Does not flush; the caller
  /// owns the final forced flush.
  pub fn shutdown(self) {
    drop(self.stop);
    let _ = self.handle.join();
  }
}

fn run_scheduler(
  agg: &SharedAggregator,
  notifier: &dyn Notifier,
  interval: Duration,
  ticker: &Receiver<()>,
) {
  loop {
    match ticker.recv_timeout(interval) {
      Err(RecvTimeoutError::Timeout) => flush(agg, notifier, Instant::now(), false),
      Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
    }
  }
}

/// Consume the input stream line by line until end-of-stream.
///
/// Every line, blank ones included, is echoed verbatim to `echo` as it is
/// read, so the wrapped process's live output is never hidden. A read or
/// echo failure ends ingestion early; the caller still runs the final
/// flush, same as a clean end-of-stream.
pub fn run_ingest<R: BufRead, W: Write>(
  agg: &SharedAggregator,
  input: R,
  mut echo: W,
) -> std::io::Result<()> {
  for line in input.lines() {
    let line = line?;
    writeln!(echo, "{}", line)?;
    agg.lock().handle_line(&line, Instant::now());
  }
  Ok(())
}
