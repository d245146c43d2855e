//! errwatch — streaming error incident aggregator for line-oriented logs.
//!
//! Pipes an application's log stream through unchanged while detecting
//! error lines, grouping each with surrounding context into incidents,
//! batching sealed incidents in a bounded queue, and handing batches to a
//! notification channel under an hourly rate limit with a startup grace
//! period.
//!
//! No persistence, no log storage; in-memory state + pass-through echo.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod limiter;
pub mod matcher;
pub mod notify;
pub mod queue;
pub mod runtime;
pub mod types;

pub use config::Config;
pub use engine::Aggregator;
pub use error::{ConfigError, NotifyError};
pub use types::{Batch, Incident};
