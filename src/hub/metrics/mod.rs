//! Host resource metrics.
//!
//! Remote metrics come from a fixed battery of shell probes executed over the
//! session transport; local metrics come from `sysinfo`. Both are cached per
//! connection id for a short window, and the [`MetricsPoller`] keeps remote
//! snapshots warm for connected sessions.

mod collector;
mod local;
mod poller;
mod probes;

pub use collector::MetricsCollector;
pub use poller::MetricsPoller;
