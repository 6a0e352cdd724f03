//! Session hub: named SSH sessions, their sub-channels, a credential vault
//! and per-host resource metrics.
//!
//! # Layout
//!
//! - [`transport`]: the remote-session seam ([`transport::Transport`]) and the
//!   russh-backed adapter
//! - [`session`]: per-connection lifecycle state machine
//! - [`registry`]: id to session map with the single "active" marker
//! - [`vault`]: encrypted, expiring password cache
//! - [`metrics`]: remote probe battery, local fallback, caching and the
//!   background poller
//! - [`storage`]: saved connection metadata
//! - [`service`]: the [`service::Hub`] facade composing all of the above
//! - [`commands`]: MCP tool surface over the hub

pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod schema;
pub mod service;
pub mod session;
pub mod storage;
pub mod transport;
pub mod types;
pub mod vault;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use commands::HubTools;
pub use config::HubConfig;
pub use error::HubError;
pub use service::Hub;

/// Locks a std mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
