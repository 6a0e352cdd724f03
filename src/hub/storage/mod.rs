//! Saved connection metadata.
//!
//! The hub only needs a narrow store contract: record a connection when a
//! session is created, stamp it on successful connect, list and remove
//! entries. Durable backends plug in through [`ConnectionStore`]; the
//! in-process [`DashMapConnectionStore`] is the default.

mod memory;
mod traits;

pub use memory::DashMapConnectionStore;
pub use traits::ConnectionStore;
