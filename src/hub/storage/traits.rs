//! Connection store contract.

use crate::hub::error::HubError;
use crate::hub::types::StoredConnection;

/// Storage for saved connection metadata. Never holds secrets.
///
/// Implementations must be thread-safe (`Send + Sync`); the hub calls them
/// from tool handlers and from the connect flow concurrently.
pub trait ConnectionStore: Send + Sync {
    /// Insert or replace by id.
    fn add(&self, connection: StoredConnection) -> Result<(), HubError>;

    fn get(&self, id: &str) -> Option<StoredConnection>;

    /// Sorted by name, then id.
    fn list(&self) -> Vec<StoredConnection>;

    /// Returns whether an entry was removed.
    fn remove(&self, id: &str) -> Result<bool, HubError>;

    /// Stamps the entry with the current time. Unknown ids are a no-op.
    fn update_last_connected(&self, id: &str) -> Result<(), HubError>;
}
