//! DashMap-based connection store.

use chrono::Utc;
use dashmap::DashMap;

use super::traits::ConnectionStore;
use crate::hub::error::HubError;
use crate::hub::types::StoredConnection;

#[derive(Default)]
pub struct DashMapConnectionStore {
    connections: DashMap<String, StoredConnection>,
}

impl DashMapConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionStore for DashMapConnectionStore {
    fn add(&self, connection: StoredConnection) -> Result<(), HubError> {
        self.connections.insert(connection.id.clone(), connection);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<StoredConnection> {
        self.connections.get(id).map(|c| c.value().clone())
    }

    fn list(&self) -> Vec<StoredConnection> {
        let mut connections: Vec<_> = self
            .connections
            .iter()
            .map(|c| c.value().clone())
            .collect();
        connections.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        connections
    }

    fn remove(&self, id: &str) -> Result<bool, HubError> {
        Ok(self.connections.remove(id).is_some())
    }

    fn update_last_connected(&self, id: &str) -> Result<(), HubError> {
        if let Some(mut connection) = self.connections.get_mut(id) {
            connection.last_connected = Some(Utc::now().to_rfc3339());
        }
        Ok(())
    }
}
