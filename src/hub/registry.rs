//! Connection registry: id to session map plus the single "active" marker.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use crate::hub::error::HubError;
use crate::hub::lock;
use crate::hub::session::{ManagedSession, SessionSettings};
use crate::hub::transport::TransportFactory;
use crate::hub::types::{SessionSnapshot, SessionSummary};

pub struct ConnectionRegistry {
    sessions: DashMap<String, Arc<ManagedSession>>,
    active: Mutex<Option<String>>,
    factory: Arc<dyn TransportFactory>,
    settings: SessionSettings,
    /// Reject re-creating an existing id instead of replacing it
    unique_ids: bool,
}

impl ConnectionRegistry {
    pub fn new(factory: Arc<dyn TransportFactory>, settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            active: Mutex::new(None),
            factory,
            settings,
            unique_ids: false,
        }
    }

    /// Makes [`create_session`](Self::create_session) fail with
    /// [`HubError::DuplicateConnection`] for ids already registered.
    pub fn with_unique_ids(mut self) -> Self {
        self.unique_ids = true;
        self
    }

    /// Registers a new idle session. An existing entry under the same id is
    /// replaced unless unique ids are enforced; the caller owns tearing the
    /// previous one down.
    pub fn create_session(
        &self,
        connection_id: &str,
        host: &str,
        port: u16,
        username: &str,
    ) -> Result<Arc<ManagedSession>, HubError> {
        let session = Arc::new(ManagedSession::new(
            connection_id,
            host,
            port,
            username,
            Arc::clone(&self.factory),
            self.settings.clone(),
        ));

        if self.unique_ids {
            match self.sessions.entry(connection_id.to_string()) {
                Entry::Occupied(_) => {
                    return Err(HubError::DuplicateConnection(connection_id.to_string()));
                }
                Entry::Vacant(entry) => {
                    entry.insert(Arc::clone(&session));
                }
            }
        } else if self
            .sessions
            .insert(connection_id.to_string(), Arc::clone(&session))
            .is_some()
        {
            debug!("Replaced existing session {}", connection_id);
        }

        info!("Created session {} for {}@{}:{}", connection_id, username, host, port);
        Ok(session)
    }

    pub fn get_session(&self, connection_id: &str) -> Option<Arc<ManagedSession>> {
        self.sessions.get(connection_id).map(|s| Arc::clone(s.value()))
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.sessions.contains_key(connection_id)
    }

    pub fn set_active(&self, connection_id: &str) -> Result<(), HubError> {
        if !self.sessions.contains_key(connection_id) {
            return Err(HubError::NotFound(connection_id.to_string()));
        }
        *lock(&self.active) = Some(connection_id.to_string());
        debug!("Active session is now {}", connection_id);
        Ok(())
    }

    pub fn active_id(&self) -> Option<String> {
        lock(&self.active).clone()
    }

    pub fn get_active(&self) -> Option<Arc<ManagedSession>> {
        let active = self.active_id()?;
        self.get_session(&active)
    }

    /// Deletes a session. Clears the active marker if it pointed here.
    pub fn remove(&self, connection_id: &str) -> Option<Arc<ManagedSession>> {
        let removed = self.sessions.remove(connection_id).map(|(_, s)| s);
        let mut active = lock(&self.active);
        if active.as_deref() == Some(connection_id) {
            *active = None;
        }
        removed
    }

    /// Every registered session in no particular order.
    pub fn sessions(&self) -> Vec<Arc<ManagedSession>> {
        self.sessions.iter().map(|s| Arc::clone(s.value())).collect()
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions().iter().map(|s| s.snapshot()).collect()
    }

    pub fn list_all(&self) -> Vec<SessionSummary> {
        self.snapshots().into_iter().map(SessionSummary::from).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every entry and the active marker. Returns the removed sessions
    /// so the caller can close their transports.
    pub fn clear_all(&self) -> Vec<Arc<ManagedSession>> {
        let sessions = self.sessions();
        self.sessions.clear();
        *lock(&self.active) = None;
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::transport::mock::MockFactory;
    use crate::hub::types::ConnectionState;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(MockFactory::succeeding(), SessionSettings::default())
    }

    #[test]
    fn test_create_session_starts_idle() {
        let registry = registry();
        let session = registry.create_session("c1", "10.0.0.5", 22, "root").unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Idle);
        assert_eq!(snapshot.host, "10.0.0.5");
        assert_eq!(snapshot.channel_count, 0);
        assert!(registry.contains("c1"));
    }

    #[test]
    fn test_recreate_replaces_entry() {
        let registry = registry();
        let first = registry.create_session("c1", "old-host", 22, "root").unwrap();
        let second = registry.create_session("c1", "new-host", 2222, "root").unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_session("c1").unwrap().snapshot().host, "new-host");
    }

    #[test]
    fn test_unique_ids_reject_duplicates() {
        let registry = registry().with_unique_ids();
        registry.create_session("c1", "h", 22, "u").unwrap();

        let err = registry.create_session("c1", "h", 22, "u").err().unwrap();
        assert_eq!(err, HubError::DuplicateConnection("c1".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_active_unknown_id() {
        let registry = registry();
        assert_eq!(
            registry.set_active("nope").unwrap_err(),
            HubError::NotFound("nope".to_string())
        );
        assert!(registry.active_id().is_none());
    }

    #[test]
    fn test_remove_active_clears_marker() {
        let registry = registry();
        registry.create_session("c1", "h", 22, "u").unwrap();
        registry.set_active("c1").unwrap();

        assert!(registry.remove("c1").is_some());
        assert!(registry.get_active().is_none());
        assert!(registry.get_session("c1").is_none());
    }

    #[test]
    fn test_remove_other_keeps_active() {
        let registry = registry();
        registry.create_session("c1", "h", 22, "u").unwrap();
        registry.create_session("c2", "h", 22, "u").unwrap();
        registry.set_active("c1").unwrap();

        registry.remove("c2");
        assert_eq!(registry.active_id().as_deref(), Some("c1"));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = registry();
        assert!(registry.remove("ghost").is_none());
    }

    #[test]
    fn test_list_all_summaries() {
        let registry = registry();
        registry.create_session("c1", "h1", 22, "u").unwrap();
        registry.create_session("c2", "h2", 22, "u").unwrap();

        let mut ids: Vec<_> = registry
            .list_all()
            .into_iter()
            .map(|s| s.connection_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn test_clear_all() {
        let registry = registry();
        registry.create_session("c1", "h", 22, "u").unwrap();
        registry.create_session("c2", "h", 22, "u").unwrap();
        registry.set_active("c2").unwrap();

        let removed = registry.clear_all();
        assert_eq!(removed.len(), 2);
        assert!(registry.is_empty());
        assert!(registry.active_id().is_none());
    }
}
