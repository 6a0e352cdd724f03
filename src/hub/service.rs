//! The hub facade: every operation the tool surface exposes.
//!
//! [`Hub`] owns the registry, vault, metrics collector and connection store
//! and implements the multi-step flows that span them (create and connect,
//! disconnect and forget, health checks). All collaborators are injected, so
//! tests run the full flows against the in-crate mock transport.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::hub::config::HubConfig;
use crate::hub::error::HubError;
use crate::hub::metrics::{MetricsCollector, MetricsPoller};
use crate::hub::registry::ConnectionRegistry;
use crate::hub::session::{ManagedSession, SessionSettings};
use crate::hub::storage::{ConnectionStore, DashMapConnectionStore};
use crate::hub::transport::{Credentials, RusshTransportFactory, TransportFactory};
use crate::hub::types::{
    ChannelType, MetricsSnapshot, SessionSnapshot, SessionSummary, StoredConnection,
};
use crate::hub::vault::{AesGcmCipher, CredentialVault, SecretCipher};

pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    vault: Arc<CredentialVault>,
    metrics: Arc<MetricsCollector>,
    store: Arc<dyn ConnectionStore>,
    config: HubConfig,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        factory: Arc<dyn TransportFactory>,
        cipher: Arc<dyn SecretCipher>,
        store: Arc<dyn ConnectionStore>,
    ) -> Self {
        let settings = SessionSettings {
            connect_timeout: config.connect_timeout,
            compress: config.compress,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        };

        Self {
            registry: Arc::new(ConnectionRegistry::new(factory, settings)),
            vault: Arc::new(CredentialVault::new(cipher, config.credential_ttl)),
            metrics: Arc::new(MetricsCollector::new(config.metrics_cache_ttl)),
            store,
            config,
        }
    }

    /// russh transports, a fresh AES-GCM key and the in-memory store.
    pub fn with_defaults(config: HubConfig) -> Self {
        let factory = Arc::new(RusshTransportFactory::new(
            config.command_timeout,
            config.disconnect_grace,
        ));
        Self::new(
            config,
            factory,
            Arc::new(AesGcmCipher::generate()),
            Arc::new(DashMapConnectionStore::new()),
        )
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Starts the background metrics poller at the configured cadence.
    pub fn spawn_poller(&self) -> MetricsPoller {
        MetricsPoller::spawn(
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            Arc::clone(&self.vault),
            self.config.poll_interval,
        )
    }

    fn session(&self, connection_id: &str) -> Result<Arc<ManagedSession>, HubError> {
        self.registry
            .get_session(connection_id)
            .ok_or_else(|| HubError::NotFound(connection_id.to_string()))
    }

    /// Registers a session, makes it active and records its metadata,
    /// including the key path. With any credentials it also connects right
    /// away.
    ///
    /// An existing session under the same id is disconnected and replaced.
    pub async fn create_session(
        &self,
        connection_id: &str,
        host: &str,
        port: u16,
        username: &str,
        credentials: Credentials,
    ) -> Result<Arc<ManagedSession>, HubError> {
        if let Some(previous) = self.registry.get_session(connection_id)
            && let Err(e) = previous.disconnect().await
        {
            warn!("Failed to close replaced session {}: {}", connection_id, e);
        }

        let session = self
            .registry
            .create_session(connection_id, host, port, username)?;
        self.registry.set_active(connection_id)?;

        let saved = self.store.get(connection_id);
        let key_path = match &credentials.key_path {
            Some(path) => Some(path.to_string_lossy().into_owned()),
            None => saved.as_ref().and_then(|c| c.key_path.clone()),
        };
        let record = StoredConnection {
            id: connection_id.to_string(),
            name: saved.map_or_else(|| connection_id.to_string(), |c| c.name),
            host: host.to_string(),
            port,
            username: username.to_string(),
            key_path,
            last_connected: None,
        };
        if let Err(e) = self.store.add(record) {
            warn!("Failed to save connection {}: {}", connection_id, e);
        }

        if !credentials.is_empty() {
            self.connect(connection_id, credentials, false).await?;
        }

        Ok(session)
    }

    /// Connects an existing session.
    ///
    /// Without an explicit password the vault is consulted, and without a key
    /// path the saved connection's one is used. An explicit password is
    /// cached on success (for 24 hours when `remember` is set). Vault and
    /// store failures are logged and never fail the connect.
    pub async fn connect(
        &self,
        connection_id: &str,
        credentials: Credentials,
        remember: bool,
    ) -> Result<(), HubError> {
        let session = self.session(connection_id)?;

        let explicit = credentials.password.clone();
        let password = credentials
            .password
            .or_else(|| self.vault.lookup(connection_id));
        let key_path = credentials.key_path.or_else(|| {
            self.store
                .get(connection_id)
                .and_then(|c| c.key_path)
                .map(PathBuf::from)
        });

        session.connect(Credentials { password, key_path }).await?;

        if let Some(password) = explicit
            && let Err(e) = self.vault.store(connection_id, &password, remember)
        {
            warn!("Failed to cache password for {}: {}", connection_id, e);
        }

        if let Err(e) = self.store.update_last_connected(connection_id) {
            warn!("Failed to stamp last connection for {}: {}", connection_id, e);
        }

        info!("Connection {} established", connection_id);
        Ok(())
    }

    pub fn get_active(&self) -> Option<SessionSnapshot> {
        self.registry.get_active().map(|s| s.snapshot())
    }

    pub fn set_active(&self, connection_id: &str) -> Result<(), HubError> {
        self.registry.set_active(connection_id)
    }

    pub fn get_state(&self, connection_id: &str) -> Result<SessionSnapshot, HubError> {
        Ok(self.session(connection_id)?.snapshot())
    }

    pub fn list_all(&self) -> Vec<SessionSummary> {
        self.registry.list_all()
    }

    /// Opens a channel record. File-transfer channels on a connected session
    /// also bring up the shared sftp handle and carry its id.
    pub async fn open_channel(
        &self,
        connection_id: &str,
        channel_type: ChannelType,
    ) -> Result<String, HubError> {
        let session = self.session(connection_id)?;

        let data = if channel_type == ChannelType::Sftp && session.is_connected() {
            let handle = session.file_transfer().await?;
            serde_json::json!({ "transferId": handle.id() })
        } else {
            serde_json::Value::Null
        };

        session.open_channel(channel_type, data)
    }

    pub fn close_channel(&self, connection_id: &str, channel_id: &str) -> Result<(), HubError> {
        self.session(connection_id)?.close_channel(channel_id);
        Ok(())
    }

    /// Closes the session and forgets it. Unknown ids succeed.
    ///
    /// The session is removed even when its transport fails to close; that
    /// failure is still returned.
    pub async fn disconnect(&self, connection_id: &str) -> Result<(), HubError> {
        let Some(session) = self.registry.get_session(connection_id) else {
            return Ok(());
        };

        let result = session.disconnect().await;
        self.registry.remove(connection_id);
        self.metrics.clear(connection_id);
        info!("Connection {} removed", connection_id);
        result
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.registry
            .get_session(connection_id)
            .is_some_and(|s| s.is_connected())
    }

    /// Disconnects and forgets every session.
    pub async fn clear_all(&self) {
        let sessions = self.registry.clear_all();
        let results = join_all(sessions.iter().map(|s| s.disconnect())).await;

        for (session, result) in sessions.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to close {} during clear: {}", session.connection_id(), e);
            }
        }
        self.metrics.clear_all();
        info!("Cleared {} session(s)", sessions.len());
    }

    pub fn store_password(
        &self,
        connection_id: &str,
        password: &str,
        remember: bool,
    ) -> Result<(), HubError> {
        self.vault.store(connection_id, password, remember)
    }

    pub fn get_password(&self, connection_id: &str) -> Option<String> {
        self.vault.lookup(connection_id)
    }

    pub fn has_password(&self, connection_id: &str) -> bool {
        self.vault.has(connection_id)
    }

    pub fn clear_password(&self, connection_id: &str) {
        self.vault.clear(connection_id);
    }

    pub fn clear_all_passwords(&self) {
        self.vault.clear_all();
    }

    pub async fn execute(&self, connection_id: &str, command: &str) -> Result<String, HubError> {
        self.session(connection_id)?.execute(command).await
    }

    /// Fresh remote metrics for a connected session.
    pub async fn remote_metrics(&self, connection_id: &str) -> Result<MetricsSnapshot, HubError> {
        let session = self.session(connection_id)?;
        let transport = session.transport().ok_or(HubError::NotConnected)?;
        self.metrics.collect(connection_id, transport.as_ref()).await
    }

    /// Health of a connection: remote metrics (cached for the short window)
    /// when the session is connected, otherwise the local host.
    pub async fn health_check(
        &self,
        connection_id: &str,
    ) -> Result<(bool, MetricsSnapshot), HubError> {
        let transport = self
            .registry
            .get_session(connection_id)
            .filter(|s| s.is_connected())
            .and_then(|s| s.transport());

        let snapshot = match transport {
            Some(transport) => {
                self.metrics
                    .collect_or_cached(connection_id, transport.as_ref())
                    .await?
            }
            None => self.metrics.local_status(connection_id).await?,
        };

        Ok((snapshot.is_healthy(), snapshot))
    }

    pub fn save_connection(&self, connection: StoredConnection) -> Result<(), HubError> {
        self.store.add(connection)
    }

    pub fn list_saved_connections(&self) -> Vec<StoredConnection> {
        self.store.list()
    }

    /// Forgets the metadata and any cached password.
    pub fn remove_saved_connection(&self, connection_id: &str) -> Result<bool, HubError> {
        let removed = self.store.remove(connection_id)?;
        self.vault.clear(connection_id);
        Ok(removed)
    }
}
