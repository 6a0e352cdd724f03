//! Per-connection lifecycle state machine.
//!
//! ```text
//!            connect              ready
//!   idle ------------> connecting -----> connected
//!    ^  ^                  |                 |  |
//!    |  |         timeout/ |       remote    |  | remote error
//!    |  |         failure  v       close     v  v
//!    |  +---- connect -- error <---- disconnecting --> idle (ended)
//!    +------------------- disconnect ---------+
//! ```
//!
//! Transitions are serialized by an async operation lock, so concurrent
//! `connect`/`disconnect` calls on the same session run one after the other.
//! Remote-initiated transitions arrive through the transport's event channel
//! and are applied by a watcher task owned by the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::hub::error::HubError;
use crate::hub::transport::{
    Credentials, FileTransfer, Transport, TransportConfig, TransportEvent, TransportFactory,
};
use crate::hub::types::{Channel, ChannelType, ConnectionState, SessionSnapshot};
use crate::hub::{lock, now_millis, read, write};

/// Connect policy shared by every session of a registry.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    pub compress: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(crate::hub::config::DEFAULT_CONNECT_TIMEOUT_SECS),
            compress: true,
            max_retries: 0,
            retry_delay: Duration::from_millis(crate::hub::config::DEFAULT_RETRY_DELAY_MS),
        }
    }
}

#[derive(Debug, Default)]
struct Status {
    state: ConnectionState,
    connected_at: Option<i64>,
    error: Option<String>,
}

/// One named remote session and its sub-channels.
pub struct ManagedSession {
    connection_id: String,
    host: String,
    port: u16,
    username: String,
    status: RwLock<Status>,
    channels: DashMap<String, Channel>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    factory: Arc<dyn TransportFactory>,
    settings: SessionSettings,
    op_lock: tokio::sync::Mutex<()>,
    watcher: Mutex<Option<CancellationToken>>,
    /// Bumped whenever the attached transport is retired; events carrying an
    /// older value are dropped.
    generation: AtomicU64,
}

impl ManagedSession {
    pub fn new(
        connection_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        factory: Arc<dyn TransportFactory>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            host: host.into(),
            port,
            username: username.into(),
            status: RwLock::new(Status::default()),
            channels: DashMap::new(),
            transport: Mutex::new(None),
            factory,
            settings,
            op_lock: tokio::sync::Mutex::new(()),
            watcher: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn state(&self) -> ConnectionState {
        read(&self.status).state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Currently attached transport, if any.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        lock(&self.transport).clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = read(&self.status);
        SessionSnapshot {
            connection_id: self.connection_id.clone(),
            state: status.state,
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            connected_at: status.connected_at,
            error: status.error.clone(),
            channel_count: self.channels.len(),
        }
    }

    /// Any state change not carrying an error clears the previous one.
    fn set_state(&self, state: ConnectionState, error: Option<String>) {
        let mut status = write(&self.status);
        status.state = state;
        status.error = error;
        if state == ConnectionState::Connected {
            status.connected_at = Some(now_millis());
        }
    }

    /// Connects using a fresh transport. Valid from `idle` and `error` only.
    ///
    /// On timeout or failure the transport is torn down best-effort, detached,
    /// and the session lands in `error` with the failure message recorded.
    pub async fn connect(self: &Arc<Self>, credentials: Credentials) -> Result<(), HubError> {
        let _guard = self.op_lock.lock().await;

        let current = self.state();
        if !matches!(current, ConnectionState::Idle | ConnectionState::Error) {
            return Err(HubError::InvalidTransition {
                action: "connect",
                state: current.to_string(),
            });
        }

        // A remote error leaves the failed transport attached
        self.retire_link();
        let stale = lock(&self.transport).take();
        if let Some(stale) = stale {
            debug!("Closing stale transport of {}", self.connection_id);
            if let Err(e) = stale.disconnect().await {
                debug!("Stale transport of {} failed to close: {}", self.connection_id, e);
            }
        }

        let generation = {
            let mut status = write(&self.status);
            status.state = ConnectionState::Connecting;
            status.error = None;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let transport = self.factory.create(&self.connection_id);
        *lock(&self.transport) = Some(Arc::clone(&transport));

        let config = TransportConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            credentials,
            connect_timeout: self.settings.connect_timeout,
            compress: self.settings.compress,
            max_retries: self.settings.max_retries,
            retry_delay: self.settings.retry_delay,
        };

        info!(
            "Connecting session {} to {}@{}:{}",
            self.connection_id, self.username, self.host, self.port
        );

        // Covers every retry attempt, not just one handshake
        let bound = self.connect_bound();
        let outcome = match tokio::time::timeout(bound, transport.connect(&config)).await {
            Ok(result) => result,
            Err(_) => Err(HubError::Timeout(self.settings.connect_timeout)),
        };

        match outcome {
            Ok(()) => {
                self.set_state(ConnectionState::Connected, None);
                self.watch_transport(transport.events(), generation);
                info!("Session {} connected", self.connection_id);
                Ok(())
            }
            Err(e) => {
                error!("Session {} failed to connect: {}", self.connection_id, e);
                if let Err(close_err) = transport.disconnect().await {
                    debug!(
                        "Cleanup after failed connect of {} also failed: {}",
                        self.connection_id, close_err
                    );
                }
                *lock(&self.transport) = None;
                self.set_state(ConnectionState::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Upper bound on one whole connect including retries and backoff.
    fn connect_bound(&self) -> Duration {
        let attempts = self.settings.max_retries.saturating_add(1);
        let backoff = crate::hub::config::MAX_RETRY_DELAY.saturating_mul(self.settings.max_retries);
        self.settings
            .connect_timeout
            .saturating_mul(attempts)
            .saturating_add(backoff)
    }

    /// Closes every channel, then the transport. Valid from any state.
    ///
    /// Without a transport only the channels are cleared. A transport that
    /// cannot issue the close leaves the session in `error`.
    pub async fn disconnect(&self) -> Result<(), HubError> {
        let _guard = self.op_lock.lock().await;

        self.retire_link();
        self.close_all_channels();

        let Some(transport) = lock(&self.transport).take() else {
            return Ok(());
        };

        self.set_state(ConnectionState::Disconnecting, None);
        info!("Disconnecting session {}", self.connection_id);

        match transport.disconnect().await {
            Ok(()) => {
                self.set_state(ConnectionState::Idle, None);
                info!("Session {} disconnected", self.connection_id);
                Ok(())
            }
            Err(e) => {
                error!("Session {} failed to close cleanly: {}", self.connection_id, e);
                self.set_state(ConnectionState::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Records a new channel. Only requires an attached transport; the
    /// transport's own liveness is not re-checked.
    pub fn open_channel(
        &self,
        channel_type: ChannelType,
        data: serde_json::Value,
    ) -> Result<String, HubError> {
        if lock(&self.transport).is_none() {
            return Err(HubError::NoActiveSession);
        }

        let id = Uuid::new_v4().to_string();
        self.channels.insert(
            id.clone(),
            Channel {
                id: id.clone(),
                channel_type,
                data,
                created_at: now_millis(),
            },
        );
        debug!("Opened {} channel {} on {}", channel_type, id, self.connection_id);
        Ok(id)
    }

    /// Removes a channel; unknown ids are a no-op.
    pub fn close_channel(&self, channel_id: &str) {
        if self.channels.remove(channel_id).is_some() {
            debug!("Closed channel {} on {}", channel_id, self.connection_id);
        }
    }

    pub fn close_all_channels(&self) {
        self.channels.clear();
    }

    pub fn channel(&self, channel_id: &str) -> Option<Channel> {
        self.channels.get(channel_id).map(|c| c.value().clone())
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels.iter().map(|c| c.value().clone()).collect()
    }

    pub fn channels_by_type(&self, channel_type: ChannelType) -> Vec<Channel> {
        self.channels
            .iter()
            .filter(|c| c.channel_type == channel_type)
            .map(|c| c.value().clone())
            .collect()
    }

    pub async fn execute(&self, command: &str) -> Result<String, HubError> {
        let transport = self.transport().ok_or(HubError::NotConnected)?;
        transport.execute(command).await
    }

    pub async fn file_transfer(&self) -> Result<Arc<dyn FileTransfer>, HubError> {
        let transport = self.transport().ok_or(HubError::NotConnected)?;
        transport.file_transfer().await
    }

    /// Stops the watcher and invalidates events still in flight from it.
    fn retire_link(&self) {
        if let Some(token) = lock(&self.watcher).take() {
            token.cancel();
        }
        let _status = write(&self.status);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn watch_transport(
        self: &Arc<Self>,
        mut events: watch::Receiver<TransportEvent>,
        generation: u64,
    ) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.watcher).replace(token.clone()) {
            previous.cancel();
        }

        // Ignore whatever was current at attach time (normally `Ready`)
        events.borrow_and_update();
        let session: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = events.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let event = events.borrow_and_update().clone();
                        let Some(session) = session.upgrade() else { break };
                        if session.apply_transport_event(generation, event) {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Applies a remote-initiated event. Returns `true` once the link is gone
    /// or the event came from a transport that has since been retired.
    fn apply_transport_event(&self, generation: u64, event: TransportEvent) -> bool {
        let mut status = write(&self.status);
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Dropping event from retired transport of {}", self.connection_id);
            return true;
        }
        match event {
            TransportEvent::Error(message) if status.state == ConnectionState::Connected => {
                warn!("Session {} transport error: {}", self.connection_id, message);
                status.state = ConnectionState::Error;
                status.error = Some(message);
                false
            }
            TransportEvent::Closed if status.state == ConnectionState::Connected => {
                debug!("Session {} closing by remote", self.connection_id);
                status.state = ConnectionState::Disconnecting;
                status.error = None;
                false
            }
            TransportEvent::Ended => {
                if matches!(
                    status.state,
                    ConnectionState::Connected | ConnectionState::Disconnecting
                ) {
                    info!("Session {} ended by remote", self.connection_id);
                    status.state = ConnectionState::Idle;
                    status.error = None;
                }
                *lock(&self.transport) = None;
                self.channels.clear();
                drop(status);
                true
            }
            _ => false,
        }
    }
}

impl Drop for ManagedSession {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.watcher).take() {
            token.cancel();
        }
    }
}
