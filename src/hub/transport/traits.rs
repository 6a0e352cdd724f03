//! Transport seam between the session state machine and a remote host.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::hub::error::HubError;

/// Lifecycle notifications emitted by a transport.
///
/// Only the latest value is observable, which is all the state machine needs:
/// a `Closed` immediately followed by `Ended` collapses to `Ended`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Created, not yet connected.
    Pending,
    /// Handshake and authentication completed.
    Ready,
    /// Fatal error on an established link.
    Error(String),
    /// Remote started closing.
    Closed,
    /// Link is fully gone.
    Ended,
}

/// Secrets used to authenticate. Never logged.
#[derive(Clone, Default)]
pub struct Credentials {
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
}

impl Credentials {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            key_path: None,
        }
    }

    pub fn key(key_path: impl Into<PathBuf>) -> Self {
        Self {
            password: None,
            key_path: Some(key_path.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.key_path.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .finish()
    }
}

/// Everything a transport needs to establish one link.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credentials: Credentials,
    /// Bound on handshake plus authentication for a single attempt
    pub connect_timeout: Duration,
    pub compress: bool,
    /// Extra attempts after the first one for transient failures
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Lazily opened file-transfer sub-channel.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    fn id(&self) -> &str;

    /// Writes raw subsystem bytes to the channel.
    async fn send(&self, data: &[u8]) -> Result<(), HubError>;

    async fn close(&self);
}

/// A remote session the hub can drive.
///
/// Implementations must be cheap to share behind `Arc` and safe to call from
/// any task.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes the link. Resolves once the remote is ready or fails.
    async fn connect(&self, config: &TransportConfig) -> Result<(), HubError>;

    /// Requests a graceful close and resolves once the remote acknowledges it
    /// or the grace period lapses and the link is destroyed. Only fails when
    /// the close request itself could not be issued.
    async fn disconnect(&self) -> Result<(), HubError>;

    /// Runs one command to completion and returns its stdout.
    ///
    /// Fails with [`HubError::CommandFailed`] only when the exit code is
    /// non-zero AND stderr is non-empty.
    async fn execute(&self, command: &str) -> Result<String, HubError>;

    /// Returns the cached file-transfer handle, opening it on first use.
    async fn file_transfer(&self) -> Result<Arc<dyn FileTransfer>, HubError>;

    fn is_active(&self) -> bool;

    fn events(&self) -> watch::Receiver<TransportEvent>;
}

/// Creates one transport per connect attempt.
pub trait TransportFactory: Send + Sync {
    fn create(&self, connection_id: &str) -> Arc<dyn Transport>;
}
