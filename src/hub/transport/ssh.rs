//! russh-backed [`Transport`].
//!
//! ## Connection lifecycle
//!
//! 1. **Client configuration**: keepalive every 10 seconds (three misses drop
//!    the link), optional zlib compression, no inactivity timeout since hub
//!    sessions are long-lived.
//! 2. **Handshake and authentication**: bounded as a whole by the connect
//!    timeout. When it lapses the in-flight attempt is dropped, which aborts
//!    the underlying TCP connection.
//! 3. **Retry**: transient failures are retried with exponential backoff and
//!    jitter via `backon`. Authentication failures are never retried.
//! 4. **Monitoring**: a background task watches the handle and reports a
//!    remote-initiated close as `Closed` then `Ended`.
//! 5. **Close**: a disconnect message is sent and the handle is given the
//!    grace period to shut down before it is dropped.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use russh::{ChannelMsg, Disconnect, client, keys};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::auth::{AuthChain, AuthStrategy};
use super::output::CommandOutput;
use super::traits::{FileTransfer, Transport, TransportConfig, TransportEvent, TransportFactory};
use crate::hub::config::MAX_RETRY_DELAY;
use crate::hub::error::{HubError, is_retryable};
use crate::hub::lock;

/// How often a closing or monitored handle is checked.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Client handler that accepts all host keys (like `StrictHostKeyChecking=no`).
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        // TODO: verify against known_hosts once saved connections carry a fingerprint
        Ok(true)
    }
}

/// Builds the russh client configuration.
pub(crate) fn build_client_config(compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(10)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

type SshHandle = client::Handle<SshClientHandler>;

/// Link status shared with the monitor task.
struct LinkState {
    active: AtomicBool,
    events: watch::Sender<TransportEvent>,
}

impl LinkState {
    fn emit(&self, event: TransportEvent) {
        self.events.send_replace(event);
    }
}

pub struct RusshTransport {
    connection_id: String,
    command_timeout: Duration,
    disconnect_grace: Duration,
    handle: Mutex<Option<Arc<SshHandle>>>,
    sftp: tokio::sync::Mutex<Option<Arc<dyn FileTransfer>>>,
    link: Arc<LinkState>,
    monitor: Mutex<Option<CancellationToken>>,
}

impl RusshTransport {
    pub fn new(
        connection_id: impl Into<String>,
        command_timeout: Duration,
        disconnect_grace: Duration,
    ) -> Self {
        let (events, _) = watch::channel(TransportEvent::Pending);
        Self {
            connection_id: connection_id.into(),
            command_timeout,
            disconnect_grace,
            handle: Mutex::new(None),
            sftp: tokio::sync::Mutex::new(None),
            link: Arc::new(LinkState {
                active: AtomicBool::new(false),
                events,
            }),
            monitor: Mutex::new(None),
        }
    }

    fn active_handle(&self) -> Result<Arc<SshHandle>, HubError> {
        if !self.link.active.load(Ordering::SeqCst) {
            return Err(HubError::NotConnected);
        }
        lock(&self.handle).clone().ok_or(HubError::NotConnected)
    }

    /// Reports a remote-initiated close once the handle shuts down on its own.
    fn spawn_monitor(&self, handle: Weak<SshHandle>) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.monitor).replace(token.clone()) {
            previous.cancel();
        }

        let link = Arc::clone(&self.link);
        let connection_id = self.connection_id.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(handle) = handle.upgrade() else { break };
                        if handle.is_closed() {
                            warn!("SSH link for {} closed by remote", connection_id);
                            link.active.store(false, Ordering::SeqCst);
                            link.emit(TransportEvent::Closed);
                            link.emit(TransportEvent::Ended);
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// One handshake plus authentication attempt, bounded by the connect timeout.
async fn open_session(config: &TransportConfig) -> Result<SshHandle, HubError> {
    let attempt = async {
        let client_config = build_client_config(config.compress);
        let mut handle = client::connect(
            client_config,
            (config.host.as_str(), config.port),
            SshClientHandler,
        )
        .await
        .map_err(|e| HubError::Transport(format!("Failed to connect: {}", e)))?;

        let chain = AuthChain::from_credentials(&config.credentials);
        if !chain.authenticate(&mut handle, &config.username).await? {
            return Err(HubError::AuthFailed(
                "no authentication methods succeeded".to_string(),
            ));
        }

        Ok(handle)
    };

    tokio::time::timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| HubError::Timeout(config.connect_timeout))?
}

#[async_trait]
impl Transport for RusshTransport {
    async fn connect(&self, config: &TransportConfig) -> Result<(), HubError> {
        let attempt_counter = AtomicU32::new(0);
        let target = format!("{}@{}:{}", config.username, config.host, config.port);

        let backoff = ExponentialBuilder::default()
            .with_min_delay(config.retry_delay)
            .with_max_delay(MAX_RETRY_DELAY)
            .with_max_times(config.max_retries as usize)
            .with_jitter();

        let result = (|| async {
            let current_attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);
            if current_attempt > 0 {
                warn!("SSH connection retry attempt {} to {}", current_attempt, target);
            }
            open_session(config).await
        })
        .retry(backoff)
        .when(|e| {
            let retryable = is_retryable(e);
            if !retryable {
                debug!("SSH connection to {} failed with non-retryable error: {}", target, e);
            }
            retryable
        })
        .notify(|err, dur| {
            warn!("SSH connection failed: {}. Retrying in {:?}", err, dur);
        })
        .await;

        let total_attempts = attempt_counter.load(Ordering::SeqCst);

        match result {
            Ok(handle) => {
                let handle = Arc::new(handle);
                self.spawn_monitor(Arc::downgrade(&handle));
                *lock(&self.handle) = Some(handle);
                self.link.active.store(true, Ordering::SeqCst);
                self.link.emit(TransportEvent::Ready);
                info!(
                    "SSH link {} ready ({} after {} attempt(s))",
                    self.connection_id, target, total_attempts
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "SSH connection to {} failed after {} attempt(s). Last error: {}",
                    target, total_attempts, e
                );
                self.link.active.store(false, Ordering::SeqCst);
                self.link.emit(TransportEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), HubError> {
        if let Some(token) = lock(&self.monitor).take() {
            token.cancel();
        }
        self.link.active.store(false, Ordering::SeqCst);

        if let Some(sftp) = self.sftp.lock().await.take() {
            sftp.close().await;
        }

        let Some(handle) = lock(&self.handle).take() else {
            return Ok(());
        };

        let grace = self.disconnect_grace;
        let closed = tokio::time::timeout(grace, async {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "Session closed", "en")
                .await
            {
                debug!("Disconnect request for {} failed: {}", self.connection_id, e);
            }
            while !handle.is_closed() {
                tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
            }
        })
        .await;

        if closed.is_err() {
            warn!(
                "No close acknowledgment for {} within {:?}, destroying link",
                self.connection_id, grace
            );
        }

        drop(handle);
        self.link.emit(TransportEvent::Closed);
        self.link.emit(TransportEvent::Ended);
        info!("SSH link {} closed", self.connection_id);
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<String, HubError> {
        let handle = self.active_handle()?;

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| HubError::Transport(format!("Failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| HubError::Transport(format!("Failed to execute command: {}", e)))?;

        let mut output = CommandOutput {
            stdout: Vec::with_capacity(4096),
            stderr: Vec::with_capacity(1024),
            exit_status: None,
        };

        let collected = tokio::time::timeout(self.command_timeout, async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        output.stdout.extend_from_slice(&data);
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) => {
                        // ext == 1 is stderr in SSH protocol
                        if ext == 1 {
                            output.stderr.extend_from_slice(&data);
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        output.exit_status = Some(exit_status);
                    }
                    Some(ChannelMsg::Eof) => {
                        if output.exit_status.is_some() {
                            break;
                        }
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                }
            }
        })
        .await;

        // Always close the channel so the session stays usable
        let _ = channel.close().await;

        if collected.is_err() {
            warn!(
                "Command on {} timed out after {:?} ({} bytes stdout so far)",
                self.connection_id,
                self.command_timeout,
                output.stdout.len()
            );
            return Err(HubError::Transport(format!(
                "Command timed out after {:?}",
                self.command_timeout
            )));
        }

        output.into_result()
    }

    async fn file_transfer(&self) -> Result<Arc<dyn FileTransfer>, HubError> {
        let mut cached = self.sftp.lock().await;
        if let Some(existing) = cached.as_ref() {
            return Ok(Arc::clone(existing));
        }

        let handle = self.active_handle()?;
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| HubError::Transport(format!("Failed to open channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| HubError::Transport(format!("Failed to start sftp subsystem: {}", e)))?;

        let sftp: Arc<dyn FileTransfer> = Arc::new(SftpChannel::new(channel));
        debug!("Opened file transfer channel {} on {}", sftp.id(), self.connection_id);
        *cached = Some(Arc::clone(&sftp));
        Ok(sftp)
    }

    fn is_active(&self) -> bool {
        self.link.active.load(Ordering::SeqCst)
    }

    fn events(&self) -> watch::Receiver<TransportEvent> {
        self.link.events.subscribe()
    }
}

/// Raw `sftp` subsystem channel.
pub struct SftpChannel {
    id: String,
    channel: tokio::sync::Mutex<russh::Channel<client::Msg>>,
}

impl SftpChannel {
    fn new(channel: russh::Channel<client::Msg>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: tokio::sync::Mutex::new(channel),
        }
    }
}

#[async_trait]
impl FileTransfer for SftpChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, data: &[u8]) -> Result<(), HubError> {
        self.channel
            .lock()
            .await
            .data(data)
            .await
            .map_err(|e| HubError::Transport(format!("Failed to write to sftp channel: {}", e)))
    }

    async fn close(&self) {
        let _ = self.channel.lock().await.close().await;
    }
}

/// Creates a fresh [`RusshTransport`] per connect.
#[derive(Debug, Clone)]
pub struct RusshTransportFactory {
    command_timeout: Duration,
    disconnect_grace: Duration,
}

impl RusshTransportFactory {
    pub fn new(command_timeout: Duration, disconnect_grace: Duration) -> Self {
        Self {
            command_timeout,
            disconnect_grace,
        }
    }
}

impl TransportFactory for RusshTransportFactory {
    fn create(&self, connection_id: &str) -> Arc<dyn Transport> {
        Arc::new(RusshTransport::new(
            connection_id,
            self.command_timeout,
            self.disconnect_grace,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod client_config {
        use super::*;

        #[test]
        fn test_keepalive_settings() {
            let config = build_client_config(true);
            assert_eq!(config.keepalive_interval, Some(Duration::from_secs(10)));
            assert_eq!(config.keepalive_max, 3);
        }

        #[test]
        fn test_no_inactivity_timeout() {
            let config = build_client_config(false);
            assert_eq!(config.inactivity_timeout, None);
        }

        #[test]
        fn test_compression_enabled_includes_zlib() {
            let config = build_client_config(true);
            // zlib preferred, with NONE as fallback
            assert_eq!(config.preferred.compression.len(), 2);
        }

        #[test]
        fn test_compression_disabled() {
            let config = build_client_config(false);
            assert_eq!(config.preferred.compression.len(), 1);
        }
    }

    mod unconnected {
        use super::*;

        fn transport() -> RusshTransport {
            RusshTransport::new("c1", Duration::from_secs(5), Duration::from_millis(50))
        }

        #[tokio::test]
        async fn test_execute_requires_connection() {
            let err = transport().execute("uptime").await.unwrap_err();
            assert_eq!(err, HubError::NotConnected);
        }

        #[tokio::test]
        async fn test_file_transfer_requires_connection() {
            let err = transport().file_transfer().await.err().unwrap();
            assert_eq!(err, HubError::NotConnected);
        }

        #[tokio::test]
        async fn test_disconnect_without_link_is_noop() {
            let transport = transport();
            assert!(transport.disconnect().await.is_ok());
            assert!(!transport.is_active());
            assert_eq!(*transport.events().borrow(), TransportEvent::Pending);
        }

        #[tokio::test]
        async fn test_connect_refused_reports_error_event() {
            let transport = transport();
            let config = TransportConfig {
                host: "127.0.0.1".to_string(),
                port: 1,
                username: "nobody".to_string(),
                credentials: crate::hub::transport::Credentials::password("x"),
                connect_timeout: Duration::from_secs(2),
                compress: false,
                max_retries: 0,
                retry_delay: Duration::from_millis(10),
            };
            assert!(transport.connect(&config).await.is_err());
            assert!(!transport.is_active());
            assert!(matches!(
                *transport.events().borrow(),
                TransportEvent::Error(_)
            ));
        }

        #[test]
        fn test_factory_creates_inactive_transport() {
            let factory =
                RusshTransportFactory::new(Duration::from_secs(1), Duration::from_secs(1));
            let transport = factory.create("c9");
            assert!(!transport.is_active());
        }
    }
}
