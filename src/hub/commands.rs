//! MCP tool surface over the [`Hub`].
//!
//! Every tool answers with a `{success, ..., error?}` envelope; hub errors
//! never escape as protocol errors.
//!
//! - Sessions: `create_session`, `connect`, `disconnect`, `get_active`,
//!   `set_active`, `get_state`, `list_all`, `is_connected`, `clear_all`
//! - Channels: `open_channel`, `close_channel`
//! - Remote work: `execute`, `get_remote_metrics`, `health_check`
//! - Vault: `store_password`, `get_password`, `has_password`,
//!   `clear_password`, `clear_all_passwords`
//! - Saved connections: `save_connection`, `list_saved_connections`,
//!   `remove_saved_connection`

use std::path::PathBuf;
use std::sync::Arc;

use poem_mcpserver::{Tools, tool::StructuredContent};
use tracing::{info, warn};

use crate::hub::error::HubError;
use crate::hub::service::Hub;
use crate::hub::transport::Credentials;
use crate::hub::types::{
    AckResponse, ChannelType, CreateSessionResponse, ExecuteResponse, HasPasswordResponse,
    HealthCheckResponse, IsConnectedResponse, ListConnectionsResponse, MetricsResponse,
    MetricsSnapshot, OpenChannelResponse, PasswordResponse, SavedConnectionsResponse,
    SessionSnapshot, SessionStateResponse, StoredConnection,
};

pub struct HubTools {
    hub: Arc<Hub>,
}

impl HubTools {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

fn credentials(password: Option<String>, key_path: Option<String>) -> Credentials {
    Credentials {
        password,
        key_path: key_path.map(PathBuf::from),
    }
}

fn ack(result: Result<(), HubError>, message: impl Into<String>) -> AckResponse {
    match result {
        Ok(()) => AckResponse::ok(message),
        Err(e) => AckResponse::failed(e),
    }
}

fn state_response(result: Result<SessionSnapshot, HubError>) -> SessionStateResponse {
    match result {
        Ok(connection) => SessionStateResponse {
            success: true,
            connection: Some(connection),
            error: None,
        },
        Err(e) => SessionStateResponse::failed(e),
    }
}

fn metrics_response(result: Result<MetricsSnapshot, HubError>) -> MetricsResponse {
    match result {
        Ok(metrics) => MetricsResponse {
            success: true,
            metrics: Some(metrics),
            error: None,
        },
        Err(e) => MetricsResponse::failed(e),
    }
}

fn health_response(result: Result<(bool, MetricsSnapshot), HubError>) -> HealthCheckResponse {
    match result {
        Ok((is_healthy, metrics)) => HealthCheckResponse {
            success: true,
            is_healthy: Some(is_healthy),
            metrics: Some(metrics),
            error: None,
        },
        Err(e) => HealthCheckResponse::failed(e),
    }
}

fn execute_response(result: Result<String, HubError>) -> ExecuteResponse {
    match result {
        Ok(output) => ExecuteResponse {
            success: true,
            output: Some(output),
            error: None,
        },
        Err(e) => ExecuteResponse::failed(e),
    }
}

#[Tools]
impl HubTools {
    /// Register a named SSH session and make it the active one.
    ///
    /// When a password or key path is supplied the session connects
    /// immediately; otherwise it stays idle until `connect` is called. The key
    /// path is saved with the connection. Re-using an existing connection_id
    /// closes and replaces that session.
    async fn create_session(
        &self,
        /// Caller-chosen identifier for the connection (e.g. "prod-web-1")
        connection_id: String,
        /// Hostname or IP address of the SSH server
        host: String,
        /// SSH port (usually 22)
        port: u16,
        /// SSH username
        username: String,
        /// Password; connects right away when provided
        password: Option<String>,
        /// Path to a private key file on the hub host (e.g. "~/.ssh/id_ed25519")
        key_path: Option<String>,
    ) -> StructuredContent<CreateSessionResponse> {
        info!("Creating session {} for {}@{}:{}", connection_id, username, host, port);

        let auth = credentials(password, key_path);
        match self
            .hub
            .create_session(&connection_id, &host, port, &username, auth)
            .await
        {
            Ok(session) => StructuredContent(CreateSessionResponse {
                success: true,
                message: Some(format!("Session {} is {}", connection_id, session.state())),
                connection_id: Some(connection_id),
                error: None,
            }),
            Err(e) => {
                warn!("Failed to create session {}: {}", connection_id, e);
                StructuredContent(CreateSessionResponse {
                    connection_id: Some(connection_id),
                    ..CreateSessionResponse::failed(e)
                })
            }
        }
    }

    /// Connect an existing session.
    ///
    /// Without a password the cached one is used, and without a key path the
    /// saved one. A supplied password is cached on success; `remember=true`
    /// keeps it for 24 hours instead of only for this process.
    async fn connect(
        &self,
        /// Connection identifier from create_session
        connection_id: String,
        /// Password (optional when one is cached)
        password: Option<String>,
        /// Path to a private key file on the hub host
        key_path: Option<String>,
        /// Keep the password for 24 hours (default: false)
        remember: Option<bool>,
    ) -> StructuredContent<AckResponse> {
        let result = self
            .hub
            .connect(
                &connection_id,
                credentials(password, key_path),
                remember.unwrap_or(false),
            )
            .await;
        StructuredContent(ack(result, format!("Connected {}", connection_id)))
    }

    /// Close a session, drop all its channels and forget it.
    async fn disconnect(
        &self,
        /// Connection identifier to disconnect
        connection_id: String,
    ) -> StructuredContent<AckResponse> {
        let result = self.hub.disconnect(&connection_id).await;
        StructuredContent(ack(result, format!("Disconnected {}", connection_id)))
    }

    /// Snapshot of the active session.
    async fn get_active(&self) -> StructuredContent<SessionStateResponse> {
        StructuredContent(match self.hub.get_active() {
            Some(connection) => SessionStateResponse {
                success: true,
                connection: Some(connection),
                error: None,
            },
            None => SessionStateResponse::failed("No active connection"),
        })
    }

    /// Make another registered session the active one.
    async fn set_active(
        &self,
        /// Connection identifier to activate
        connection_id: String,
    ) -> StructuredContent<AckResponse> {
        let result = self.hub.set_active(&connection_id);
        StructuredContent(ack(result, format!("Active connection is {}", connection_id)))
    }

    /// Snapshot of one session: state, endpoint, connect time, last error and
    /// channel count.
    async fn get_state(
        &self,
        /// Connection identifier
        connection_id: String,
    ) -> StructuredContent<SessionStateResponse> {
        StructuredContent(state_response(self.hub.get_state(&connection_id)))
    }

    /// Summaries of every registered session.
    async fn list_all(&self) -> StructuredContent<ListConnectionsResponse> {
        StructuredContent(ListConnectionsResponse {
            success: true,
            connections: self.hub.list_all(),
            error: None,
        })
    }

    /// Whether a session is currently connected. Unknown ids report false.
    async fn is_connected(
        &self,
        /// Connection identifier
        connection_id: String,
    ) -> StructuredContent<IsConnectedResponse> {
        StructuredContent(IsConnectedResponse {
            success: true,
            is_connected: Some(self.hub.is_connected(&connection_id)),
            error: None,
        })
    }

    /// Disconnect and forget every session.
    async fn clear_all(&self) -> StructuredContent<AckResponse> {
        self.hub.clear_all().await;
        StructuredContent(AckResponse::ok("All connections cleared"))
    }

    /// Open a logical channel (shell, sftp or forward) on a session.
    async fn open_channel(
        &self,
        /// Connection identifier
        connection_id: String,
        /// Channel type: "shell", "sftp" or "forward"
        channel_type: ChannelType,
    ) -> StructuredContent<OpenChannelResponse> {
        StructuredContent(match self.hub.open_channel(&connection_id, channel_type).await {
            Ok(channel_id) => OpenChannelResponse {
                success: true,
                channel_id: Some(channel_id),
                error: None,
            },
            Err(e) => OpenChannelResponse::failed(e),
        })
    }

    /// Close a channel. Unknown channel ids are ignored.
    async fn close_channel(
        &self,
        /// Connection identifier
        connection_id: String,
        /// Channel identifier from open_channel
        channel_id: String,
    ) -> StructuredContent<AckResponse> {
        let result = self.hub.close_channel(&connection_id, &channel_id);
        StructuredContent(ack(result, format!("Closed channel {}", channel_id)))
    }

    /// Run a command on a connected session and return its stdout.
    ///
    /// Fails only when the command exits non-zero and writes to stderr.
    async fn execute(
        &self,
        /// Connection identifier
        connection_id: String,
        /// Shell command to run on the remote host
        command: String,
    ) -> StructuredContent<ExecuteResponse> {
        StructuredContent(execute_response(
            self.hub.execute(&connection_id, &command).await,
        ))
    }

    /// Collect CPU, memory, disk, load and system details from the remote host.
    async fn get_remote_metrics(
        &self,
        /// Connection identifier of a connected session
        connection_id: String,
    ) -> StructuredContent<MetricsResponse> {
        StructuredContent(metrics_response(
            self.hub.remote_metrics(&connection_id).await,
        ))
    }

    /// Health verdict (cpu < 90%, memory < 90%, disk < 95%) with the metrics
    /// behind it. Uses the remote host when connected, the local host otherwise.
    async fn health_check(
        &self,
        /// Connection identifier
        connection_id: String,
    ) -> StructuredContent<HealthCheckResponse> {
        StructuredContent(health_response(
            self.hub.health_check(&connection_id).await,
        ))
    }

    /// Cache a password for a connection, encrypted in memory.
    async fn store_password(
        &self,
        /// Connection identifier
        connection_id: String,
        /// Password to cache
        password: String,
        /// Keep for 24 hours instead of only for this process (default: false)
        remember: Option<bool>,
    ) -> StructuredContent<AckResponse> {
        let result = self
            .hub
            .store_password(&connection_id, &password, remember.unwrap_or(false));
        StructuredContent(ack(result, "Password stored"))
    }

    /// Cached password for a connection, or null when absent or expired.
    async fn get_password(
        &self,
        /// Connection identifier
        connection_id: String,
    ) -> StructuredContent<PasswordResponse> {
        StructuredContent(PasswordResponse {
            success: true,
            password: self.hub.get_password(&connection_id),
            error: None,
        })
    }

    /// Whether an unexpired password is cached for a connection.
    async fn has_password(
        &self,
        /// Connection identifier
        connection_id: String,
    ) -> StructuredContent<HasPasswordResponse> {
        StructuredContent(HasPasswordResponse {
            success: true,
            has: Some(self.hub.has_password(&connection_id)),
            error: None,
        })
    }

    /// Forget the cached password for a connection.
    async fn clear_password(
        &self,
        /// Connection identifier
        connection_id: String,
    ) -> StructuredContent<AckResponse> {
        self.hub.clear_password(&connection_id);
        StructuredContent(AckResponse::ok("Password cleared"))
    }

    /// Forget every cached password.
    async fn clear_all_passwords(&self) -> StructuredContent<AckResponse> {
        self.hub.clear_all_passwords();
        StructuredContent(AckResponse::ok("All passwords cleared"))
    }

    /// Save or update connection metadata. Never stores the password.
    async fn save_connection(
        &self,
        /// Connection identifier
        connection_id: String,
        /// Display name
        name: String,
        /// Hostname or IP address
        host: String,
        /// SSH port (usually 22)
        port: u16,
        /// SSH username
        username: String,
        /// Path to a private key file on the hub host
        key_path: Option<String>,
    ) -> StructuredContent<AckResponse> {
        let result = self.hub.save_connection(StoredConnection {
            id: connection_id,
            name,
            host,
            port,
            username,
            key_path,
            last_connected: None,
        });
        StructuredContent(ack(result, "Connection saved"))
    }

    /// Saved connection metadata, sorted by name.
    async fn list_saved_connections(&self) -> StructuredContent<SavedConnectionsResponse> {
        StructuredContent(SavedConnectionsResponse {
            success: true,
            connections: self.hub.list_saved_connections(),
            error: None,
        })
    }

    /// Delete saved metadata and any cached password for a connection.
    async fn remove_saved_connection(
        &self,
        /// Connection identifier
        connection_id: String,
    ) -> StructuredContent<AckResponse> {
        StructuredContent(match self.hub.remove_saved_connection(&connection_id) {
            Ok(true) => AckResponse::ok(format!("Removed {}", connection_id)),
            Ok(false) => AckResponse::failed(HubError::NotFound(connection_id)),
            Err(e) => AckResponse::failed(e),
        })
    }
}
