//! Serializable domain and response types.
//!
//! Everything crossing the tool boundary lives here. Keys are camelCase so the
//! payloads line up with the desktop front-end and any companion tooling that
//! already consumes `memoryUsed`, `loadAverage`, `connectionId` and friends.
//! All types implement `Serialize`, `Deserialize`, and `JsonSchema` for MCP
//! protocol compatibility.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a managed session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Kind of logical sub-stream multiplexed over a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Shell,
    /// File transfer
    Sftp,
    /// Port forward
    Forward,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Shell => write!(f, "shell"),
            ChannelType::Sftp => write!(f, "sftp"),
            ChannelType::Forward => write!(f, "forward"),
        }
    }
}

/// A channel record owned by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    /// Opaque caller payload
    #[serde(default)]
    pub data: serde_json::Value,
    /// Epoch milliseconds
    pub created_at: i64,
}

/// Serializable projection of a session. Never carries the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub connection_id: String,
    pub state: ConnectionState,
    pub host: String,
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub port: u16,
    pub username: String,
    /// Epoch milliseconds of the last successful connect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub channel_count: usize,
}

/// Compact per-session entry returned by `list_all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub connection_id: String,
    pub state: ConnectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SessionSnapshot> for SessionSummary {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            connection_id: snapshot.connection_id,
            state: snapshot.state,
            connected_at: snapshot.connected_at,
            error: snapshot.error,
        }
    }
}

/// Where a metrics snapshot was measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSource {
    Local,
    #[default]
    Remote,
}

/// Point-in-time resource reading for one connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// CPU utilization percent, 0-100
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub cpu: u32,
    /// Memory utilization percent, 0-100
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub memory: u32,
    /// GiB
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub memory_used: u64,
    /// GiB
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub memory_total: u64,
    /// Root filesystem utilization percent, 0-100
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub disk: u32,
    /// GiB
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub disk_used: u64,
    /// GiB
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub disk_total: u64,
    /// 1, 5 and 15 minute load averages
    pub load_average: [f64; 3],
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default)]
    pub source: MetricsSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::hub::schema::optional_uint")]
    pub cpu_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
}

impl MetricsSnapshot {
    /// `cpu < 90 && memory < 90 && disk < 95`
    pub fn is_healthy(&self) -> bool {
        self.cpu < 90 && self.memory < 90 && self.disk < 95
    }
}

/// Connection metadata kept by the external connection store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredConnection {
    pub id: String,
    pub name: String,
    pub host: String,
    #[schemars(schema_with = "crate::hub::schema::uint")]
    pub port: u16,
    pub username: String,
    /// Private key file offered after the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    /// RFC3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response carrying one session snapshot (`get_active`, `get_state`).
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionStateResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<SessionSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListConnectionsResponse {
    pub success: bool,
    #[serde(default)]
    pub connections: Vec<SessionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenChannelResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Plain acknowledgment for operations without a payload.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IsConnectedResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResponse {
    pub success: bool,
    /// `None` when nothing is cached or the entry expired
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HasPasswordResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_healthy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavedConnectionsResponse {
    pub success: bool,
    #[serde(default)]
    pub connections: Vec<StoredConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Adds a `failed` constructor producing the uniform
/// `{success: false, error}` shape.
macro_rules! failure_envelope {
    ($($ty:ident),* $(,)?) => {
        $(
            impl $ty {
                pub fn failed(error: impl fmt::Display) -> Self {
                    Self {
                        success: false,
                        error: Some(error.to_string()),
                        ..Default::default()
                    }
                }
            }
        )*
    };
}

failure_envelope!(
    CreateSessionResponse,
    SessionStateResponse,
    ListConnectionsResponse,
    OpenChannelResponse,
    AckResponse,
    IsConnectedResponse,
    PasswordResponse,
    HasPasswordResponse,
    MetricsResponse,
    HealthCheckResponse,
    ExecuteResponse,
    SavedConnectionsResponse,
);

#[cfg(test)]
mod tests {
    use super::*;

    mod connection_state {
        use super::*;

        #[test]
        fn test_serialize_snake_case() {
            assert_eq!(
                serde_json::to_string(&ConnectionState::Disconnecting).unwrap(),
                "\"disconnecting\""
            );
            assert_eq!(
                serde_json::from_str::<ConnectionState>("\"error\"").unwrap(),
                ConnectionState::Error
            );
        }

        #[test]
        fn test_default_is_idle() {
            assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        }

        #[test]
        fn test_display_matches_wire_name() {
            for state in [
                ConnectionState::Idle,
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnecting,
                ConnectionState::Error,
            ] {
                let wire = serde_json::to_string(&state).unwrap();
                assert_eq!(wire.trim_matches('"'), state.to_string());
            }
        }
    }

    mod channel_type {
        use super::*;

        #[test]
        fn test_wire_names() {
            assert_eq!(serde_json::to_string(&ChannelType::Sftp).unwrap(), "\"sftp\"");
            assert_eq!(
                serde_json::from_str::<ChannelType>("\"forward\"").unwrap(),
                ChannelType::Forward
            );
        }

        #[test]
        fn test_channel_type_field_named_type() {
            let channel = Channel {
                id: "ch-1".to_string(),
                channel_type: ChannelType::Shell,
                data: serde_json::Value::Null,
                created_at: 1,
            };
            let json = serde_json::to_value(&channel).unwrap();
            assert_eq!(json["type"], "shell");
            assert_eq!(json["createdAt"], 1);
        }
    }

    mod session_snapshot {
        use super::*;

        #[test]
        fn test_optional_fields_omitted() {
            let snapshot = SessionSnapshot {
                connection_id: "c1".to_string(),
                state: ConnectionState::Idle,
                host: "10.0.0.5".to_string(),
                port: 22,
                username: "root".to_string(),
                connected_at: None,
                error: None,
                channel_count: 0,
            };
            let json = serde_json::to_string(&snapshot).unwrap();
            assert!(json.contains("\"connectionId\":\"c1\""));
            assert!(json.contains("\"channelCount\":0"));
            assert!(!json.contains("connectedAt"));
            assert!(!json.contains("error"));
        }

        #[test]
        fn test_summary_from_snapshot() {
            let snapshot = SessionSnapshot {
                connection_id: "c2".to_string(),
                state: ConnectionState::Error,
                host: "h".to_string(),
                port: 2222,
                username: "u".to_string(),
                connected_at: Some(42),
                error: Some("boom".to_string()),
                channel_count: 3,
            };
            let summary = SessionSummary::from(snapshot);
            assert_eq!(summary.connection_id, "c2");
            assert_eq!(summary.state, ConnectionState::Error);
            assert_eq!(summary.connected_at, Some(42));
            assert_eq!(summary.error.as_deref(), Some("boom"));
        }
    }

    mod metrics_snapshot {
        use super::*;

        fn with_usage(cpu: u32, memory: u32, disk: u32) -> MetricsSnapshot {
            MetricsSnapshot {
                cpu,
                memory,
                disk,
                ..Default::default()
            }
        }

        #[test]
        fn test_healthy_just_below_thresholds() {
            assert!(with_usage(89, 89, 94).is_healthy());
        }

        #[test]
        fn test_unhealthy_at_cpu_threshold() {
            assert!(!with_usage(90, 0, 0).is_healthy());
        }

        #[test]
        fn test_unhealthy_at_memory_and_disk_thresholds() {
            assert!(!with_usage(0, 90, 0).is_healthy());
            assert!(!with_usage(0, 0, 95).is_healthy());
        }

        #[test]
        fn test_camel_case_keys() {
            let snapshot = MetricsSnapshot {
                load_average: [0.5, 0.25, 0.1],
                os_name: Some("Ubuntu 22.04.4 LTS".to_string()),
                cpu_cores: Some(4),
                ..Default::default()
            };
            let json = serde_json::to_value(&snapshot).unwrap();
            assert!(json.get("memoryUsed").is_some());
            assert!(json.get("diskTotal").is_some());
            assert_eq!(json["loadAverage"][0], 0.5);
            assert_eq!(json["osName"], "Ubuntu 22.04.4 LTS");
            assert_eq!(json["cpuCores"], 4);
            assert!(json.get("kernel").is_none());
        }
    }

    mod envelopes {
        use super::*;

        #[test]
        fn test_failed_shape() {
            let response = OpenChannelResponse::failed("Connection c9 not found");
            let json = serde_json::to_value(&response).unwrap();
            assert_eq!(json["success"], false);
            assert_eq!(json["error"], "Connection c9 not found");
            assert!(json.get("channelId").is_none());
        }

        #[test]
        fn test_ack_ok() {
            let response = AckResponse::ok("Disconnected");
            assert!(response.success);
            assert_eq!(response.message.as_deref(), Some("Disconnected"));
            assert!(response.error.is_none());
        }

        #[test]
        fn test_password_field_always_present() {
            let response = PasswordResponse {
                success: true,
                password: None,
                error: None,
            };
            let json = serde_json::to_string(&response).unwrap();
            assert!(json.contains("\"password\":null"));
        }

        #[test]
        fn test_health_check_keys() {
            let response = HealthCheckResponse {
                success: true,
                is_healthy: Some(true),
                metrics: None,
                error: None,
            };
            let json = serde_json::to_value(&response).unwrap();
            assert_eq!(json["isHealthy"], true);
        }
    }
}
