//! Error taxonomy for the session hub and connect-retry classification.
//!
//! [`HubError`] is the single error type flowing through the registry, the
//! session state machine, the transport, the vault and the metrics collector.
//! Its `Display` output is what ends up in the `error` field of every tool
//! response and on the session record (`state = error`).
//!
//! # Retry classification
//!
//! [`is_retryable_error`] decides whether a failed connect attempt is worth
//! another try under the backoff policy:
//!
//! 1. **Authentication failures (NOT retryable)**: wrong password, rejected
//!    key, denied access. Retrying only risks locking the account.
//! 2. **Connection errors (retryable)**: refused, reset, unreachable and
//!    similar transient network conditions.
//! 3. **Unknown errors**: retried unless they look like an SSH protocol
//!    error without a timeout/connect hint.
//!
//! Authentication keywords take precedence over connection keywords.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the hub core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// Connect did not complete within the configured bound.
    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    /// Remote rejected the supplied credentials.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Operation attempted on a transport that never reached `connected`.
    #[error("SSH client not connected")]
    NotConnected,

    /// Remote command exited non-zero and wrote to stderr.
    #[error("Command failed with code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// Unknown connection or channel id.
    #[error("Connection {0} not found")]
    NotFound(String),

    #[error("Connection {0} already exists")]
    DuplicateConnection(String),

    /// Stored ciphertext could not be decrypted. Treated as a cache miss.
    #[error("Failed to decrypt credential: {0}")]
    DecryptionFailed(String),

    #[error("Failed to encrypt credential: {0}")]
    Encryption(String),

    /// No transport is attached to the session.
    #[error("No active session")]
    NoActiveSession,

    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: String },

    /// Connection store rejected a write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Any other transport-level failure (I/O, protocol, channel).
    #[error("{0}")]
    Transport(String),
}

impl HubError {
    pub(crate) fn command_failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        HubError::CommandFailed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Whether this error came from the remote command itself rather than
    /// from the transport carrying it.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, HubError::CommandFailed { .. })
    }
}

/// Authentication error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
];

/// Determines if a connect failure is transient and may succeed on retry.
///
/// Authentication patterns are checked first, so
/// `"Connection timeout during authentication failed"` is NOT retryable.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if AUTH_ERRORS.iter().any(|p| error_lower.contains(p)) {
        return false;
    }

    if RETRYABLE_ERRORS.iter().any(|p| error_lower.contains(p)) {
        return true;
    }

    !error_lower.contains("ssh")
        || error_lower.contains("timeout")
        || error_lower.contains("connect")
}

/// Same classification lifted to [`HubError`]; only raw transport failures
/// and timeouts are candidates for a retry.
pub(crate) fn is_retryable(error: &HubError) -> bool {
    match error {
        HubError::Timeout(_) => true,
        HubError::Transport(msg) => is_retryable_error(msg),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod display {
        use super::*;

        #[test]
        fn test_timeout_message() {
            assert_eq!(
                HubError::Timeout(Duration::from_secs(30)).to_string(),
                "Connection timeout after 30s"
            );
        }

        #[test]
        fn test_command_failed_message() {
            let err = HubError::command_failed(1, "permission denied");
            assert_eq!(err.to_string(), "Command failed with code 1: permission denied");
            assert!(err.is_command_failure());
        }

        #[test]
        fn test_not_found_message() {
            assert_eq!(
                HubError::NotFound("c1".to_string()).to_string(),
                "Connection c1 not found"
            );
        }

        #[test]
        fn test_invalid_transition_message() {
            let err = HubError::InvalidTransition {
                action: "connect",
                state: "connected".to_string(),
            };
            assert_eq!(err.to_string(), "Cannot connect while connected");
        }
    }

    mod auth_errors_not_retryable {
        use super::*;

        #[test]
        fn test_authentication_failed() {
            assert!(!is_retryable_error("Authentication failed"));
            assert!(!is_retryable_error("password authentication failed: wrong password"));
        }

        #[test]
        fn test_permission_denied() {
            assert!(!is_retryable_error("permission denied (publickey)"));
            assert!(!is_retryable_error("PERMISSION DENIED"));
        }

        #[test]
        fn test_auth_error_takes_precedence_over_connection() {
            assert!(!is_retryable_error(
                "Connection timeout during authentication failed"
            ));
        }

        #[test]
        fn test_auth_failed_variant_never_retried() {
            assert!(!is_retryable(&HubError::AuthFailed("rejected".to_string())));
        }
    }

    mod connection_errors_retryable {
        use super::*;

        #[test]
        fn test_connection_refused() {
            assert!(is_retryable_error("Connection refused"));
            assert!(is_retryable_error("connection reset by peer"));
        }

        #[test]
        fn test_network_conditions() {
            assert!(is_retryable_error("Network is unreachable"));
            assert!(is_retryable_error("No route to host"));
            assert!(is_retryable_error("Temporary failure in name resolution"));
        }

        #[test]
        fn test_timeout_variant_retryable() {
            assert!(is_retryable(&HubError::Timeout(Duration::from_secs(30))));
        }

        #[test]
        fn test_transport_variant_uses_message() {
            assert!(is_retryable(&HubError::Transport(
                "Failed to connect: Connection refused".to_string()
            )));
            assert!(!is_retryable(&HubError::Transport(
                "SSH protocol error".to_string()
            )));
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn test_unknown_error_without_ssh() {
            assert!(is_retryable_error("Something went wrong"));
            assert!(is_retryable_error(""));
        }

        #[test]
        fn test_ssh_protocol_error_not_retryable() {
            assert!(!is_retryable_error("SSH version mismatch"));
            assert!(is_retryable_error("SSH failed to connect"));
        }

        #[test]
        fn test_non_transport_variants_not_retryable() {
            assert!(!is_retryable(&HubError::NotConnected));
            assert!(!is_retryable(&HubError::command_failed(2, "boom")));
        }
    }
}
