//! Configuration resolution for the session hub.
//!
//! Values follow a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided function parameter (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_HUB_CONNECT_TIMEOUT` | 30s | Connect handshake bound in seconds |
//! | `SSH_HUB_DISCONNECT_GRACE` | 5s | Wait for close acknowledgment before teardown |
//! | `SSH_HUB_COMMAND_TIMEOUT` | 60s | Remote command execution bound in seconds |
//! | `SSH_HUB_METRICS_CACHE_TTL` | 5s | Staleness window for cached metrics |
//! | `SSH_HUB_CREDENTIAL_TTL` | 86400s | Lifetime of credentials kept beyond the session |
//! | `SSH_HUB_POLL_INTERVAL_MS` | 3000ms | Background metrics polling cadence |
//! | `SSH_HUB_MAX_RETRIES` | 0 | Retries for transient connect failures |
//! | `SSH_HUB_RETRY_DELAY_MS` | 1000ms | Initial retry delay in milliseconds |
//! | `SSH_HUB_COMPRESSION` | true | Enable zlib compression |
//!
//! Timeouts, the disconnect grace and the poll interval must be non-zero; a
//! zero at any tier falls through to the next one.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_DISCONNECT_GRACE_SECS: u64 = 5;
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
pub(crate) const DEFAULT_METRICS_CACHE_TTL_SECS: u64 = 5;

/// 24 hours
pub(crate) const DEFAULT_CREDENTIAL_TTL_SECS: u64 = 24 * 60 * 60;

pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Zero keeps a single attempt per connect so the timeout bound is exact.
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 0;

pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Maximum retry delay cap (10 seconds)
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_HUB_CONNECT_TIMEOUT";
pub(crate) const DISCONNECT_GRACE_ENV_VAR: &str = "SSH_HUB_DISCONNECT_GRACE";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "SSH_HUB_COMMAND_TIMEOUT";
pub(crate) const METRICS_CACHE_TTL_ENV_VAR: &str = "SSH_HUB_METRICS_CACHE_TTL";
pub(crate) const CREDENTIAL_TTL_ENV_VAR: &str = "SSH_HUB_CREDENTIAL_TTL";
pub(crate) const POLL_INTERVAL_MS_ENV_VAR: &str = "SSH_HUB_POLL_INTERVAL_MS";
pub(crate) const MAX_RETRIES_ENV_VAR: &str = "SSH_HUB_MAX_RETRIES";
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "SSH_HUB_RETRY_DELAY_MS";
pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_HUB_COMPRESSION";

/// Resolve a numeric setting: parameter -> env var -> default.
///
/// Unparsable environment values are ignored.
fn resolve<T: FromStr>(param: Option<T>, env_var: &str, default: T) -> T {
    if let Some(value) = param {
        return value;
    }

    if let Ok(raw) = env::var(env_var)
        && let Ok(value) = raw.trim().parse::<T>()
    {
        return value;
    }

    default
}

/// Like [`resolve`], but zero counts as unset.
fn resolve_nonzero(param: Option<u64>, env_var: &str, default: u64) -> u64 {
    let value = resolve(param.filter(|v| *v > 0), env_var, default);
    if value == 0 {
        warn!("{} must be greater than zero, using {}", env_var, default);
        return default;
    }
    value
}

pub(crate) fn resolve_connect_timeout(timeout_param: Option<u64>) -> Duration {
    Duration::from_secs(resolve_nonzero(
        timeout_param,
        CONNECT_TIMEOUT_ENV_VAR,
        DEFAULT_CONNECT_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_disconnect_grace(grace_param: Option<u64>) -> Duration {
    Duration::from_secs(resolve_nonzero(
        grace_param,
        DISCONNECT_GRACE_ENV_VAR,
        DEFAULT_DISCONNECT_GRACE_SECS,
    ))
}

pub(crate) fn resolve_command_timeout(timeout_param: Option<u64>) -> Duration {
    Duration::from_secs(resolve_nonzero(
        timeout_param,
        COMMAND_TIMEOUT_ENV_VAR,
        DEFAULT_COMMAND_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_metrics_cache_ttl(ttl_param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        ttl_param,
        METRICS_CACHE_TTL_ENV_VAR,
        DEFAULT_METRICS_CACHE_TTL_SECS,
    ))
}

pub(crate) fn resolve_credential_ttl(ttl_param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        ttl_param,
        CREDENTIAL_TTL_ENV_VAR,
        DEFAULT_CREDENTIAL_TTL_SECS,
    ))
}

pub(crate) fn resolve_poll_interval(interval_param: Option<u64>) -> Duration {
    Duration::from_millis(resolve_nonzero(
        interval_param,
        POLL_INTERVAL_MS_ENV_VAR,
        DEFAULT_POLL_INTERVAL_MS,
    ))
}

pub(crate) fn resolve_max_retries(max_retries_param: Option<u32>) -> u32 {
    resolve(max_retries_param, MAX_RETRIES_ENV_VAR, DEFAULT_MAX_RETRIES)
}

pub(crate) fn resolve_retry_delay(retry_delay_param: Option<u64>) -> Duration {
    Duration::from_millis(resolve(
        retry_delay_param,
        RETRY_DELAY_MS_ENV_VAR,
        DEFAULT_RETRY_DELAY_MS,
    ))
}

/// Resolve the compression setting with priority: parameter -> env var -> default (true)
pub(crate) fn resolve_compression(compress_param: Option<bool>) -> bool {
    if let Some(compress) = compress_param {
        return compress;
    }

    if let Ok(env_compress) = env::var(COMPRESSION_ENV_VAR) {
        return env_compress.eq_ignore_ascii_case("true") || env_compress == "1";
    }

    true
}

/// Resolved runtime settings shared by every hub component.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    pub connect_timeout: Duration,
    pub disconnect_grace: Duration,
    pub command_timeout: Duration,
    pub metrics_cache_ttl: Duration,
    pub credential_ttl: Duration,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub compress: bool,
}

impl HubConfig {
    /// Build the configuration from environment variables and defaults.
    pub fn from_env() -> Self {
        Self {
            connect_timeout: resolve_connect_timeout(None),
            disconnect_grace: resolve_disconnect_grace(None),
            command_timeout: resolve_command_timeout(None),
            metrics_cache_ttl: resolve_metrics_cache_ttl(None),
            credential_ttl: resolve_credential_ttl(None),
            poll_interval: resolve_poll_interval(None),
            max_retries: resolve_max_retries(None),
            retry_delay: resolve_retry_delay(None),
            compress: resolve_compression(None),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            disconnect_grace: Duration::from_secs(DEFAULT_DISCONNECT_GRACE_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            metrics_cache_ttl: Duration::from_secs(DEFAULT_METRICS_CACHE_TTL_SECS),
            credential_ttl: Duration::from_secs(DEFAULT_CREDENTIAL_TTL_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            compress: true,
        }
    }
}
