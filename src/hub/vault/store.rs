//! DashMap-based credential cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use super::cipher::SecretCipher;
use crate::hub::error::HubError;

/// One sealed secret.
#[derive(Debug, Clone)]
pub struct CredentialEntry {
    pub ciphertext: String,
    /// `None` for session-only entries that never expire
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CredentialEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

pub struct CredentialVault {
    entries: DashMap<String, CredentialEntry>,
    cipher: Arc<dyn SecretCipher>,
    ttl: TimeDelta,
}

impl CredentialVault {
    pub fn new(cipher: Arc<dyn SecretCipher>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            cipher,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Seals and stores a secret, replacing any previous entry.
    ///
    /// `persist = true` gives the entry an expiry of now + TTL; otherwise it
    /// lives until cleared or the process exits.
    pub fn store(&self, connection_id: &str, secret: &str, persist: bool) -> Result<(), HubError> {
        let ciphertext = self.cipher.encrypt(secret).inspect_err(|e| {
            error!("Failed to seal credential for {}: {}", connection_id, e);
        })?;

        let now = Utc::now();
        let expires_at = if persist {
            now.checked_add_signed(self.ttl)
        } else {
            None
        };

        self.entries.insert(
            connection_id.to_string(),
            CredentialEntry {
                ciphertext,
                expires_at,
                created_at: now,
            },
        );
        debug!(
            "Stored credential for {} (expires: {})",
            connection_id,
            expires_at.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
        );
        Ok(())
    }

    /// Decrypted secret, or `None` when absent, expired or undecryptable.
    /// An expired entry is evicted.
    pub fn lookup(&self, connection_id: &str) -> Option<String> {
        let ciphertext = self.live_ciphertext(connection_id)?;

        match self.cipher.decrypt(&ciphertext) {
            Ok(secret) => Some(secret),
            Err(e) => {
                warn!("Discarding unreadable credential for {}: {}", connection_id, e);
                None
            }
        }
    }

    /// Same expiry rules as [`lookup`](Self::lookup) without decrypting.
    pub fn has(&self, connection_id: &str) -> bool {
        self.live_ciphertext(connection_id).is_some()
    }

    pub fn entry(&self, connection_id: &str) -> Option<CredentialEntry> {
        self.entries.get(connection_id).map(|e| e.value().clone())
    }

    fn live_ciphertext(&self, connection_id: &str) -> Option<String> {
        let now = Utc::now();
        let live = {
            let entry = self.entries.get(connection_id)?;
            (!entry.is_expired(now)).then(|| entry.ciphertext.clone())
        };

        if live.is_none() {
            // Another writer may have refreshed the entry in between
            self.entries.remove_if(connection_id, |_, e| e.is_expired(now));
            debug!("Evicted expired credential for {}", connection_id);
        }
        live
    }

    pub fn clear(&self, connection_id: &str) {
        if self.entries.remove(connection_id).is_some() {
            debug!("Cleared credential for {}", connection_id);
        }
    }

    pub fn clear_all(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!("Cleared {} cached credential(s)", count);
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            info!("Swept {} expired credential(s)", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
