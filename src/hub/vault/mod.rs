//! Encrypted, expiring password cache.
//!
//! Secrets are sealed by a [`SecretCipher`] before they are stored and only
//! decrypted on lookup; the map itself never holds plaintext. Entries stored
//! with `persist = true` expire after the configured TTL (24 hours by
//! default); expired entries are evicted lazily on access and in bulk by
//! [`CredentialVault::sweep_expired`].

mod cipher;
mod store;

pub use cipher::{AesGcmCipher, SecretCipher};
pub use store::{CredentialEntry, CredentialVault};
