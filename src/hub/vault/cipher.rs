//! Symmetric sealing of cached secrets.

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, Nonce, OsRng};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::hub::error::HubError;

/// Nonce length for AES-GCM.
const NONCE_LEN: usize = 12;

/// Turns plaintext secrets into printable ciphertext and back.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, HubError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, HubError>;
}

/// AES-256-GCM with a random per-message nonce.
///
/// Output is `base64(nonce || ciphertext || tag)`. The key lives only in
/// memory, so cached secrets do not survive a restart.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    pub fn from_key(key: &[u8]) -> Result<Self, HubError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| HubError::Encryption(format!("key must be 32 bytes, got {}", key.len())))?;
        Ok(Self { cipher })
    }
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, HubError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| HubError::Encryption(format!("AEAD encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, HubError> {
        let sealed = STANDARD
            .decode(ciphertext)
            .map_err(|e| HubError::DecryptionFailed(format!("invalid encoding: {}", e)))?;

        if sealed.len() < NONCE_LEN {
            return Err(HubError::DecryptionFailed("ciphertext too short".to_string()));
        }

        let (nonce, body) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::<Aes256Gcm>::from_slice(nonce), body)
            .map_err(|e| HubError::DecryptionFailed(format!("AEAD decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| HubError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decrypts_what_it_encrypts() {
        let cipher = AesGcmCipher::generate();
        let sealed = cipher.encrypt("correct horse battery staple").unwrap();
        assert_ne!(sealed, "correct horse battery staple");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "correct horse battery staple");
    }

    #[test]
    fn test_nonce_makes_ciphertext_unique() {
        let cipher = AesGcmCipher::generate();
        assert_ne!(cipher.encrypt("pw").unwrap(), cipher.encrypt("pw").unwrap());
    }

    #[test]
    fn test_other_key_cannot_decrypt() {
        let sealed = AesGcmCipher::generate().encrypt("pw").unwrap();
        let err = AesGcmCipher::generate().decrypt(&sealed).unwrap_err();
        assert!(matches!(err, HubError::DecryptionFailed(_)));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let cipher = AesGcmCipher::from_key(&[7u8; 32]).unwrap();
        let sealed = cipher.encrypt("pw").unwrap();
        let mut bytes = STANDARD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = STANDARD.encode(bytes);
        assert!(matches!(
            cipher.decrypt(&tampered).unwrap_err(),
            HubError::DecryptionFailed(_)
        ));
    }

    #[test]
    fn test_garbage_input_rejected() {
        let cipher = AesGcmCipher::generate();
        assert!(cipher.decrypt("not base64 !!").is_err());
        assert!(cipher.decrypt(&STANDARD.encode([1u8, 2, 3])).is_err());
    }

    #[test]
    fn test_from_key_rejects_wrong_length() {
        assert!(matches!(
            AesGcmCipher::from_key(&[0u8; 16]),
            Err(HubError::Encryption(_))
        ));
    }
}
