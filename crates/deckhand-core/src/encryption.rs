//! Encryption service for stored database credentials.
//!
//! Dump drivers never receive plaintext passwords from the record store;
//! encrypted values carry the `enc:` envelope prefix and are decrypted
//! just-in-time before being handed to a dump tool via its environment.

use crate::AppError;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use std::env;

/// Marker prefix for encrypted values at rest.
const ENVELOPE_PREFIX: &str = "enc:";

/// AES-256-GCM authenticated encryption for database credentials.
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// Create a new encryption service from a raw 32-byte key (e.g. for
    /// tests; avoids env mutation).
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, AppError> {
        if key_bytes.len() != 32 {
            return Err(AppError::Internal(
                "Encryption key must be 32 bytes (256 bits)".to_string(),
            ));
        }
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Create a new encryption service from the environment.
    /// Expects ENCRYPTION_KEY to be a base64-encoded 32-byte key.
    pub fn new() -> Result<Self, AppError> {
        let key_str = env::var("ENCRYPTION_KEY").map_err(|_| {
            AppError::Internal("ENCRYPTION_KEY environment variable not set".to_string())
        })?;

        let key_bytes = general_purpose::STANDARD
            .decode(&key_str)
            .map_err(|e| AppError::Internal(format!("Failed to decode encryption key: {}", e)))?;

        Self::from_key_bytes(&key_bytes)
    }

    /// Whether a stored value carries the encryption envelope.
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENVELOPE_PREFIX)
    }

    /// Encrypt a plaintext string into an `enc:`-prefixed envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Internal(format!("Encryption failed: {}", e)))?;

        // nonce || ciphertext, base64 encoded under the envelope prefix
        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(format!(
            "{}{}",
            ENVELOPE_PREFIX,
            general_purpose::STANDARD.encode(&combined)
        ))
    }

    /// Decrypt an `enc:`-prefixed envelope back to plaintext.
    pub fn decrypt(&self, encrypted: &str) -> Result<String, AppError> {
        let encoded = encrypted.strip_prefix(ENVELOPE_PREFIX).ok_or_else(|| {
            AppError::Internal("Value is not an encryption envelope".to_string())
        })?;

        let combined = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AppError::Internal(format!("Failed to decode encrypted data: {}", e)))?;

        if combined.len() < 12 {
            return Err(AppError::Internal("Encrypted data too short".to_string()));
        }

        // First 12 bytes are the nonce, remainder is ciphertext
        let nonce = Nonce::from_slice(&combined[..12]);
        let ciphertext = &combined[12..];

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| AppError::Internal(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| AppError::Internal(format!("Invalid UTF-8 in decrypted data: {}", e)))
    }

    /// Resolve a stored credential: decrypt when enveloped, pass through
    /// legacy plaintext values unchanged.
    pub fn resolve(&self, stored: &str) -> Result<String, AppError> {
        if Self::is_encrypted(stored) {
            self.decrypt(stored)
        } else {
            Ok(stored.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> EncryptionService {
        let test_key = b"01234567890123456789012345678901";
        EncryptionService::from_key_bytes(test_key).unwrap()
    }

    #[test]
    fn test_encryption_decryption() {
        let service = test_service();
        let plaintext = "database_password_12345";

        let encrypted = service.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);
        assert!(EncryptionService::is_encrypted(&encrypted));

        let decrypted = service.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_is_encrypted_plain_value() {
        assert!(!EncryptionService::is_encrypted("plain-password"));
        assert!(!EncryptionService::is_encrypted(""));
    }

    #[test]
    fn test_resolve_passes_through_plaintext() {
        let service = test_service();
        assert_eq!(service.resolve("legacy-pass").unwrap(), "legacy-pass");

        let encrypted = service.encrypt("secret").unwrap();
        assert_eq!(service.resolve(&encrypted).unwrap(), "secret");
    }

    #[test]
    fn test_decrypt_rejects_garbage() {
        let service = test_service();
        assert!(service.decrypt("enc:!!!not-base64!!!").is_err());
        assert!(service.decrypt("enc:YWJj").is_err()); // too short
        assert!(service.decrypt("no-envelope").is_err());
    }

    #[test]
    fn test_wrong_key_fails_decryption() {
        let service = test_service();
        let other =
            EncryptionService::from_key_bytes(b"abcdefghijklmnopqrstuvwxyz012345").unwrap();

        let encrypted = service.encrypt("secret").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }
}
