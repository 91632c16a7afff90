//! # Authenticated Encryption
//!
//! AES-256-GCM primitives shared by the envelope engine, the epoch
//! traffic layer, and the local key store.
//!
//! Nonces are random per encryption and never reused with the same key;
//! random 96-bit nonces are safe for up to 2^32 messages per key. All
//! callers bind context through the associated data so ciphertext moved
//! between contexts fails authentication instead of decrypting.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// A nonce (number used once) for AES-GCM encryption
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM encryption key, zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Encrypt a message using AES-256-GCM.
///
/// Returns `(nonce, ciphertext_with_tag)`. The associated data is
/// authenticated but not encrypted and must match at decryption.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random();
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload { msg: plaintext, aad };

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))?;

    Ok((nonce, ciphertext))
}

/// Decrypt a message using AES-256-GCM.
///
/// ## Errors
///
/// Returns `DecryptionFailed` if the ciphertext was tampered with, the
/// AAD doesn't match, or the key or nonce is wrong.
pub fn decrypt(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload { msg: ciphertext, aad };

    cipher
        .decrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|_| Error::DecryptionFailed("authentication tag mismatch".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = EncryptionKey::from_bytes([42u8; 32]);
        let plaintext = b"presence payload";
        let aad = b"context";

        let (nonce, ciphertext) = encrypt(&key, plaintext, aad).unwrap();
        let decrypted = decrypt(&key, &nonce, &ciphertext, aad).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = EncryptionKey::from_bytes([42u8; 32]);

        let (nonce, ciphertext) = encrypt(&key, b"", b"").unwrap();
        assert_eq!(ciphertext.len(), TAG_SIZE);
        assert_eq!(decrypt(&key, &nonce, &ciphertext, b"").unwrap(), b"");
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = EncryptionKey::from_bytes([42u8; 32]);

        let (nonce, mut ciphertext) = encrypt(&key, b"payload", b"aad").unwrap();
        ciphertext[0] ^= 0xFF;

        assert!(decrypt(&key, &nonce, &ciphertext, b"aad").is_err());
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = EncryptionKey::from_bytes([42u8; 32]);

        let (nonce, ciphertext) = encrypt(&key, b"payload", b"network-a").unwrap();
        let result = decrypt(&key, &nonce, &ciphertext, b"network-b");

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = EncryptionKey::from_bytes([1u8; 32]);
        let key2 = EncryptionKey::from_bytes([2u8; 32]);

        let (nonce, ciphertext) = encrypt(&key1, b"payload", b"aad").unwrap();
        assert!(decrypt(&key2, &nonce, &ciphertext, b"aad").is_err());
    }

    #[test]
    fn test_random_nonces_differ() {
        let key = EncryptionKey::from_bytes([42u8; 32]);

        let (n1, c1) = encrypt(&key, b"same", b"").unwrap();
        let (n2, c2) = encrypt(&key, b"same", b"").unwrap();

        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }
}
