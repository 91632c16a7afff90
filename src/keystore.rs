//! # Local Key Store
//!
//! Encrypted-at-rest storage for Node-class keys, and the
//! `encrypt_local_data`/`decrypt_local_data` interface handed to
//! external storage collaborators.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        LOCAL KEY STORE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  What is stored:                                                       │
//! │    Node-class private keys only. Profile and Network keys are          │
//! │    re-derived from the root on demand and never persisted.             │
//! │                                                                         │
//! │  How:                                                                  │
//! │    value = nonce ‖ AES-256-GCM(storage_key, plaintext, aad=name)       │
//! │    storage_key = HKDF(node signing ‖ encryption key material)          │
//! │                                                                         │
//! │  Backend:                                                              │
//! │    In-memory map behind the LocalCipher trait seam. Platform           │
//! │    keychains plug in behind the same interface.                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::crypto::{
    decrypt, derive_storage_key, encrypt, DerivationPath, EncryptionKey, EncryptionKeyPair,
    KeyPair, Nonce, SigningKeyPair, NONCE_SIZE,
};
use crate::error::{Error, Result};

/// AAD for opaque blobs passed through the [`LocalCipher`] interface
const LOCAL_DATA_AAD: &[u8] = b"weft-local-data-v1";

/// Key-name prefix for persisted node keys
const NODE_KEY_PREFIX: &str = "weft.node.";

/// Encryption interface handed to external storage collaborators.
///
/// Collaborators persist whatever bytes they like; everything crossing
/// this boundary is encrypted under the locally held storage key.
pub trait LocalCipher {
    /// Encrypt an opaque blob for local persistence.
    fn encrypt_local_data(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a blob previously produced by `encrypt_local_data`.
    fn decrypt_local_data(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Encrypted-at-rest store for node key material.
pub struct KeyStore {
    memory: RwLock<HashMap<String, Vec<u8>>>,
    storage_key: EncryptionKey,
}

impl KeyStore {
    /// Create a store encrypting under the given storage key.
    pub fn new(storage_key: [u8; 32]) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            storage_key: EncryptionKey::from_bytes(storage_key),
        }
    }

    /// Create a store whose key is derived from a node identity.
    pub fn for_node(node_key: &KeyPair) -> Result<Self> {
        let storage_key = derive_storage_key(
            &node_key.signing.secret_bytes(),
            &node_key.encryption.secret_bytes(),
        )?;
        Ok(Self::new(storage_key))
    }

    /// Store a value encrypted under the storage key.
    ///
    /// The entry name is bound through the AAD, so values cannot be
    /// swapped between names without failing authentication.
    pub fn store(&self, name: &str, value: &[u8]) -> Result<()> {
        let (nonce, ciphertext) = encrypt(&self.storage_key, value, name.as_bytes())?;

        let mut data = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        data.extend_from_slice(nonce.as_bytes());
        data.extend_from_slice(&ciphertext);

        self.memory.write().insert(name.to_string(), data);
        Ok(())
    }

    /// Retrieve and decrypt a value.
    pub fn retrieve(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let data = match self.memory.read().get(name).cloned() {
            Some(d) => d,
            None => return Ok(None),
        };

        if data.len() < NONCE_SIZE {
            return Err(Error::StorageRead(format!("Stored value '{}' too short", name)));
        }

        let nonce = Nonce::from_bytes(data[..NONCE_SIZE].try_into().expect("length checked"));
        let plaintext = decrypt(&self.storage_key, &nonce, &data[NONCE_SIZE..], name.as_bytes())?;

        Ok(Some(Zeroizing::new(plaintext)))
    }

    /// Delete a value. Returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        self.memory.write().remove(name).is_some()
    }

    /// Check whether a value exists.
    pub fn exists(&self, name: &str) -> bool {
        self.memory.read().contains_key(name)
    }

    // ========================================================================
    // NODE KEY PERSISTENCE
    // ========================================================================

    /// Persist a node keypair at rest, keyed by its derivation path.
    pub fn store_node_key(&self, path: &DerivationPath, keypair: &KeyPair) -> Result<()> {
        let mut material = Zeroizing::new(Vec::with_capacity(64));
        material.extend_from_slice(&keypair.signing.secret_bytes());
        material.extend_from_slice(&keypair.encryption.secret_bytes());

        self.store(&node_key_name(path), &material)
    }

    /// Load a node keypair persisted under `path`.
    pub fn load_node_key(&self, path: &DerivationPath) -> Result<Option<KeyPair>> {
        let material = match self.retrieve(&node_key_name(path))? {
            Some(m) => m,
            None => return Ok(None),
        };

        if material.len() != 64 {
            return Err(Error::StorageRead("Invalid node key material length".into()));
        }

        let signing: [u8; 32] = material[..32].try_into().expect("length checked");
        let encryption: [u8; 32] = material[32..].try_into().expect("length checked");

        Ok(Some(KeyPair {
            signing: SigningKeyPair::from_bytes(&signing),
            encryption: EncryptionKeyPair::from_bytes(&encryption),
        }))
    }

    /// Remove a persisted node keypair.
    pub fn delete_node_key(&self, path: &DerivationPath) -> bool {
        self.delete(&node_key_name(path))
    }
}

impl LocalCipher for KeyStore {
    fn encrypt_local_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let (nonce, ciphertext) = encrypt(&self.storage_key, data, LOCAL_DATA_AAD)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt_local_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_SIZE {
            return Err(Error::StorageRead("Local data blob too short".into()));
        }

        let nonce = Nonce::from_bytes(data[..NONCE_SIZE].try_into().expect("length checked"));
        decrypt(&self.storage_key, &nonce, &data[NONCE_SIZE..], LOCAL_DATA_AAD)
    }
}

fn node_key_name(path: &DerivationPath) -> String {
    format!("{}{}", NODE_KEY_PREFIX, path)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyClass;

    #[test]
    fn test_store_retrieve_delete() {
        let store = KeyStore::new([42u8; 32]);

        store.store("entry", b"value").unwrap();
        assert!(store.exists("entry"));
        assert_eq!(&**store.retrieve("entry").unwrap().unwrap(), b"value");

        assert!(store.delete("entry"));
        assert!(store.retrieve("entry").unwrap().is_none());
        assert!(!store.delete("entry"));
    }

    #[test]
    fn test_values_encrypted_at_rest() {
        let store = KeyStore::new([42u8; 32]);
        store.store("entry", b"plaintext value").unwrap();

        let raw = store.memory.read().get("entry").cloned().unwrap();
        assert!(!raw
            .windows(b"plaintext value".len())
            .any(|w| w == b"plaintext value"));
    }

    #[test]
    fn test_wrong_storage_key_fails() {
        let store = KeyStore::new([1u8; 32]);
        store.store("entry", b"secret").unwrap();
        let raw = store.memory.read().get("entry").cloned().unwrap();

        let other = KeyStore::new([2u8; 32]);
        other.memory.write().insert("entry".into(), raw);

        assert!(other.retrieve("entry").is_err());
    }

    #[test]
    fn test_node_key_round_trip() {
        let node_key = KeyPair::from_seed(&[9u8; 32]).unwrap();
        let store = KeyStore::for_node(&node_key).unwrap();
        let path = DerivationPath::new(KeyClass::Node, 0).unwrap();

        store.store_node_key(&path, &node_key).unwrap();
        let loaded = store.load_node_key(&path).unwrap().unwrap();

        assert_eq!(
            loaded.signing.public_bytes(),
            node_key.signing.public_bytes()
        );
        assert_eq!(
            loaded.encryption.public_bytes(),
            node_key.encryption.public_bytes()
        );

        assert!(store.delete_node_key(&path));
        assert!(store.load_node_key(&path).unwrap().is_none());
    }

    #[test]
    fn test_local_cipher_round_trip() {
        let store = KeyStore::new([7u8; 32]);

        let blob = store.encrypt_local_data(b"collaborator payload").unwrap();
        assert_ne!(blob, b"collaborator payload");

        let plaintext = store.decrypt_local_data(&blob).unwrap();
        assert_eq!(plaintext, b"collaborator payload");
    }

    #[test]
    fn test_local_cipher_rejects_truncated_blob() {
        let store = KeyStore::new([7u8; 32]);
        assert!(store.decrypt_local_data(&[0u8; 4]).is_err());
    }
}
