//! # Identity Module
//!
//! Root-key ownership, hierarchical key access, and public identifiers.
//!
//! ## Identity Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         IDENTITY SYSTEM                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  RootKey (32-byte seed, 24-word backup phrase)                         │
//! │        │                                                                │
//! │        │  derive on demand, cached for the session                     │
//! │        ▼                                                                │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐               │
//! │  │ Profile keys │   │ Network keys │   │  Node keys   │               │
//! │  │ m/44'/0'/0'  │   │ m/44'/0'/1'  │   │ m/44'/0'/2'  │               │
//! │  │              │   │              │   │              │               │
//! │  │ • envelope   │   │ • NetworkId  │   │ • PeerId     │               │
//! │  │   recipients │   │ • tokens     │   │ • discovery  │               │
//! │  │ • ProfileId  │   │ • epochs     │   │ • at-rest    │               │
//! │  └──────────────┘   └──────────────┘   └──────────────┘               │
//! │                                                                         │
//! │  DerivedKeys are owned by the path that produced them: the cache       │
//! │  is keyed by path and lives for the session only. Node keys are        │
//! │  the single class persisted at rest (see `keystore`).                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod ids;
mod root;

pub use ids::{NetworkId, PeerId, ProfileId, ID_SIZE};
pub use root::{RootKey, WORD_COUNT};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::crypto::{DerivationPath, KeyClass, KeyPair};
use crate::error::Result;

/// A root-key holder with session-lifetime access to its hierarchy.
///
/// Derivation is pure, so the cache is purely an optimization: dropping
/// it and re-deriving yields identical keys. Keys are handed out as
/// `Arc<KeyPair>` so callers never copy secret material.
pub struct Identity {
    root: RootKey,
    cache: RwLock<HashMap<DerivationPath, Arc<KeyPair>>>,
}

impl Identity {
    /// Create a fresh identity with a new random root key.
    pub fn create() -> Result<Self> {
        Ok(Self::from_root(RootKey::generate()?))
    }

    /// Restore an identity from a backup phrase.
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        Ok(Self::from_root(RootKey::from_phrase(phrase)?))
    }

    /// Wrap an existing root key.
    pub fn from_root(root: RootKey) -> Self {
        Self {
            root,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The root key's backup phrase. Show once; never log.
    pub fn backup_phrase(&self) -> String {
        self.root.backup_phrase()
    }

    /// Derive (or fetch from the session cache) the keypair at `path`.
    pub fn derive(&self, path: DerivationPath) -> Result<Arc<KeyPair>> {
        if let Some(cached) = self.cache.read().get(&path) {
            return Ok(Arc::clone(cached));
        }

        let derived = Arc::new(self.root.derive(&path)?);
        self.cache
            .write()
            .entry(path)
            .or_insert_with(|| Arc::clone(&derived));
        Ok(derived)
    }

    /// Derive the keypair for `(class, index)`.
    pub fn derive_class(&self, class: KeyClass, index: u32) -> Result<Arc<KeyPair>> {
        self.derive(DerivationPath::new(class, index)?)
    }

    /// The NetworkId of the network key at `index`.
    pub fn network_id(&self, index: u32) -> Result<NetworkId> {
        let keypair = self.derive_class(KeyClass::Network, index)?;
        Ok(NetworkId::from_public_key(&keypair.signing.public_bytes()))
    }

    /// The ProfileId of the profile key at `index`.
    pub fn profile_id(&self, index: u32) -> Result<ProfileId> {
        let keypair = self.derive_class(KeyClass::Profile, index)?;
        Ok(ProfileId::from_public_key(&keypair.signing.public_bytes()))
    }

    /// The PeerId of the node key at `index`.
    pub fn peer_id(&self, index: u32) -> Result<PeerId> {
        let keypair = self.derive_class(KeyClass::Node, index)?;
        Ok(PeerId::from_public_key(&keypair.signing.public_bytes()))
    }

    /// Number of cached derivations (diagnostics).
    pub fn cached_keys(&self) -> usize {
        self.cache.read().len()
    }

    /// Drop every cached derivation.
    ///
    /// Subsequent `derive` calls re-derive from the root seed.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_cached() {
        let identity = Identity::create().unwrap();
        assert_eq!(identity.cached_keys(), 0);

        let path = DerivationPath::new(KeyClass::Profile, 0).unwrap();
        let first = identity.derive(path).unwrap();
        assert_eq!(identity.cached_keys(), 1);

        let second = identity.derive(path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cache_clear_rederives_identical_keys() {
        let identity = Identity::create().unwrap();
        let path = DerivationPath::new(KeyClass::Node, 2).unwrap();

        let before = identity.derive(path).unwrap().signing.public_bytes();
        identity.clear_cache();
        assert_eq!(identity.cached_keys(), 0);
        let after = identity.derive(path).unwrap().signing.public_bytes();

        assert_eq!(before, after);
    }

    #[test]
    fn test_ids_are_stable_per_index() {
        let identity = Identity::create().unwrap();

        assert_eq!(
            identity.network_id(0).unwrap(),
            identity.network_id(0).unwrap()
        );
        assert_ne!(
            identity.network_id(0).unwrap(),
            identity.network_id(1).unwrap()
        );
    }

    #[test]
    fn test_peer_id_hides_public_key() {
        let identity = Identity::create().unwrap();
        let node = identity.derive_class(KeyClass::Node, 0).unwrap();
        let peer_id = identity.peer_id(0).unwrap();

        assert_ne!(peer_id.as_bytes(), &node.signing.public_bytes());
        assert!(peer_id.matches_public_key(&node.signing.public_bytes()));
    }

    #[test]
    fn test_restored_identity_matches() {
        let identity = Identity::create().unwrap();
        let restored = Identity::from_phrase(&identity.backup_phrase()).unwrap();

        assert_eq!(
            identity.network_id(3).unwrap(),
            restored.network_id(3).unwrap()
        );
        assert_eq!(identity.peer_id(0).unwrap(), restored.peer_id(0).unwrap());
    }
}
