//! # Epoch Management
//!
//! Per-network rotation counters for system-internal traffic keys.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EPOCH ROTATION                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  epoch: u64, monotonic, one per network                                │
//! │                                                                         │
//! │  bump()  ──►  epoch+1, signed by the network key, gossiped             │
//! │                                                                         │
//! │  traffic key = HKDF( DH(sender_priv, receiver_pub),                    │
//! │                      salt = network_id,                                │
//! │                      info = "…/epoch:<epoch>" )                        │
//! │                                                                         │
//! │  Receivers serve only the last N epochs; anything older fails with     │
//! │  EpochOutOfWindow, bounding the exposure window after a bump.          │
//! │                                                                         │
//! │  User-shared traffic ignores epochs entirely; it carries an explicit   │
//! │  per-record TTL on the envelope instead.                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Epoch state is owned per [`EpochManager`] handle and keyed by
//! network: created when the network is registered, mutated only via
//! `bump`/`accept`, torn down with the network. There is no process-wide
//! counter.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::crypto::{derive_traffic_key, EncryptionKeyPair, Signed, SigningKeyPair};
use crate::error::{Error, Result};
use crate::identity::NetworkId;

/// Default number of epochs a receiver serves (current + previous)
pub const DEFAULT_RETENTION: u64 = 2;

/// A gossiped epoch transition, signed by the network key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochAnnouncement {
    /// The network whose epoch changed
    pub network_id: NetworkId,
    /// The new epoch value
    pub epoch: u64,
}

/// Owner of per-network epoch state.
pub struct EpochManager {
    retention: u64,
    epochs: RwLock<HashMap<NetworkId, u64>>,
}

impl EpochManager {
    /// Manager with the default retention window.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Manager retaining the last `retention` epochs (minimum 1).
    pub fn with_retention(retention: u64) -> Self {
        Self {
            retention: retention.max(1),
            epochs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a network at its initial epoch. Idempotent; an already
    /// registered network keeps its current value.
    pub fn register_network(&self, network_id: NetworkId, initial_epoch: u64) {
        self.epochs.write().entry(network_id).or_insert(initial_epoch);
    }

    /// Tear down a network's epoch state.
    pub fn remove_network(&self, network_id: &NetworkId) {
        self.epochs.write().remove(network_id);
    }

    /// The current epoch of a network.
    pub fn current(&self, network_id: &NetworkId) -> Result<u64> {
        self.epochs
            .read()
            .get(network_id)
            .copied()
            .ok_or_else(|| Error::UnknownNetwork(network_id.to_base64()))
    }

    /// Advance a network's epoch by one and sign the transition for
    /// gossip.
    ///
    /// Bumps are serialized per manager: the increment happens under
    /// the write lock, so two concurrent bumps always observe distinct
    /// successive values.
    pub fn bump(
        &self,
        network_id: &NetworkId,
        network_key: &SigningKeyPair,
    ) -> Result<Signed<EpochAnnouncement>> {
        let epoch = {
            let mut epochs = self.epochs.write();
            let entry = epochs
                .get_mut(network_id)
                .ok_or_else(|| Error::UnknownNetwork(network_id.to_base64()))?;
            *entry += 1;
            *entry
        };

        tracing::info!(network = %network_id.short(), epoch, "epoch bumped");

        Signed::new(
            EpochAnnouncement {
                network_id: *network_id,
                epoch,
            },
            network_key,
        )
    }

    /// Accept a gossiped epoch announcement.
    ///
    /// Verifies the signature against the announced network's key (a
    /// NetworkId is that key), then advances the stored epoch if and
    /// only if the announcement is ahead of it. Returns whether the
    /// local epoch moved; stale announcements are ignored, not errors.
    pub fn accept(&self, announcement: &Signed<EpochAnnouncement>) -> Result<bool> {
        let data = announcement.verify_signer(announcement.data.network_id.public_key())?;
        let network_id = data.network_id;
        let announced = data.epoch;

        let mut epochs = self.epochs.write();
        let entry = epochs
            .get_mut(&network_id)
            .ok_or_else(|| Error::UnknownNetwork(network_id.to_base64()))?;

        if announced <= *entry {
            tracing::debug!(
                network = %network_id.short(),
                announced,
                current = *entry,
                "ignoring stale epoch announcement"
            );
            return Ok(false);
        }

        *entry = announced;
        tracing::info!(network = %network_id.short(), epoch = announced, "epoch advanced");
        Ok(true)
    }

    /// Derive the system-internal traffic key for `epoch` between our
    /// key and a peer's public key.
    ///
    /// Refuses epochs outside the retention window
    /// `[current - retention + 1, current]`; keys for purged epochs are
    /// gone for good.
    pub fn traffic_key(
        &self,
        network_id: &NetworkId,
        epoch: u64,
        our_key: &EncryptionKeyPair,
        their_public: &[u8; 32],
    ) -> Result<[u8; 32]> {
        let current = self.current(network_id)?;

        let too_old = current.saturating_sub(epoch) >= self.retention;
        if epoch > current || too_old {
            return Err(Error::EpochOutOfWindow {
                requested: epoch,
                current,
                retain: self.retention,
            });
        }

        let dh = our_key.diffie_hellman(their_public);
        derive_traffic_key(&dh, network_id.as_bytes(), epoch)
    }
}

impl Default for EpochManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_network() -> (NetworkId, SigningKeyPair) {
        let key = SigningKeyPair::generate();
        (NetworkId::from_public_key(&key.public_bytes()), key)
    }

    #[test]
    fn test_register_and_current() {
        let (network_id, _) = test_network();
        let manager = EpochManager::new();

        manager.register_network(network_id, 5);
        assert_eq!(manager.current(&network_id).unwrap(), 5);

        // Idempotent registration keeps the current value.
        manager.register_network(network_id, 0);
        assert_eq!(manager.current(&network_id).unwrap(), 5);
    }

    #[test]
    fn test_unknown_network_rejected() {
        let (network_id, _) = test_network();
        let manager = EpochManager::new();

        assert!(matches!(
            manager.current(&network_id),
            Err(Error::UnknownNetwork(_))
        ));
    }

    #[test]
    fn test_bump_increments_and_signs() {
        let (network_id, network_key) = test_network();
        let manager = EpochManager::new();
        manager.register_network(network_id, 0);

        let announcement = manager.bump(&network_id, &network_key).unwrap();

        assert_eq!(manager.current(&network_id).unwrap(), 1);
        assert_eq!(announcement.data.epoch, 1);
        assert!(announcement
            .verify_signer(network_id.public_key())
            .is_ok());
    }

    #[test]
    fn test_accept_advances_monotonically() {
        let (network_id, network_key) = test_network();

        let owner = EpochManager::new();
        owner.register_network(network_id, 0);
        let receiver = EpochManager::new();
        receiver.register_network(network_id, 0);

        let first = owner.bump(&network_id, &network_key).unwrap();
        let second = owner.bump(&network_id, &network_key).unwrap();

        // Out-of-order delivery: the newer announcement wins, the
        // older one is ignored without error.
        assert!(receiver.accept(&second).unwrap());
        assert!(!receiver.accept(&first).unwrap());
        assert_eq!(receiver.current(&network_id).unwrap(), 2);
    }

    #[test]
    fn test_accept_rejects_forged_announcement() {
        let (network_id, network_key) = test_network();
        let forger = SigningKeyPair::generate();

        let receiver = EpochManager::new();
        receiver.register_network(network_id, 0);

        let forged = Signed::new(
            EpochAnnouncement { network_id, epoch: 9 },
            &forger,
        )
        .unwrap();

        assert!(receiver.accept(&forged).is_err());
        assert_eq!(receiver.current(&network_id).unwrap(), 0);

        // Tampering with a genuine announcement also fails.
        let mut genuine = Signed::new(
            EpochAnnouncement { network_id, epoch: 1 },
            &network_key,
        )
        .unwrap();
        genuine.data.epoch = 9;
        assert!(receiver.accept(&genuine).is_err());
    }

    #[test]
    fn test_traffic_keys_agree_between_parties() {
        let (network_id, _) = test_network();
        let manager = EpochManager::new();
        manager.register_network(network_id, 3);

        let alice = EncryptionKeyPair::generate();
        let bob = EncryptionKeyPair::generate();

        let alice_key = manager
            .traffic_key(&network_id, 3, &alice, &bob.public_bytes())
            .unwrap();
        let bob_key = manager
            .traffic_key(&network_id, 3, &bob, &alice.public_bytes())
            .unwrap();

        assert_eq!(alice_key, bob_key);
    }

    #[test]
    fn test_traffic_keys_rotate_per_epoch() {
        let (network_id, network_key) = test_network();
        let manager = EpochManager::new();
        manager.register_network(network_id, 1);

        let alice = EncryptionKeyPair::generate();
        let bob = EncryptionKeyPair::generate();

        let before = manager
            .traffic_key(&network_id, 1, &alice, &bob.public_bytes())
            .unwrap();
        manager.bump(&network_id, &network_key).unwrap();
        let after = manager
            .traffic_key(&network_id, 2, &alice, &bob.public_bytes())
            .unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_retention_window_enforced() {
        let (network_id, network_key) = test_network();
        // Retain current + previous.
        let manager = EpochManager::with_retention(2);
        manager.register_network(network_id, 0);

        let alice = EncryptionKeyPair::generate();
        let bob = EncryptionKeyPair::generate();

        for _ in 0..3 {
            manager.bump(&network_id, &network_key).unwrap();
        }
        assert_eq!(manager.current(&network_id).unwrap(), 3);

        // Epochs 2 and 3 are inside the window.
        assert!(manager
            .traffic_key(&network_id, 3, &alice, &bob.public_bytes())
            .is_ok());
        assert!(manager
            .traffic_key(&network_id, 2, &alice, &bob.public_bytes())
            .is_ok());

        // Epoch 1 was purged; its derived key is unrecoverable here.
        let result = manager.traffic_key(&network_id, 1, &alice, &bob.public_bytes());
        assert!(matches!(
            result,
            Err(Error::EpochOutOfWindow { requested: 1, current: 3, retain: 2 })
        ));

        // Future epochs are not served either.
        assert!(manager
            .traffic_key(&network_id, 4, &alice, &bob.public_bytes())
            .is_err());
    }

    #[test]
    fn test_remove_network_tears_down_state() {
        let (network_id, _) = test_network();
        let manager = EpochManager::new();
        manager.register_network(network_id, 0);

        manager.remove_network(&network_id);
        assert!(manager.current(&network_id).is_err());
    }
}
