//! # Public Identifiers
//!
//! Self-certifying identifiers for peers, networks, and profiles.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        IDENTIFIER DERIVATION                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PeerId     = SHA-256(node Ed25519 public key)      32 bytes           │
//! │  NetworkId  = network Ed25519 public key            32 bytes           │
//! │  ProfileId  = profile Ed25519 public key            32 bytes           │
//! │                                                                         │
//! │  Wire encoding: standard base64 of the 32 raw bytes.                   │
//! │                                                                         │
//! │  A NetworkId doubles as the verification key for access tokens and     │
//! │  epoch announcements issued by that network. A PeerId hides the        │
//! │  underlying key; verification always goes through the advertised       │
//! │  public key and then checks the hash.                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Length of every identifier's raw form
pub const ID_SIZE: usize = 32;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; ID_SIZE]);

        impl $name {
            /// Wrap raw identifier bytes
            pub fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
                Self(bytes)
            }

            /// Parse from a base64 wire encoding
            pub fn from_base64(encoded: &str) -> Result<Self> {
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|e| Error::InvalidKey(format!("Invalid base64 id: {}", e)))?;
                let bytes: [u8; ID_SIZE] = bytes.try_into().map_err(|_| {
                    Error::InvalidKey(format!(
                        "{} must be {} bytes",
                        stringify!($name),
                        ID_SIZE
                    ))
                })?;
                Ok(Self(bytes))
            }

            /// The raw identifier bytes
            pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
                &self.0
            }

            /// The base64 wire encoding
            pub fn to_base64(&self) -> String {
                BASE64.encode(self.0)
            }

            /// Short fingerprint for logging
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_base64())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.short())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_base64())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_base64(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

id_newtype! {
    /// Public identifier of a node/peer: SHA-256 of its Ed25519 public key.
    ///
    /// Stable for the lifetime of the peer identity.
    PeerId
}

id_newtype! {
    /// Public identifier of a network: the Ed25519 public key of the
    /// Network-class key. Immutable once the network is created.
    NetworkId
}

id_newtype! {
    /// Public identifier of a profile: the Ed25519 public key of the
    /// Profile-class key.
    ProfileId
}

impl PeerId {
    /// Derive the PeerId for an Ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = Sha256::digest(public_key);
        Self(digest.into())
    }

    /// Check that `public_key` hashes to this PeerId.
    pub fn matches_public_key(&self, public_key: &[u8; 32]) -> bool {
        Self::from_public_key(public_key) == *self
    }
}

impl NetworkId {
    /// A NetworkId is the network's verification key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self(*public_key)
    }

    /// The Ed25519 verification key bytes
    pub fn public_key(&self) -> &[u8; 32] {
        &self.0
    }
}

impl ProfileId {
    /// A ProfileId is the profile's Ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self(*public_key)
    }

    /// The Ed25519 public key bytes
    pub fn public_key(&self) -> &[u8; 32] {
        &self.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_is_hash_of_public_key() {
        let public = [5u8; 32];
        let peer = PeerId::from_public_key(&public);

        assert_ne!(peer.as_bytes(), &public);
        assert!(peer.matches_public_key(&public));
        assert!(!peer.matches_public_key(&[6u8; 32]));
    }

    #[test]
    fn test_network_id_is_public_key() {
        let public = [5u8; 32];
        let network = NetworkId::from_public_key(&public);

        assert_eq!(network.public_key(), &public);
    }

    #[test]
    fn test_base64_round_trip() {
        let peer = PeerId::from_public_key(&[9u8; 32]);

        let encoded = peer.to_base64();
        let decoded = PeerId::from_base64(&encoded).unwrap();

        assert_eq!(peer, decoded);
    }

    #[test]
    fn test_base64_rejects_wrong_length() {
        let encoded = BASE64.encode([1u8; 16]);
        assert!(NetworkId::from_base64(&encoded).is_err());
    }

    #[test]
    fn test_base64_rejects_garbage() {
        assert!(PeerId::from_base64("not!!base64").is_err());
    }

    #[test]
    fn test_serde_uses_base64_strings() {
        let network = NetworkId::from_public_key(&[3u8; 32]);

        let json = serde_json::to_string(&network).unwrap();
        assert_eq!(json, format!("\"{}\"", network.to_base64()));

        let restored: NetworkId = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, network);
    }

    #[test]
    fn test_debug_is_short() {
        let peer = PeerId::from_public_key(&[1u8; 32]);
        let debug = format!("{:?}", peer);

        assert!(debug.starts_with("PeerId("));
        assert!(debug.len() < 20);
    }
}
