//! # Access Tokens
//!
//! Signed capability tokens binding a peer identity to a network.
//!
//! ## Binary Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ACCESS TOKEN LAYOUT                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌────────────┬──────────────┬─────────────┬──────────────┐            │
//! │  │  peer_id   │  network_id  │ expiration  │  signature   │            │
//! │  │  32 bytes  │   32 bytes   │  8 bytes LE │   64 bytes   │            │
//! │  └────────────┴──────────────┴─────────────┴──────────────┘            │
//! │                                                                         │
//! │  expiration: Unix seconds, 0 = no expiration                           │
//! │  signature:  Ed25519 over the first 72 bytes, under the network's     │
//! │              private key                                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Verification Order
//!
//! 1. Signature against the network public key (`SignatureVerificationFailed`)
//! 2. Expiration against the caller's clock (`TokenExpired`)
//! 3. Optionally, the contextual peer binding (`PeerIdMismatch`) via
//!    [`AccessToken::verify_for_peer`]. Signature validity and contextual
//!    authorization are separate concerns; the discovery receive path
//!    layers the peer check on top.
//!
//! A token with no expiration stays valid until the issuing network
//! revokes by epoch bump, which invalidates the cached traffic keys of
//! peers still presenting it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::{sign, verify, Signature, SigningKeyPair, SIGNATURE_SIZE};
use crate::error::{Error, Result};
use crate::identity::{NetworkId, PeerId, ID_SIZE};

/// Size of the signed portion: peer_id ‖ network_id ‖ expiration
const PAYLOAD_SIZE: usize = ID_SIZE + ID_SIZE + 8;

/// Total serialized token size
pub const TOKEN_SIZE: usize = PAYLOAD_SIZE + SIGNATURE_SIZE;

/// A capability grant: `peer_id` may participate in `network_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The peer this token authorizes
    pub peer_id: PeerId,
    /// The network granting access
    pub network_id: NetworkId,
    /// Optional expiration (Unix seconds); None = valid until revoked
    pub expiration: Option<i64>,
    /// Network signature over the payload
    pub signature: Signature,
}

impl AccessToken {
    /// Issue a token for `peer_id` on `network_id`, signed with the
    /// network's private key.
    ///
    /// Non-positive expirations are treated as "no expiration" (the
    /// wire format reserves 0 for that).
    pub fn issue(
        peer_id: PeerId,
        network_id: NetworkId,
        network_key: &SigningKeyPair,
        expiration: Option<i64>,
    ) -> Self {
        let expiration = expiration.filter(|e| *e > 0);
        let payload = payload_bytes(&peer_id, &network_id, expiration);
        let signature = sign(network_key, &payload);

        Self {
            peer_id,
            network_id,
            expiration,
            signature,
        }
    }

    /// Verify the token's signature and expiration at time `now`.
    ///
    /// Does not check which peer presents the token; see
    /// [`AccessToken::verify_for_peer`].
    pub fn verify(&self, network_public_key: &[u8; 32], now: i64) -> Result<()> {
        let payload = payload_bytes(&self.peer_id, &self.network_id, self.expiration);
        verify(network_public_key, &payload, &self.signature)?;

        if let Some(expiration) = self.expiration {
            if now > expiration {
                return Err(Error::TokenExpired {
                    expired_at: expiration,
                    now,
                });
            }
        }

        Ok(())
    }

    /// Verify the token and additionally require it to be bound to
    /// `presenting_peer`.
    pub fn verify_for_peer(
        &self,
        network_public_key: &[u8; 32],
        presenting_peer: &PeerId,
        now: i64,
    ) -> Result<()> {
        self.verify(network_public_key, now)?;

        if &self.peer_id != presenting_peer {
            return Err(Error::PeerIdMismatch);
        }

        Ok(())
    }

    /// Serialize to the fixed binary layout.
    pub fn to_bytes(&self) -> [u8; TOKEN_SIZE] {
        let mut bytes = [0u8; TOKEN_SIZE];
        bytes[..PAYLOAD_SIZE].copy_from_slice(&payload_bytes(
            &self.peer_id,
            &self.network_id,
            self.expiration,
        ));
        bytes[PAYLOAD_SIZE..].copy_from_slice(self.signature.as_bytes());
        bytes
    }

    /// Parse from the fixed binary layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != TOKEN_SIZE {
            return Err(Error::Deserialization(format!(
                "Access token must be {} bytes, got {}",
                TOKEN_SIZE,
                bytes.len()
            )));
        }

        let peer_id = PeerId::from_bytes(bytes[..ID_SIZE].try_into().expect("length checked"));
        let network_id =
            NetworkId::from_bytes(bytes[ID_SIZE..2 * ID_SIZE].try_into().expect("length checked"));

        let expiration_raw = i64::from_le_bytes(
            bytes[2 * ID_SIZE..PAYLOAD_SIZE]
                .try_into()
                .expect("length checked"),
        );
        let expiration = (expiration_raw != 0).then_some(expiration_raw);

        let signature = Signature::from_slice(&bytes[PAYLOAD_SIZE..])?;

        Ok(Self {
            peer_id,
            network_id,
            expiration,
            signature,
        })
    }

    /// Encode as base64 for the discovery wire format.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    /// Decode from base64.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::Deserialization(format!("Invalid token base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

fn payload_bytes(
    peer_id: &PeerId,
    network_id: &NetworkId,
    expiration: Option<i64>,
) -> [u8; PAYLOAD_SIZE] {
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload[..ID_SIZE].copy_from_slice(peer_id.as_bytes());
    payload[ID_SIZE..2 * ID_SIZE].copy_from_slice(network_id.as_bytes());
    payload[2 * ID_SIZE..].copy_from_slice(&expiration.unwrap_or(0).to_le_bytes());
    payload
}

impl Serialize for AccessToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for AccessToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_setup() -> (PeerId, NetworkId, SigningKeyPair) {
        let network_key = SigningKeyPair::generate();
        let network_id = NetworkId::from_public_key(&network_key.public_bytes());
        let peer_id = PeerId::from_public_key(&SigningKeyPair::generate().public_bytes());
        (peer_id, network_id, network_key)
    }

    #[test]
    fn test_issue_verify_round_trip() {
        let (peer_id, network_id, network_key) = test_setup();

        let token = AccessToken::issue(peer_id, network_id, &network_key, Some(1_000));

        assert!(token.verify(&network_key.public_bytes(), 500).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let (peer_id, network_id, network_key) = test_setup();

        let token = AccessToken::issue(peer_id, network_id, &network_key, Some(1_000));

        let result = token.verify(&network_key.public_bytes(), 1_001);
        assert!(matches!(
            result,
            Err(Error::TokenExpired { expired_at: 1_000, now: 1_001 })
        ));
    }

    #[test]
    fn test_no_expiration_valid_indefinitely() {
        let (peer_id, network_id, network_key) = test_setup();

        let token = AccessToken::issue(peer_id, network_id, &network_key, None);

        assert!(token.verify(&network_key.public_bytes(), i64::MAX).is_ok());
    }

    #[test]
    fn test_wrong_network_key_rejected() {
        let (peer_id, network_id, network_key) = test_setup();
        let other_key = SigningKeyPair::generate();

        let token = AccessToken::issue(peer_id, network_id, &network_key, None);

        let result = token.verify(&other_key.public_bytes(), 0);
        assert!(matches!(result, Err(Error::SignatureVerificationFailed)));
    }

    #[test]
    fn test_peer_binding_checked_separately() {
        let (peer_id, network_id, network_key) = test_setup();
        let other_peer = PeerId::from_public_key(&SigningKeyPair::generate().public_bytes());

        let token = AccessToken::issue(peer_id, network_id, &network_key, None);

        // Signature validity is independent of who presents the token.
        assert!(token.verify(&network_key.public_bytes(), 0).is_ok());
        assert!(token
            .verify_for_peer(&network_key.public_bytes(), &peer_id, 0)
            .is_ok());

        let result = token.verify_for_peer(&network_key.public_bytes(), &other_peer, 0);
        assert!(matches!(result, Err(Error::PeerIdMismatch)));
    }

    #[test]
    fn test_binary_layout_round_trip() {
        let (peer_id, network_id, network_key) = test_setup();

        let token = AccessToken::issue(peer_id, network_id, &network_key, Some(42));
        let bytes = token.to_bytes();

        assert_eq!(bytes.len(), TOKEN_SIZE);
        assert_eq!(AccessToken::from_bytes(&bytes).unwrap(), token);
    }

    #[test]
    fn test_no_expiration_encodes_as_zero() {
        let (peer_id, network_id, network_key) = test_setup();

        let token = AccessToken::issue(peer_id, network_id, &network_key, None);
        let bytes = token.to_bytes();

        assert_eq!(&bytes[64..72], &[0u8; 8]);
        assert_eq!(AccessToken::from_bytes(&bytes).unwrap().expiration, None);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let (peer_id, network_id, network_key) = test_setup();

        let token = AccessToken::issue(peer_id, network_id, &network_key, Some(1_000));
        let mut bytes = token.to_bytes();
        // Stretch the expiration.
        bytes[64] ^= 0xFF;

        let tampered = AccessToken::from_bytes(&bytes).unwrap();
        let result = tampered.verify(&network_key.public_bytes(), 0);
        assert!(matches!(result, Err(Error::SignatureVerificationFailed)));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(AccessToken::from_bytes(&[0u8; 10]).is_err());
        assert!(AccessToken::from_bytes(&[0u8; TOKEN_SIZE + 1]).is_err());
    }

    #[test]
    fn test_base64_round_trip() {
        let (peer_id, network_id, network_key) = test_setup();

        let token = AccessToken::issue(peer_id, network_id, &network_key, Some(99));
        let restored = AccessToken::from_base64(&token.to_base64()).unwrap();

        assert_eq!(restored, token);
    }

    #[test]
    fn test_serde_uses_base64() {
        let (peer_id, network_id, network_key) = test_setup();

        let token = AccessToken::issue(peer_id, network_id, &network_key, None);
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, format!("\"{}\"", token.to_base64()));

        let restored: AccessToken = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, token);
    }
}
