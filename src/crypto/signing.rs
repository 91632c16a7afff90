//! # Digital Signatures
//!
//! Ed25519 signatures for access tokens, epoch announcements, and any
//! other payload that must be bound to a network or peer identity.
//!
//! Ed25519 signatures are deterministic: signing the same message with
//! the same key always produces the same 64-byte signature. Verification
//! failures surface as `SignatureVerificationFailed` and are terminal
//! for the message that produced them.

use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::crypto::SigningKeyPair;
use crate::error::{Error, Result};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 digital signature
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "signature_bytes")] pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 64 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != SIGNATURE_SIZE {
            return Err(Error::InvalidKey(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                slice.len()
            )));
        }
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Sign a message using Ed25519.
pub fn sign(keypair: &SigningKeyPair, message: &[u8]) -> Signature {
    let sig = keypair.signing_key().sign(message);
    Signature(sig.to_bytes())
}

/// Verify an Ed25519 signature.
///
/// Returns `Ok(())` if valid, `Err(SignatureVerificationFailed)` if the
/// signature does not match, or `InvalidKey` if the public key bytes do
/// not decode to a curve point.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidKey(format!("Invalid public key: {}", e)))?;

    let sig = Ed25519Signature::from_bytes(&signature.0);

    verifying_key
        .verify(message, &sig)
        .map_err(|_| Error::SignatureVerificationFailed)
}

/// Serde helper for signature bytes
mod signature_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid signature length"))
    }
}

// ============================================================================
// SIGNED DATA WRAPPER
// ============================================================================

/// A piece of data along with its signature and signer.
///
/// Used where the signature must travel with the data, e.g. gossiped
/// epoch announcements. The signature covers the bincode encoding of
/// the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signed<T: Serialize> {
    /// The signed data
    pub data: T,
    /// Public key of the signer
    #[serde(with = "crate::crypto::keys::hex_bytes")]
    pub signer_public_key: [u8; 32],
    /// Signature over the serialized data
    pub signature: Signature,
}

impl<T: Serialize + for<'de> Deserialize<'de>> Signed<T> {
    /// Sign `data` with `keypair`, producing a self-contained wrapper.
    pub fn new(data: T, keypair: &SigningKeyPair) -> Result<Self> {
        let serialized = bincode::serialize(&data)?;
        let signature = sign(keypair, &serialized);

        Ok(Self {
            data,
            signer_public_key: keypair.public_bytes(),
            signature,
        })
    }

    /// Verify the signature against the embedded signer key and return
    /// the data if valid.
    pub fn verify(&self) -> Result<&T> {
        let serialized = bincode::serialize(&self.data)?;
        verify(&self.signer_public_key, &serialized, &self.signature)?;
        Ok(&self.data)
    }

    /// Verify the signature against an expected signer key.
    ///
    /// Rejects wrappers whose embedded key differs from the expected
    /// one even when self-consistent.
    pub fn verify_signer(&self, expected_public_key: &[u8; 32]) -> Result<&T> {
        if &self.signer_public_key != expected_public_key {
            return Err(Error::SignatureVerificationFailed);
        }
        self.verify()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = SigningKeyPair::generate();
        let message = b"announce epoch 4";

        let signature = sign(&keypair, message);
        assert!(verify(&keypair.public_bytes(), message, &signature).is_ok());
    }

    #[test]
    fn test_verify_wrong_message_fails() {
        let keypair = SigningKeyPair::generate();

        let signature = sign(&keypair, b"original");
        let result = verify(&keypair.public_bytes(), b"tampered", &signature);

        assert!(matches!(result, Err(Error::SignatureVerificationFailed)));
    }

    #[test]
    fn test_verify_wrong_key_fails() {
        let keypair1 = SigningKeyPair::generate();
        let keypair2 = SigningKeyPair::generate();

        let signature = sign(&keypair1, b"message");
        let result = verify(&keypair2.public_bytes(), b"message", &signature);

        assert!(matches!(result, Err(Error::SignatureVerificationFailed)));
    }

    #[test]
    fn test_deterministic_signatures() {
        let keypair = SigningKeyPair::generate();

        let sig1 = sign(&keypair, b"same message");
        let sig2 = sign(&keypair, b"same message");

        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_signed_wrapper_round_trip() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Payload {
            network: String,
            epoch: u64,
        }

        let keypair = SigningKeyPair::generate();
        let payload = Payload { network: "net-1".into(), epoch: 9 };

        let signed = Signed::new(payload.clone(), &keypair).unwrap();
        assert_eq!(signed.verify().unwrap(), &payload);
        assert_eq!(signed.verify_signer(&keypair.public_bytes()).unwrap(), &payload);
    }

    #[test]
    fn test_signed_wrapper_tampered_fails() {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Payload {
            epoch: u64,
        }

        let keypair = SigningKeyPair::generate();
        let mut signed = Signed::new(Payload { epoch: 1 }, &keypair).unwrap();
        signed.data.epoch = 2;

        assert!(signed.verify().is_err());
    }

    #[test]
    fn test_signed_wrapper_wrong_signer_fails() {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Payload {
            epoch: u64,
        }

        let keypair = SigningKeyPair::generate();
        let other = SigningKeyPair::generate();
        let signed = Signed::new(Payload { epoch: 1 }, &keypair).unwrap();

        assert!(signed.verify_signer(&other.public_bytes()).is_err());
    }
}
