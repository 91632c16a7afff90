//! # Key Management
//!
//! Keypair types for the Weft identity hierarchy.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SigningKeyPair (Ed25519)                                              │
//! │  ─────────────────────────                                              │
//! │  • Proving identity (access tokens, epoch announcements)               │
//! │  • Verifying discovery traffic                                         │
//! │  • Source of PeerId / NetworkId / ProfileId                            │
//! │                                                                         │
//! │  EncryptionKeyPair (X25519)                                            │
//! │  ───────────────────────────                                            │
//! │  • Static-static and ephemeral-static Diffie-Hellman                   │
//! │  • Envelope content-key wrapping                                       │
//! │  • Epoch traffic-key derivation                                        │
//! │                                                                         │
//! │  KeyPair (Combined)                                                    │
//! │  ──────────────────                                                     │
//! │  Both halves of one derived identity. Every node on a derivation       │
//! │  path materializes as a KeyPair.                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ed25519 → X25519 Conversion
//!
//! Both curves are birationally equivalent forms of Curve25519, so a
//! single derived Ed25519 identity yields a Diffie-Hellman key without a
//! second derivation: the clamped secret scalar of the Ed25519 key is a
//! valid X25519 secret, and the verifying key maps to the corresponding
//! Montgomery point. `to_x25519` / [`ed25519_public_to_x25519`] implement
//! both directions of the public contract.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Combined keypair containing both signing and encryption keys
///
/// ## Security
///
/// - Private keys are zeroized when this struct is dropped
/// - Both halves derive from one leaf seed, so a path re-derivation
///   reproduces the pair exactly
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    /// Ed25519 keypair for signing
    pub signing: SigningKeyPair,
    /// X25519 keypair for encryption
    pub encryption: EncryptionKeyPair,
}

impl KeyPair {
    /// Generate a new random keypair
    ///
    /// Uses the operating system's secure random number generator.
    /// Random keypairs cannot be re-derived; identity keys should come
    /// from [`KeyPair::from_seed`] with a path-derived seed instead.
    pub fn generate() -> Self {
        Self {
            signing: SigningKeyPair::generate(),
            encryption: EncryptionKeyPair::generate(),
        }
    }

    /// Create a keypair from a 32-byte seed
    ///
    /// Deterministic: the same seed always produces the same keys.
    /// The seed is split into signing and encryption halves via HKDF
    /// with distinct domain-separation strings.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        let derived = super::kdf::derive_keys_from_seed(seed)?;

        Ok(Self {
            signing: SigningKeyPair::from_bytes(&derived.signing_key),
            encryption: EncryptionKeyPair::from_bytes(&derived.encryption_key),
        })
    }

    /// Get the public keys for sharing with others
    pub fn public_keys(&self) -> PublicKey {
        PublicKey {
            signing: self.signing.public_bytes(),
            encryption: self.encryption.public_bytes(),
        }
    }
}

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    /// Private signing key (secret)
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        let secret = SigningKey::generate(&mut OsRng);
        Self { secret }
    }

    /// Create from raw seed bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = SigningKey::from_bytes(bytes);
        Self { secret }
    }

    /// Get the secret key bytes (for backup/storage)
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key()
    }

    /// Convert to the X25519 counterpart of this key.
    ///
    /// The Ed25519 secret scalar (already clamped by the dalek
    /// expansion) is reused as an X25519 static secret, so the holder
    /// of the signing key can run Diffie-Hellman against peers that
    /// only know its Ed25519 public key.
    pub fn to_x25519(&self) -> EncryptionKeyPair {
        EncryptionKeyPair::from_bytes(&self.secret.to_scalar_bytes())
    }

    /// Get reference to the signing key
    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// Convert an Ed25519 public key to its X25519 counterpart.
///
/// Maps the Edwards point to Montgomery form. DH against the output
/// agrees with [`SigningKeyPair::to_x25519`] on the secret side.
pub fn ed25519_public_to_x25519(public_key: &[u8; 32]) -> Result<[u8; 32]> {
    let verifying = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidKey(format!("Invalid Ed25519 public key: {}", e)))?;
    Ok(verifying.to_montgomery().to_bytes())
}

/// X25519 encryption keypair for key exchange
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    /// Private encryption key (secret)
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    /// Public encryption key (derived from secret)
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the secret key bytes (for backup/storage)
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Perform Diffie-Hellman key exchange
    ///
    /// Both parties compute the same shared secret:
    /// `alice_secret × bob_public == bob_secret × alice_public`.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let their_public = X25519PublicKey::from(*their_public);
        self.secret.diffie_hellman(&their_public).to_bytes()
    }
}

/// Public keys that can be safely shared with others
///
/// Contains only public information; serializable and transmittable
/// without security concerns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKey {
    /// Ed25519 public key for signature verification (32 bytes)
    #[serde(with = "hex_bytes")]
    pub signing: [u8; 32],

    /// X25519 public key for encryption (32 bytes)
    #[serde(with = "hex_bytes")]
    pub encryption: [u8; 32],
}

impl PublicKey {
    /// Create a PublicKey from raw bytes
    pub fn from_bytes(signing: [u8; 32], encryption: [u8; 32]) -> Self {
        Self { signing, encryption }
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.signing)
            .map_err(|e| Error::InvalidKey(format!("Invalid signing public key: {}", e)))
    }
}

/// Serde helper for serializing byte arrays as hex
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|_| serde::de::Error::custom("Invalid length"))
    }
}

// ============================================================================
// TESTS
// ============================================================================
