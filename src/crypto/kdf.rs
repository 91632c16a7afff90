//! # Key Derivation Functions
//!
//! HKDF-SHA256 building blocks for the Weft key hierarchy.
//!
//! ## Derivation Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION HIERARCHY                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Root Seed (32 bytes, from entropy or BIP39 backup phrase)             │
//! │        │                                                                │
//! │        │  derive_child_seed, once per hardened path component          │
//! │        │  HKDF(ikm=parent, info="weft-hd-child-v1" || index_be)        │
//! │        ▼                                                                │
//! │  Leaf Seed (32 bytes, one per m/44'/0'/<class>'/<index>')              │
//! │        │                                                                │
//! │        ├──► HKDF(info="weft-signing-key-v1")    → Ed25519 seed         │
//! │        │                                                                │
//! │        └──► HKDF(info="weft-encryption-key-v1") → X25519 secret        │
//! │                                                                         │
//! │  Shared secrets (X25519 DH output)                                     │
//! │        │                                                                │
//! │        ├──► HKDF(salt=network_id, info="...epoch:<n>") → traffic key   │
//! │        │                                                                │
//! │        └──► HKDF(salt=network_id, info="...wrap-v1")   → envelope wrap │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! | Aspect | Design Choice | Rationale |
//! |--------|---------------|-----------|
//! | KDF Algorithm | HKDF-SHA256 | Well-analyzed, recommended by NIST |
//! | Key Separation | Different `info` strings | Prevents key reuse across purposes |
//! | Context Binding | `salt = network_id` | Domain separation per network |
//! | Version String | "-v1" suffix | Allows future algorithm upgrades |

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Domain separation strings for HKDF
///
/// These ensure that keys derived for different purposes are
/// cryptographically independent, even when derived from the same
/// input key material.
pub mod domain {
    /// Domain for signing key derivation from a leaf seed
    pub const SIGNING_KEY: &[u8] = b"weft-signing-key-v1";

    /// Domain for encryption key derivation from a leaf seed
    pub const ENCRYPTION_KEY: &[u8] = b"weft-encryption-key-v1";

    /// Domain prefix for hardened child-seed derivation
    pub const HD_CHILD: &[u8] = b"weft-hd-child-v1";

    /// Domain prefix for epoch-bound traffic keys
    pub const EPOCH_TRAFFIC: &[u8] = b"weft-epoch-traffic-v1";

    /// Domain for envelope content-key wrapping
    pub const ENVELOPE_WRAP: &[u8] = b"weft-envelope-wrap-v1";

    /// Domain for the local at-rest storage key
    pub const STORAGE_ENCRYPTION: &[u8] = b"weft-storage-encryption-v1";
}

/// Keys derived from a leaf seed
#[derive(ZeroizeOnDrop)]
pub struct DerivedKeys {
    /// Ed25519 signing key seed (32 bytes)
    pub signing_key: [u8; 32],

    /// X25519 encryption secret (32 bytes)
    pub encryption_key: [u8; 32],
}

/// Derive signing and encryption key material from a leaf seed.
///
/// The input seed should carry at least 256 bits of entropy (root seeds
/// do; path-derived leaf seeds inherit it).
pub fn derive_keys_from_seed(seed: &[u8; 32]) -> Result<DerivedKeys> {
    let hkdf = Hkdf::<Sha256>::new(None, seed);

    let mut signing_key = [0u8; 32];
    hkdf.expand(domain::SIGNING_KEY, &mut signing_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive signing key".into()))?;

    let mut encryption_key = [0u8; 32];
    hkdf.expand(domain::ENCRYPTION_KEY, &mut encryption_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive encryption key".into()))?;

    Ok(DerivedKeys {
        signing_key,
        encryption_key,
    })
}

/// Derive one hardened child seed from a parent seed.
///
/// The child index is bound into the HKDF info string, so siblings are
/// cryptographically independent and a child seed reveals nothing about
/// its parent or siblings.
pub fn derive_child_seed(parent: &[u8; 32], index: u32) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(None, parent);

    let mut info = Vec::with_capacity(domain::HD_CHILD.len() + 4);
    info.extend_from_slice(domain::HD_CHILD);
    info.extend_from_slice(&index.to_be_bytes());

    let mut child = [0u8; 32];
    hkdf.expand(&info, &mut child)
        .map_err(|_| Error::KeyDerivationFailed(format!("Failed to derive child {}", index)))?;

    Ok(child)
}

/// Derive an epoch-bound traffic key from a DH shared secret.
///
/// The epoch is bound through the info string (`epoch:<n>`) and the
/// network id through the salt, so a bump rotates every pairwise key
/// without new key exchange.
pub fn derive_traffic_key(
    dh_output: &[u8; 32],
    network_id: &[u8],
    epoch: u64,
) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(Some(network_id), dh_output);

    let mut info = Vec::with_capacity(domain::EPOCH_TRAFFIC.len() + 28);
    info.extend_from_slice(domain::EPOCH_TRAFFIC);
    info.extend_from_slice(format!("/epoch:{}", epoch).as_bytes());

    let mut key = [0u8; 32];
    hkdf.expand(&info, &mut key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive traffic key".into()))?;

    Ok(key)
}

/// Derive the envelope content-key wrapping key from a DH shared secret.
///
/// Salted with the network id so a wrap for one network cannot be
/// replayed against another.
pub fn derive_wrap_key(dh_output: &[u8; 32], network_id: &[u8]) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(Some(network_id), dh_output);

    let mut key = [0u8; 32];
    hkdf.expand(domain::ENVELOPE_WRAP, &mut key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive wrap key".into()))?;

    Ok(key)
}

/// Derive a storage encryption key from identity key material.
///
/// Used to encrypt Node-class keys at rest. Tied to both halves of the
/// identity so neither alone reconstructs it.
pub fn derive_storage_key(
    signing_key: &[u8; 32],
    encryption_key: &[u8; 32],
) -> Result<[u8; 32]> {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(signing_key);
    combined[32..].copy_from_slice(encryption_key);

    let hkdf = Hkdf::<Sha256>::new(None, &combined);

    let mut storage_key = [0u8; 32];
    hkdf.expand(domain::STORAGE_ENCRYPTION, &mut storage_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive storage key".into()))?;

    combined.zeroize();

    Ok(storage_key)
}

/// Compute a short fingerprint of a public key for display and logging.
///
/// First 8 bytes of SHA-256, hex encoded. Not a security boundary.
pub fn compute_key_fingerprint(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..8])
}

// ============================================================================
// TESTS
// ============================================================================
