//! # Envelope Encryption
//!
//! Multi-recipient encryption of opaque payloads.
//!
//! ## Envelope Construction
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ENVELOPE ENCRYPTION FLOW                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: One random content key per envelope                           │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  content_key = random 32 bytes                              │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 2: Encrypt the payload once                                      │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  AES-256-GCM(content_key, payload,                          │       │
//! │  │              aad = [version] || network_id)                 │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Step 3: Wrap the content key once per recipient                       │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  ephemeral X25519 keypair (one per envelope)                │       │
//! │  │                                                             │       │
//! │  │  per recipient:                                             │       │
//! │  │    DH(ephemeral_secret, recipient_public)                   │       │
//! │  │      → HKDF(salt = network_id)  → wrap key                  │       │
//! │  │      → AES-GCM(wrap key, content_key,                       │       │
//! │  │                aad = [version] || network_id || id)         │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Output: { ciphertext, network_encrypted_key,                          │
//! │            profile_encrypted_keys{ id → wrapped } }                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every recipient entry independently unwraps to the same content key,
//! so a holder of any single recipient secret recovers the payload with
//! one DH computation. A holder without a matching entry (or with the
//! wrong key for its entry) fails with `RecipientNotAuthorized`, which
//! callers can distinguish from malformed data (`DecryptionFailed`).
//!
//! The AAD binds every ciphertext to the envelope version and network
//! id; moving an envelope between networks fails authentication instead
//! of decrypting.

use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::encryption::{decrypt, encrypt, EncryptionKey, Nonce, NONCE_SIZE, TAG_SIZE};
use crate::crypto::kdf::derive_wrap_key;
use crate::crypto::EncryptionKeyPair;
use crate::error::{Error, Result};
use crate::identity::NetworkId;

/// Current envelope format version, bound into every AAD
pub const ENVELOPE_VERSION: u8 = 1;

/// A recipient of an envelope: an id string and an X25519 public key.
///
/// Profile recipients use the profile id's base64 form; node-scope
/// recipients use the node id the same way.
#[derive(Debug, Clone)]
pub struct EnvelopeRecipient {
    /// Identifier keying this recipient's entry in the envelope
    pub id: String,
    /// X25519 public key the content key is wrapped for
    pub public_key: [u8; 32],
}

/// The secret a holder presents to open an envelope.
pub enum EnvelopeKey<'a> {
    /// The network's X25519 keypair (converted from the network key)
    Network(&'a EncryptionKeyPair),
    /// A profile (or node) recipient's keypair, with the id its entry
    /// is keyed under
    Profile {
        /// Recipient id matching a `profile_encrypted_keys` entry
        id: &'a str,
        /// The recipient's X25519 keypair
        keypair: &'a EncryptionKeyPair,
    },
}

/// Multi-recipient ciphertext. Immutable once created.
///
/// All variable-length byte fields are `nonce ‖ ciphertext+tag`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvelopeEncryptedData {
    /// Envelope format version
    pub version: u8,
    /// Network this envelope is bound to
    pub network_id: NetworkId,
    /// Per-envelope ephemeral X25519 public key
    #[serde(with = "crate::crypto::keys::hex_bytes")]
    pub ephemeral_public: [u8; 32],
    /// Payload ciphertext under the content key
    pub ciphertext: Vec<u8>,
    /// Content key wrapped for the network key
    pub network_encrypted_key: Vec<u8>,
    /// Content key wrapped per additional recipient, keyed by id
    pub profile_encrypted_keys: BTreeMap<String, Vec<u8>>,
    /// Per-record TTL for user-shared traffic (Unix seconds, None = no TTL)
    pub expires_at: Option<i64>,
}

/// Encrypt `payload` for the network key plus the given recipients.
pub fn seal(
    payload: &[u8],
    network_id: &NetworkId,
    network_public: &[u8; 32],
    recipients: &[EnvelopeRecipient],
    expires_at: Option<i64>,
) -> Result<EnvelopeEncryptedData> {
    let mut content_key = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng.fill_bytes(&mut content_key[..]);

    let aad = payload_aad(network_id);
    let (nonce, ciphertext) = encrypt(&EncryptionKey::from_bytes(*content_key), payload, &aad)?;

    let ephemeral = EncryptionKeyPair::generate();

    let network_entry = wrap_content_key(
        &ephemeral,
        network_public,
        network_id,
        &network_id.to_base64(),
        &content_key,
    )?;

    let mut profile_encrypted_keys = BTreeMap::new();
    for recipient in recipients {
        let entry = wrap_content_key(
            &ephemeral,
            &recipient.public_key,
            network_id,
            &recipient.id,
            &content_key,
        )?;
        profile_encrypted_keys.insert(recipient.id.clone(), entry);
    }

    Ok(EnvelopeEncryptedData {
        version: ENVELOPE_VERSION,
        network_id: *network_id,
        ephemeral_public: ephemeral.public_bytes(),
        ciphertext: join_entry(&nonce, &ciphertext),
        network_encrypted_key: network_entry,
        profile_encrypted_keys,
        expires_at,
    })
}

/// Decrypt an envelope with a single recipient secret, against the
/// current clock.
pub fn open(envelope: &EnvelopeEncryptedData, key: &EnvelopeKey<'_>) -> Result<Vec<u8>> {
    open_at(envelope, key, crate::time::now_timestamp())
}

/// Decrypt an envelope with a single recipient secret at time `now`.
///
/// ## Errors
///
/// - `RecordExpired` if the envelope carries a TTL in the past
/// - `RecipientNotAuthorized` if no entry exists for the holder, or the
///   holder's key fails to unwrap its entry
/// - `DecryptionFailed` for structurally malformed envelopes or payload
///   tampering
pub fn open_at(
    envelope: &EnvelopeEncryptedData,
    key: &EnvelopeKey<'_>,
    now: i64,
) -> Result<Vec<u8>> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(Error::DecryptionFailed(format!(
            "Unsupported envelope version {}",
            envelope.version
        )));
    }

    if let Some(expires_at) = envelope.expires_at {
        if now > expires_at {
            return Err(Error::RecordExpired(expires_at));
        }
    }

    let (entry, entry_id, keypair) = match key {
        EnvelopeKey::Network(keypair) => (
            envelope.network_encrypted_key.as_slice(),
            envelope.network_id.to_base64(),
            *keypair,
        ),
        EnvelopeKey::Profile { id, keypair } => {
            let entry = envelope
                .profile_encrypted_keys
                .get(*id)
                .ok_or(Error::RecipientNotAuthorized)?;
            (entry.as_slice(), (*id).to_string(), *keypair)
        }
    };

    let content_key = unwrap_content_key(entry, &entry_id, keypair, envelope)?;

    let (nonce, payload_ct) = split_entry(&envelope.ciphertext)?;
    decrypt(
        &EncryptionKey::from_bytes(*content_key),
        &nonce,
        payload_ct,
        &payload_aad(&envelope.network_id),
    )
}

// ============================================================================
// INTERNALS
// ============================================================================

fn payload_aad(network_id: &NetworkId) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + 32);
    aad.push(ENVELOPE_VERSION);
    aad.extend_from_slice(network_id.as_bytes());
    aad
}

fn wrap_aad(network_id: &NetworkId, recipient_id: &str) -> Vec<u8> {
    let mut aad = payload_aad(network_id);
    aad.extend_from_slice(recipient_id.as_bytes());
    aad
}

fn wrap_content_key(
    ephemeral: &EncryptionKeyPair,
    recipient_public: &[u8; 32],
    network_id: &NetworkId,
    recipient_id: &str,
    content_key: &[u8; 32],
) -> Result<Vec<u8>> {
    let dh = ephemeral.diffie_hellman(recipient_public);
    let wrap_key = derive_wrap_key(&dh, network_id.as_bytes())?;

    let (nonce, wrapped) = encrypt(
        &EncryptionKey::from_bytes(wrap_key),
        content_key,
        &wrap_aad(network_id, recipient_id),
    )?;

    Ok(join_entry(&nonce, &wrapped))
}

fn unwrap_content_key(
    entry: &[u8],
    recipient_id: &str,
    keypair: &EncryptionKeyPair,
    envelope: &EnvelopeEncryptedData,
) -> Result<Zeroizing<[u8; 32]>> {
    let (nonce, wrapped) = split_entry(entry)?;

    let dh = keypair.diffie_hellman(&envelope.ephemeral_public);
    let wrap_key = derive_wrap_key(&dh, envelope.network_id.as_bytes())?;

    // A present entry that fails its tag means the holder's key is not
    // the one it was wrapped for.
    let content_key = decrypt(
        &EncryptionKey::from_bytes(wrap_key),
        &nonce,
        wrapped,
        &wrap_aad(&envelope.network_id, recipient_id),
    )
    .map_err(|_| Error::RecipientNotAuthorized)?;

    let content_key: [u8; 32] = content_key
        .try_into()
        .map_err(|_| Error::DecryptionFailed("Wrapped content key has wrong length".into()))?;

    Ok(Zeroizing::new(content_key))
}

fn join_entry(nonce: &Nonce, ciphertext: &[u8]) -> Vec<u8> {
    let mut entry = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    entry.extend_from_slice(nonce.as_bytes());
    entry.extend_from_slice(ciphertext);
    entry
}

fn split_entry(entry: &[u8]) -> Result<(Nonce, &[u8])> {
    if entry.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::DecryptionFailed("Envelope entry too short".into()));
    }
    let nonce = Nonce::from_bytes(entry[..NONCE_SIZE].try_into().expect("length checked"));
    Ok((nonce, &entry[NONCE_SIZE..]))
}

// ============================================================================
// TESTS
// ============================================================================
