//! # Cryptography Module
//!
//! Cryptographic primitives for the Weft core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Root Seed (32 bytes)                                                  │
//! │        │                                                                │
//! │        ▼  hd: m/44'/0'/<class>'/<index>'  (chained HKDF)               │
//! │  Derived KeyPair per path                                              │
//! │        │                                                                │
//! │        ├── SigningKeyPair (Ed25519)                                    │
//! │        │     • access tokens, epoch announcements                      │
//! │        │     • to_x25519() conversion for DH                           │
//! │        │                                                                │
//! │        └── EncryptionKeyPair (X25519)                                  │
//! │              • envelope recipients, traffic keys                       │
//! │                                                                         │
//! │  Envelope: one content key, AES-256-GCM payload, per-recipient         │
//! │  ephemeral-static DH wraps (network key + N profile keys).             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Why |
//! |-----------|---------|-----|
//! | Ed25519 | Signing | Fast, small keys, widely audited |
//! | X25519 | Key exchange | Same curve as Ed25519, convertible |
//! | AES-256-GCM | Encryption | Hardware acceleration, AEAD |
//! | HKDF-SHA256 | Key derivation | Industry standard, well-analyzed |
//!
//! Secret keys are zeroized on drop; randomness comes from `OsRng`
//! only; nonces are unique per encryption.

mod encryption;
pub mod envelope;
pub mod hd;
mod kdf;
mod keys;
mod signing;

pub use encryption::{decrypt, encrypt, EncryptionKey, Nonce, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use envelope::{
    open as open_envelope, seal as seal_envelope, EnvelopeEncryptedData, EnvelopeKey,
    EnvelopeRecipient, ENVELOPE_VERSION,
};
pub use hd::{derive_path, DerivationPath, KeyClass};
pub use kdf::{
    compute_key_fingerprint, derive_child_seed, derive_keys_from_seed, derive_storage_key,
    derive_traffic_key, derive_wrap_key, DerivedKeys,
};
pub use keys::{
    ed25519_public_to_x25519, EncryptionKeyPair, KeyPair, PublicKey, SigningKeyPair,
};
pub use signing::{sign, verify, Signature, Signed, SIGNATURE_SIZE};
