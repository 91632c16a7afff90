//! # Weft Core
//!
//! Cryptographic identity, key management, and LAN peer discovery for
//! the Weft mesh network.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          WEFT CORE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐                                                       │
//! │  │   crypto    │  HD derivation (m/44'/0'/class'/index'),              │
//! │  │             │  Ed25519 ↔ X25519, AEAD, envelope encryption          │
//! │  └──────┬──────┘                                                       │
//! │         │                                                               │
//! │    ┌────┴─────┬──────────────┬─────────────┐                           │
//! │    ▼          ▼              ▼             ▼                           │
//! │  ┌────────┐ ┌────────┐  ┌─────────┐  ┌──────────┐                     │
//! │  │identity│ │ token  │  │ sealed  │  │  epoch   │                     │
//! │  │        │ │        │  │         │  │          │                     │
//! │  │ root + │ │ issue/ │  │ labeled │  │ rotation │                     │
//! │  │ ids    │ │ verify │  │ fields  │  │ counters │                     │
//! │  └───┬────┘ └───┬────┘  └─────────┘  └──────────┘                     │
//! │      │          │                                                      │
//! │      ▼          ▼                                                      │
//! │  ┌──────────────────────┐      ┌──────────────────────┐               │
//! │  │      discovery       │ ───► │  Transport (external │               │
//! │  │  UDP multicast +     │      │  collaborator)       │               │
//! │  │  token admission     │      └──────────────────────┘               │
//! │  └──────────────────────┘                                              │
//! │                                                                         │
//! │  keystore: Node-class keys encrypted at rest (LocalCipher seam)        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Key derivation, signatures, AEAD, envelope encryption
//! - [`identity`] - Root key, derived-key cache, public identifiers
//! - [`token`] - Signed access tokens (capability grants)
//! - [`sealed`] - Selective-field encryption with pluggable label resolution
//! - [`epoch`] - Per-network rotation counters for system traffic keys
//! - [`discovery`] - UDP-multicast presence with token-validated admission
//! - [`keystore`] - Encrypted-at-rest storage for Node-class keys
//!
//! ## Security Model
//!
//! Everything chains off one 32-byte root seed: key derivation is pure,
//! so a backup phrase restores the complete hierarchy. Networks admit
//! peers by verifying access tokens signed with the network key;
//! revocation is an expiry or an epoch bump. Payload confidentiality is
//! envelope encryption (one content key, wrapped per recipient), with
//! field-level access control layered on top by the sealed module.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod crypto;
pub mod discovery;
pub mod epoch;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod sealed;
pub mod token;
/// Clock utilities shared by token expiry, replay checks, and TTLs.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use crypto::{DerivationPath, EnvelopeEncryptedData, KeyClass, KeyPair, PublicKey};
pub use discovery::{DiscoveryConfig, DiscoveryEvent, DiscoveryService, PeerRecord};
pub use epoch::EpochManager;
pub use error::{Error, Result};
pub use identity::{Identity, NetworkId, PeerId, ProfileId, RootKey};
pub use sealed::{LabelResolver, LabeledRecord, Sealed};
pub use token::AccessToken;
