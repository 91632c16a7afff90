//! # Error Handling
//!
//! This module provides the error types for Weft Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Key Derivation Errors                                             │
//! │  │   ├── InvalidDerivationPath  - Bad path syntax or index overflow    │
//! │  │   ├── KeyDerivationFailed    - HKDF expansion failed                │
//! │  │   └── InvalidKey             - Invalid key format/length            │
//! │  │                                                                      │
//! │  ├── Token Errors                                                      │
//! │  │   ├── SignatureVerificationFailed - Token/message signature invalid │
//! │  │   ├── TokenExpired           - Token expiration is in the past      │
//! │  │   └── PeerIdMismatch         - Token bound to a different peer      │
//! │  │                                                                      │
//! │  ├── Envelope / Sealed-Record Errors                                   │
//! │  │   ├── EncryptionFailed       - AEAD encryption failed               │
//! │  │   ├── DecryptionFailed       - AEAD decryption / malformed data     │
//! │  │   ├── RecipientNotAuthorized - Holder is not a recipient            │
//! │  │   ├── RecordExpired          - Per-record TTL has elapsed           │
//! │  │   ├── CannotManufactureEncryptedView - No ciphertext was produced   │
//! │  │   └── UnknownLabel           - No resolver for a field label        │
//! │  │                                                                      │
//! │  ├── Epoch Errors                                                      │
//! │  │   └── EpochOutOfWindow       - Epoch outside the retention window   │
//! │  │                                                                      │
//! │  ├── Discovery Errors                                                  │
//! │  │   ├── MalformedDiscoveryMessage - Undecodable datagram              │
//! │  │   ├── StaleTimestamp         - Outside the freshness window         │
//! │  │   ├── UnknownNetwork         - Network not known locally            │
//! │  │   └── Transport              - Socket / collaborator failure        │
//! │  │                                                                      │
//! │  └── Storage / Serialization Errors                                    │
//! │      ├── StorageRead / StorageWrite / StorageNotFound                  │
//! │      └── Serialization / Deserialization                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation Policy
//!
//! Cryptographic verification failures (signature, expiry, recipient) are
//! terminal for the message or token that produced them and are never
//! retried. Parsing and transport errors on the discovery path are
//! recovered locally (log + discard); the protocol is self-healing via
//! periodic re-announcement. `is_recoverable` encodes the distinction.

use thiserror::Error;

/// Result type alias for Weft Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Weft Core
///
/// All errors are categorized by module/domain to make error handling
/// clearer and to provide meaningful error messages to callers.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Key Derivation Errors
    // ========================================================================

    /// Derivation path has invalid syntax or an out-of-range index
    #[error("Invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid recovery phrase
    #[error("Invalid recovery phrase: {0}")]
    InvalidRecoveryPhrase(String),

    // ========================================================================
    // Token Errors
    // ========================================================================

    /// Signature did not verify under the expected public key
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Token expiration is in the past
    #[error("Access token expired at {expired_at} (now {now})")]
    TokenExpired {
        /// Expiration carried by the token (Unix seconds)
        expired_at: i64,
        /// Verification-time clock (Unix seconds)
        now: i64,
    },

    /// Token is bound to a different peer than the presenting one
    #[error("Access token peer id does not match the presenting peer")]
    PeerIdMismatch,

    // ========================================================================
    // Envelope / Sealed-Record Errors
    // ========================================================================

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed or ciphertext is malformed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// The holder's key is not among the envelope's recipients
    #[error("Recipient not authorized for this envelope")]
    RecipientNotAuthorized,

    /// The record's TTL elapsed before decryption
    #[error("Record expired at {0}")]
    RecordExpired(i64),

    /// An encrypted view was requested from a plaintext-only payload
    #[error("Cannot manufacture an encrypted view: record was never encrypted")]
    CannotManufactureEncryptedView,

    /// No resolver recognizes a field label
    #[error("Unknown field label: {0}")]
    UnknownLabel(String),

    // ========================================================================
    // Epoch Errors
    // ========================================================================

    /// Epoch is outside the retention window
    #[error("Epoch {requested} outside retention window (current {current}, retain {retain})")]
    EpochOutOfWindow {
        /// Epoch the caller asked for
        requested: u64,
        /// Current epoch of the network
        current: u64,
        /// Number of epochs retained
        retain: u64,
    },

    // ========================================================================
    // Discovery Errors
    // ========================================================================

    /// Datagram could not be decoded as a discovery message
    #[error("Malformed discovery message: {0}")]
    MalformedDiscoveryMessage(String),

    /// Message timestamp is outside the freshness window
    #[error("Stale discovery timestamp: {age}s outside a {window}s window")]
    StaleTimestamp {
        /// Seconds the message is behind (positive) or ahead (negative)
        age: i64,
        /// Configured freshness window in seconds
        window: i64,
    },

    /// Network id is not known locally
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    /// Socket or transport collaborator failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service lifecycle misuse (double start, not running)
    #[error("Service error: {0}")]
    Service(String),

    // ========================================================================
    // Storage / Serialization Errors
    // ========================================================================

    /// Failed to read from the key store
    #[error("Failed to read from key store: {0}")]
    StorageRead(String),

    /// Failed to write to the key store
    #[error("Failed to write to key store: {0}")]
    StorageWrite(String),

    /// Item not found in the key store
    #[error("Key store item not found: {0}")]
    StorageNotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Check if this error is recoverable on the discovery path.
    ///
    /// Recoverable errors are logged and the offending datagram is
    /// discarded; the sender's next announcement gets a fresh chance.
    /// Everything else propagates to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedDiscoveryMessage(_)
                | Error::StaleTimestamp { .. }
                | Error::SignatureVerificationFailed
                | Error::TokenExpired { .. }
                | Error::PeerIdMismatch
                | Error::UnknownNetwork(_)
                | Error::Transport(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::MalformedDiscoveryMessage("bad json".into()).is_recoverable());
        assert!(Error::StaleTimestamp { age: 120, window: 60 }.is_recoverable());
        assert!(Error::SignatureVerificationFailed.is_recoverable());

        assert!(!Error::InvalidDerivationPath("m/x".into()).is_recoverable());
        assert!(!Error::RecipientNotAuthorized.is_recoverable());
        assert!(!Error::CannotManufactureEncryptedView.is_recoverable());
    }

    #[test]
    fn test_error_display_mentions_context() {
        let err = Error::TokenExpired { expired_at: 100, now: 200 };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("200"));
    }
}
