//! # Root Key and Backup Phrase
//!
//! The root key is the master secret of a user or administrator: a
//! 32-byte seed from which every Profile, Network, and Node key is
//! derived. It is generated once, on first run, and leaves the device
//! only as a BIP39 backup phrase.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ROOT KEY LIFECYCLE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  First run:   256 bits entropy ──► RootKey + 24-word backup phrase     │
//! │                                                                         │
//! │  Backup:      phrase ──► PBKDF2-HMAC-SHA512 ──► identical root seed    │
//! │               (the phrase is shown once and never stored)              │
//! │                                                                         │
//! │  Wipe:        explicit destruction only; the seed zeroizes on drop     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bip39::Mnemonic;
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::crypto::{derive_path, DerivationPath, KeyPair};
use crate::error::{Error, Result};

/// Number of words in a backup phrase (256 bits of entropy)
pub const WORD_COUNT: usize = 24;

/// Entropy size in bytes for 24 words
const ENTROPY_BYTES: usize = 32;

/// The master secret of an identity.
///
/// ## Security
///
/// - Never transmitted; exported only through [`RootKey::backup_phrase`]
/// - Zeroized when dropped
#[derive(ZeroizeOnDrop)]
pub struct RootKey {
    seed: [u8; 32],
    #[zeroize(skip)] // bip39::Mnemonic does not implement Zeroize
    mnemonic: Mnemonic,
}

impl RootKey {
    /// Generate a fresh root key from OS randomness.
    pub fn generate() -> Result<Self> {
        let mut entropy = [0u8; ENTROPY_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut entropy);

        let mnemonic = Mnemonic::from_entropy(&entropy).map_err(|e| {
            Error::KeyDerivationFailed(format!("Failed to generate mnemonic: {}", e))
        })?;

        Ok(Self::from_mnemonic(mnemonic))
    }

    /// Restore a root key from a backup phrase.
    ///
    /// ## Validation
    ///
    /// - Must be exactly 24 words from the BIP39 English wordlist
    /// - Checksum must be valid
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_normalized(phrase)
            .map_err(|e| Error::InvalidRecoveryPhrase(e.to_string()))?;

        if mnemonic.word_count() != WORD_COUNT {
            return Err(Error::InvalidRecoveryPhrase(format!(
                "Expected {} words, got {}",
                WORD_COUNT,
                mnemonic.word_count()
            )));
        }

        Ok(Self::from_mnemonic(mnemonic))
    }

    fn from_mnemonic(mnemonic: Mnemonic) -> Self {
        // BIP39 seed derivation yields 64 bytes; the root seed is the
        // first half.
        let full_seed = mnemonic.to_seed("");
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&full_seed[..32]);

        Self { seed, mnemonic }
    }

    /// The backup phrase for this root key.
    ///
    /// ## Security Warning
    ///
    /// Show once, never log, never store digitally.
    pub fn backup_phrase(&self) -> String {
        self.mnemonic.words().collect::<Vec<_>>().join(" ")
    }

    /// Derive the keypair at `path`. Pure; see [`crate::crypto::hd`].
    pub fn derive(&self, path: &DerivationPath) -> Result<KeyPair> {
        derive_path(&self.seed, path)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyClass;

    #[test]
    fn test_generate_produces_24_words() {
        let root = RootKey::generate().unwrap();
        assert_eq!(root.backup_phrase().split_whitespace().count(), WORD_COUNT);
    }

    #[test]
    fn test_phrase_round_trip_restores_phrase() {
        let root = RootKey::generate().unwrap();
        let restored = RootKey::from_phrase(&root.backup_phrase()).unwrap();

        assert_eq!(root.backup_phrase(), restored.backup_phrase());
    }

    #[test]
    fn test_restored_root_derives_same_keys() {
        let root = RootKey::generate().unwrap();
        let restored = RootKey::from_phrase(&root.backup_phrase()).unwrap();

        let path = DerivationPath::new(KeyClass::Network, 0).unwrap();
        let original = root.derive(&path).unwrap();
        let rederived = restored.derive(&path).unwrap();

        assert_eq!(
            original.signing.public_bytes(),
            rederived.signing.public_bytes()
        );
    }

    #[test]
    fn test_invalid_phrase_rejected() {
        assert!(RootKey::from_phrase("not a valid phrase").is_err());
    }

    #[test]
    fn test_wrong_word_count_rejected() {
        // Valid 12-word mnemonic, but this hierarchy requires 24 words.
        let twelve = "abandon abandon abandon abandon abandon abandon \
                      abandon abandon abandon abandon abandon about";
        let result = RootKey::from_phrase(twelve);
        assert!(matches!(result, Err(Error::InvalidRecoveryPhrase(_))));
    }
}
