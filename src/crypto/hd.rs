//! # Hierarchical Key Derivation
//!
//! Deterministic derivation of class/index keypairs from a root seed.
//!
//! ## Path Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DERIVATION PATH LAYOUT                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   m / 44' / 0' / <class>' / <index>'                                   │
//! │       │     │       │          │                                        │
//! │       │     │       │          └─ Key index within the class           │
//! │       │     │       └─ Key class: 0=Profile, 1=Network, 2=Node         │
//! │       │     └─ Coin type (fixed)                                       │
//! │       └─ Purpose (fixed)                                               │
//! │                                                                         │
//! │   All components are hardened (trailing '), indices < 2^31.            │
//! │                                                                         │
//! │   Examples:                                                            │
//! │     m/44'/0'/0'/0'   first profile key                                 │
//! │     m/44'/0'/1'/3'   fourth network key                                │
//! │     m/44'/0'/2'/0'   first node key                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Derivation is pure: the same root seed and path always produce the
//! same keypair, across calls and process restarts. Invalid path syntax
//! or an index at or above 2^31 fails with `InvalidDerivationPath`;
//! there is no silent fallback.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::kdf::derive_child_seed;
use crate::crypto::KeyPair;
use crate::error::{Error, Result};

/// Fixed purpose component (`44'`)
pub const PURPOSE: u32 = 44;

/// Fixed coin-type component (`0'`)
pub const COIN_TYPE: u32 = 0;

/// Hardened indices occupy [0, 2^31)
const HARDENED_LIMIT: u32 = 1 << 31;

/// The class of a derived key, the third path component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyClass {
    /// Profile keys: user-facing identities, envelope recipients
    Profile,
    /// Network keys: network identity, token issuance, epoch signing
    Network,
    /// Node keys: per-device identities, persisted encrypted at rest
    Node,
}

impl KeyClass {
    /// The path component value for this class
    pub fn index(self) -> u32 {
        match self {
            KeyClass::Profile => 0,
            KeyClass::Network => 1,
            KeyClass::Node => 2,
        }
    }

    /// Map a path component value back to a class
    pub fn from_index(value: u32) -> Result<Self> {
        match value {
            0 => Ok(KeyClass::Profile),
            1 => Ok(KeyClass::Network),
            2 => Ok(KeyClass::Node),
            other => Err(Error::InvalidDerivationPath(format!(
                "Unknown key class {}",
                other
            ))),
        }
    }
}

/// A hardened derivation path `m/44'/0'/<class>'/<index>'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    /// Key class (third component)
    pub class: KeyClass,
    /// Key index (fourth component)
    pub index: u32,
}

impl DerivationPath {
    /// Build a path from class and index.
    ///
    /// Fails with `InvalidDerivationPath` if the index is outside the
    /// hardened range.
    pub fn new(class: KeyClass, index: u32) -> Result<Self> {
        if index >= HARDENED_LIMIT {
            return Err(Error::InvalidDerivationPath(format!(
                "Index {} exceeds hardened limit 2^31",
                index
            )));
        }
        Ok(Self { class, index })
    }

    /// The four hardened components in derivation order.
    pub fn components(&self) -> [u32; 4] {
        [PURPOSE, COIN_TYPE, self.class.index(), self.index]
    }

    /// Parse a path string.
    ///
    /// ## Validation
    ///
    /// - Must start with `m/`
    /// - Exactly four components after `m`
    /// - Every component hardened (trailing `'`)
    /// - Purpose and coin type must be `44'` and `0'`
    /// - Class must be a known class, index < 2^31
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split('/');

        if parts.next() != Some("m") {
            return Err(Error::InvalidDerivationPath(format!(
                "Path must start with 'm/': {}",
                s
            )));
        }

        let components: Vec<u32> = parts
            .map(parse_hardened_component)
            .collect::<Result<_>>()?;

        if components.len() != 4 {
            return Err(Error::InvalidDerivationPath(format!(
                "Expected 4 components after 'm', got {}",
                components.len()
            )));
        }

        if components[0] != PURPOSE || components[1] != COIN_TYPE {
            return Err(Error::InvalidDerivationPath(format!(
                "Path must be under m/{}'/{}'",
                PURPOSE, COIN_TYPE
            )));
        }

        let class = KeyClass::from_index(components[2])?;
        Self::new(class, components[3])
    }
}

/// Parse one `N'` component, rejecting soft (non-hardened) components
/// and indices at or above 2^31.
fn parse_hardened_component(component: &str) -> Result<u32> {
    let digits = component.strip_suffix('\'').ok_or_else(|| {
        Error::InvalidDerivationPath(format!(
            "Component '{}' is not hardened",
            component
        ))
    })?;

    // u32 parsing alone would accept values in [2^31, 2^32); the
    // hardened index space is only half that.
    let value: u32 = digits.parse().map_err(|_| {
        Error::InvalidDerivationPath(format!("Component '{}' is not a number", component))
    })?;

    if value >= HARDENED_LIMIT {
        return Err(Error::InvalidDerivationPath(format!(
            "Component {} exceeds hardened limit 2^31",
            value
        )));
    }

    Ok(value)
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m/{}'/{}'/{}'/{}'",
            PURPOSE,
            COIN_TYPE,
            self.class.index(),
            self.index
        )
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Derive the keypair at `path` from a 32-byte root seed.
///
/// Chains one hardened child-seed derivation per path component, then
/// splits the leaf seed into signing and encryption keys. Pure and
/// side-effect-free.
pub fn derive_path(root_seed: &[u8; 32], path: &DerivationPath) -> Result<KeyPair> {
    let mut seed = *root_seed;
    for component in path.components() {
        seed = derive_child_seed(&seed, component)?;
    }
    KeyPair::from_seed(&seed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display_parse_round_trip() {
        let path = DerivationPath::new(KeyClass::Network, 3).unwrap();
        assert_eq!(path.to_string(), "m/44'/0'/1'/3'");

        let parsed = DerivationPath::parse(&path.to_string()).unwrap();
        assert_eq!(parsed, path);
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        let cases = [
            "44'/0'/0'/0'",      // missing m
            "m/44'/0'/0'",       // too few components
            "m/44'/0'/0'/0'/0'", // too many components
            "m/44'/0'/0/0'",     // non-hardened class
            "m/44'/0'/0'/1",     // non-hardened index
            "m/43'/0'/0'/0'",    // wrong purpose
            "m/44'/1'/0'/0'",    // wrong coin type
            "m/44'/0'/9'/0'",    // unknown class
            "m/44'/0'/0'/x'",    // non-numeric index
            "m/44'/0'/0'/2147483648'", // index at 2^31
        ];

        for case in cases {
            assert!(
                matches!(
                    DerivationPath::parse(case),
                    Err(Error::InvalidDerivationPath(_))
                ),
                "expected InvalidDerivationPath for {:?}",
                case
            );
        }
    }

    #[test]
    fn test_new_rejects_index_overflow() {
        let result = DerivationPath::new(KeyClass::Profile, 1 << 31);
        assert!(matches!(result, Err(Error::InvalidDerivationPath(_))));
    }

    #[test]
    fn test_derive_path_deterministic() {
        let seed = [13u8; 32];
        let path = DerivationPath::new(KeyClass::Profile, 0).unwrap();

        let kp1 = derive_path(&seed, &path).unwrap();
        let kp2 = derive_path(&seed, &path).unwrap();

        assert_eq!(kp1.signing.public_bytes(), kp2.signing.public_bytes());
        assert_eq!(kp1.encryption.public_bytes(), kp2.encryption.public_bytes());
    }

    #[test]
    fn test_derive_path_distinct_across_class_and_index() {
        let seed = [13u8; 32];

        let profile0 = derive_path(&seed, &DerivationPath::new(KeyClass::Profile, 0).unwrap()).unwrap();
        let profile1 = derive_path(&seed, &DerivationPath::new(KeyClass::Profile, 1).unwrap()).unwrap();
        let network0 = derive_path(&seed, &DerivationPath::new(KeyClass::Network, 0).unwrap()).unwrap();

        assert_ne!(profile0.signing.public_bytes(), profile1.signing.public_bytes());
        assert_ne!(profile0.signing.public_bytes(), network0.signing.public_bytes());
    }

    #[test]
    fn test_derive_path_distinct_across_seeds() {
        let path = DerivationPath::new(KeyClass::Node, 0).unwrap();

        let a = derive_path(&[1u8; 32], &path).unwrap();
        let b = derive_path(&[2u8; 32], &path).unwrap();

        assert_ne!(a.signing.public_bytes(), b.signing.public_bytes());
    }

    #[test]
    fn test_path_serde_round_trip() {
        let path = DerivationPath::new(KeyClass::Node, 7).unwrap();

        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"m/44'/0'/2'/7'\"");

        let restored: DerivationPath = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, path);
    }
}
