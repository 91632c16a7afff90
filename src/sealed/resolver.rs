//! # Label Resolution
//!
//! Maps field labels to key material. Resolution is a capability
//! interface: a resolver answers `resolve`/`can_resolve` for labels it
//! knows, and hands out the matching secret keypair when the holder
//! actually possesses it. Dispatch is explicit (trait objects over
//! scope-specific resolvers); there is no reflection.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        LABEL RESOLUTION                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  "profile:self"    ──► ScopedResolver(Profile) ──► profile X25519 key  │
//! │  "network:members" ──► ScopedResolver(Network) ──► network X25519 key  │
//! │  "node:local"      ──► ScopedResolver(Node)    ──► node X25519 key     │
//! │                                                                         │
//! │  ChainResolver tries each inner resolver in order; the encrypting      │
//! │  side only needs public keys, the decrypting side also holds the       │
//! │  secret half for the labels it can open.                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use crate::crypto::EncryptionKeyPair;

/// Which key class a label resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// Profile-scope: entry per profile id in the envelope recipient map
    Profile,
    /// Network-scope: the envelope's always-present network entry
    Network,
    /// Node-scope: entry per node id in the envelope recipient map
    Node,
}

/// Resolved key material for one label.
#[derive(Debug, Clone)]
pub struct KeyInfo {
    /// Scope of the resolved key
    pub scope: KeyScope,
    /// Recipient id the envelope entry is keyed under
    pub id: String,
    /// X25519 public key to wrap the content key for
    pub public_key: [u8; 32],
}

/// Pluggable label-to-key resolution.
pub trait LabelResolver {
    /// Resolve a label to its key info, if this resolver knows it.
    fn resolve(&self, label: &str) -> Option<KeyInfo>;

    /// Whether this resolver knows the label at all.
    fn can_resolve(&self, label: &str) -> bool {
        self.resolve(label).is_some()
    }

    /// The secret keypair for a label, when the holder possesses it.
    ///
    /// Encrypt-only resolvers (public keys of other parties) return
    /// `None`; the sealed layer then leaves those groups at defaults
    /// when decrypting.
    fn keypair(&self, label: &str) -> Option<&EncryptionKeyPair>;
}

struct ResolverEntry {
    id: String,
    public_key: [u8; 32],
    keypair: Option<EncryptionKeyPair>,
}

/// A map-backed resolver for one key scope.
pub struct ScopedResolver {
    scope: KeyScope,
    entries: HashMap<String, ResolverEntry>,
}

impl ScopedResolver {
    /// Profile-scope resolver
    pub fn profile() -> Self {
        Self::new(KeyScope::Profile)
    }

    /// Network-scope resolver
    pub fn network() -> Self {
        Self::new(KeyScope::Network)
    }

    /// Node-scope resolver
    pub fn node() -> Self {
        Self::new(KeyScope::Node)
    }

    fn new(scope: KeyScope) -> Self {
        Self {
            scope,
            entries: HashMap::new(),
        }
    }

    /// Register a label resolving to a public key only (encrypt side).
    pub fn insert_public(&mut self, label: impl Into<String>, id: impl Into<String>, public_key: [u8; 32]) {
        self.entries.insert(
            label.into(),
            ResolverEntry {
                id: id.into(),
                public_key,
                keypair: None,
            },
        );
    }

    /// Register a label resolving to a held keypair (decrypt side).
    pub fn insert_keypair(
        &mut self,
        label: impl Into<String>,
        id: impl Into<String>,
        keypair: EncryptionKeyPair,
    ) {
        let public_key = keypair.public_bytes();
        self.entries.insert(
            label.into(),
            ResolverEntry {
                id: id.into(),
                public_key,
                keypair: Some(keypair),
            },
        );
    }
}

impl LabelResolver for ScopedResolver {
    fn resolve(&self, label: &str) -> Option<KeyInfo> {
        self.entries.get(label).map(|entry| KeyInfo {
            scope: self.scope,
            id: entry.id.clone(),
            public_key: entry.public_key,
        })
    }

    fn keypair(&self, label: &str) -> Option<&EncryptionKeyPair> {
        self.entries.get(label)?.keypair.as_ref()
    }
}

/// Tries a sequence of resolvers in order; first match wins.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<Box<dyn LabelResolver + Send + Sync>>,
}

impl ChainResolver {
    /// An empty chain (resolves nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver to the chain.
    pub fn push(mut self, resolver: impl LabelResolver + Send + Sync + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

impl LabelResolver for ChainResolver {
    fn resolve(&self, label: &str) -> Option<KeyInfo> {
        self.resolvers.iter().find_map(|r| r.resolve(label))
    }

    fn keypair(&self, label: &str) -> Option<&EncryptionKeyPair> {
        self.resolvers.iter().find_map(|r| r.keypair(label))
    }
}

// ============================================================================
// TESTS
// ============================================================================
