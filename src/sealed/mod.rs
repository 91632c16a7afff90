//! # Selective-Field Encryption
//!
//! Encrypts labeled field groups of a typed record through the envelope
//! engine, while unlabeled fields travel in plaintext.
//!
//! ## Record Shape
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    SELECTIVE-FIELD ENCRYPTION                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  struct MemberProfile {                                                │
//! │      display_name,                   // unlabeled → plaintext          │
//! │      email,     [profile:self]   ┐                                     │
//! │      phone,     [profile:self]   ┘── one group, one envelope           │
//! │      billing,   [network:admin]  ─── second group, second envelope     │
//! │  }                                                                      │
//! │                                                                         │
//! │  Fields with identical label SETS are always encrypted together,      │
//! │  never split. Each group becomes an EncryptedLabelGroup whose          │
//! │  envelope is wrapped for the network key plus every key its labels     │
//! │  resolve to.                                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual Views
//!
//! A [`Sealed<T>`] holds a record either as in-memory plaintext or as
//! its encrypted wire form, and the two views obey:
//!
//! | In memory as | Request plaintext | Request encrypted view |
//! |--------------|-------------------|------------------------|
//! | plaintext    | clone             | `CannotManufactureEncryptedView` |
//! | wire bytes   | decrypt (possibly partial) | deserialize-only |
//!
//! Partial access is expected and correct: groups the holder's resolver
//! cannot open are left at their default values, never an error for the
//! whole record.

pub mod resolver;

pub use resolver::{ChainResolver, KeyInfo, KeyScope, LabelResolver, ScopedResolver};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::crypto::envelope::{self, EnvelopeEncryptedData, EnvelopeKey, EnvelopeRecipient};
use crate::crypto::ed25519_public_to_x25519;
use crate::error::{Error, Result};
use crate::identity::NetworkId;

/// One labeled field group of a record type.
///
/// `extract` serializes the group's fields out of a record; `apply`
/// writes decrypted group bytes back into one. Both operate on the
/// bincode encoding of a group sub-record chosen by the implementor.
pub struct FieldGroup<T: ?Sized> {
    /// The group's label set (order irrelevant, duplicates forbidden)
    pub labels: &'static [&'static str],
    /// Serialize the group's fields from the record
    pub extract: fn(&T) -> Result<Vec<u8>>,
    /// Deserialize group bytes back into the record
    pub apply: fn(&mut T, &[u8]) -> Result<()>,
}

/// A record type with labeled field groups.
///
/// Implemented per type with explicit group specs; grouping is static
/// and identical label sets must be declared as a single group.
pub trait LabeledRecord: Default + Clone {
    /// The unlabeled (always-plaintext) part of the record.
    type Public: Serialize + DeserializeOwned;

    /// Extract the unlabeled fields.
    fn public_part(&self) -> Self::Public;

    /// Write unlabeled fields back into the record.
    fn apply_public(&mut self, public: Self::Public);

    /// The labeled field groups of this type.
    fn field_groups() -> Vec<FieldGroup<Self>>;
}

/// Ciphertext for one label group. Created during sealing; immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedLabelGroup {
    /// Sorted label set identifying the group
    pub labels: Vec<String>,
    /// The group's multi-recipient envelope
    pub envelope: EnvelopeEncryptedData,
}

/// The encrypted wire form of a labeled record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedRecord {
    /// Bincode of the unlabeled sub-record, plaintext
    pub public: Vec<u8>,
    /// One entry per label group
    pub groups: Vec<EncryptedLabelGroup>,
}

enum Inner<T> {
    /// Constructed in memory; no ciphertext exists for it.
    Plain(T),
    /// Deserialized from (or produced as) wire bytes.
    Encrypted(EncryptedRecord),
}

/// Dual-view holder for a selectively encrypted record.
pub struct Sealed<T> {
    inner: Inner<T>,
}

impl<T: LabeledRecord> Sealed<T> {
    /// Hold an in-memory plaintext record.
    pub fn plain(record: T) -> Self {
        Self {
            inner: Inner::Plain(record),
        }
    }

    /// Hold lazy wire bytes, deserialized but not decrypted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: EncryptedRecord = bincode::deserialize(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(Self {
            inner: Inner::Encrypted(record),
        })
    }

    /// Hold an already-encrypted record.
    pub fn from_encrypted(record: EncryptedRecord) -> Self {
        Self {
            inner: Inner::Encrypted(record),
        }
    }

    /// Encrypt `record` for `network_id`, resolving group labels
    /// through `resolver`.
    ///
    /// Every group's envelope is wrapped for the network key; labels
    /// resolving to profile- or node-scope keys add recipients. A label
    /// no resolver knows fails with `UnknownLabel`; a label set
    /// declared by two groups is a defect in the record type and fails
    /// the seal.
    pub fn seal(
        record: &T,
        network_id: &NetworkId,
        resolver: &dyn LabelResolver,
    ) -> Result<Self> {
        let network_public = ed25519_public_to_x25519(network_id.public_key())?;

        let mut seen_sets: Vec<Vec<String>> = Vec::new();
        let mut groups = Vec::new();

        for group in T::field_groups() {
            let labels = sorted_labels(group.labels);
            if seen_sets.contains(&labels) {
                return Err(Error::EncryptionFailed(format!(
                    "Label set {:?} declared by more than one field group",
                    labels
                )));
            }
            seen_sets.push(labels.clone());

            let mut recipients: Vec<EnvelopeRecipient> = Vec::new();
            for label in &labels {
                let info = resolver
                    .resolve(label)
                    .ok_or_else(|| Error::UnknownLabel(label.clone()))?;

                // The network entry is always present; network-scope
                // labels add nothing beyond it.
                if info.scope == KeyScope::Network {
                    continue;
                }
                if recipients.iter().any(|r| r.id == info.id) {
                    continue;
                }
                recipients.push(EnvelopeRecipient {
                    id: info.id,
                    public_key: info.public_key,
                });
            }

            let plaintext = (group.extract)(record)?;
            let sealed = envelope::seal(&plaintext, network_id, &network_public, &recipients, None)?;

            groups.push(EncryptedLabelGroup {
                labels,
                envelope: sealed,
            });
        }

        let public = bincode::serialize(&record.public_part())?;

        Ok(Self {
            inner: Inner::Encrypted(EncryptedRecord { public, groups }),
        })
    }

    /// Request the plaintext typed record.
    ///
    /// From a plaintext holder this is a clone. From an encrypted
    /// holder, each group the resolver can open is decrypted and
    /// applied; groups the holder cannot open stay at their defaults.
    /// Only genuine decryption failures (tampering, expired records)
    /// propagate.
    pub fn plaintext(&self, resolver: &dyn LabelResolver) -> Result<T> {
        let encrypted = match &self.inner {
            Inner::Plain(record) => return Ok(record.clone()),
            Inner::Encrypted(encrypted) => encrypted,
        };

        let mut record = T::default();
        record.apply_public(
            bincode::deserialize(&encrypted.public)
                .map_err(|e| Error::Deserialization(e.to_string()))?,
        );

        let specs = T::field_groups();
        for group in &encrypted.groups {
            let Some(spec) = specs
                .iter()
                .find(|spec| sorted_labels(spec.labels) == group.labels)
            else {
                // A group this build of the type no longer declares.
                continue;
            };

            if let Some(plaintext) = open_group(group, resolver)? {
                (spec.apply)(&mut record, &plaintext)?;
            }
        }

        Ok(record)
    }

    /// Request the encrypted record shape.
    ///
    /// Fails with `CannotManufactureEncryptedView` when the record is
    /// only held as in-memory plaintext: an encrypted form that was
    /// never produced cannot be synthesized.
    pub fn encrypted(&self) -> Result<&EncryptedRecord> {
        match &self.inner {
            Inner::Plain(_) => Err(Error::CannotManufactureEncryptedView),
            Inner::Encrypted(record) => Ok(record),
        }
    }

    /// Serialize the encrypted form for the wire.
    ///
    /// Same access rule as [`Sealed::encrypted`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self.encrypted()?)?)
    }

    /// Whether this holder carries ciphertext.
    pub fn is_encrypted(&self) -> bool {
        matches!(self.inner, Inner::Encrypted(_))
    }
}

/// Try to open one group with any label the resolver holds a key for.
///
/// Returns `Ok(None)` when the holder has no usable key for the group
/// (partial access). `RecipientNotAuthorized` from a stale resolver
/// entry counts as unusable; other failures propagate.
fn open_group(
    group: &EncryptedLabelGroup,
    resolver: &dyn LabelResolver,
) -> Result<Option<Vec<u8>>> {
    for label in &group.labels {
        let Some(info) = resolver.resolve(label) else {
            continue;
        };
        let Some(keypair) = resolver.keypair(label) else {
            continue;
        };

        let key = match info.scope {
            KeyScope::Network => EnvelopeKey::Network(keypair),
            KeyScope::Profile | KeyScope::Node => EnvelopeKey::Profile {
                id: &info.id,
                keypair,
            },
        };

        match envelope::open(&group.envelope, &key) {
            Ok(plaintext) => return Ok(Some(plaintext)),
            Err(Error::RecipientNotAuthorized) => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(None)
}

fn sorted_labels(labels: &[&str]) -> Vec<String> {
    let mut labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
    labels.sort();
    labels.dedup();
    labels
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EncryptionKeyPair, SigningKeyPair};

    /// Test record: one unlabeled field, one profile-scope group of two
    /// fields, one network-scope group.
    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct MemberProfile {
        display_name: String,
        email: String,
        phone: String,
        billing_reference: String,
    }

    #[derive(Serialize, Deserialize)]
    struct Contact {
        email: String,
        phone: String,
    }

    impl LabeledRecord for MemberProfile {
        type Public = String;

        fn public_part(&self) -> String {
            self.display_name.clone()
        }

        fn apply_public(&mut self, public: String) {
            self.display_name = public;
        }

        fn field_groups() -> Vec<FieldGroup<Self>> {
            vec![
                FieldGroup {
                    labels: &["profile:self"],
                    extract: |record| {
                        Ok(bincode::serialize(&Contact {
                            email: record.email.clone(),
                            phone: record.phone.clone(),
                        })?)
                    },
                    apply: |record, bytes| {
                        let contact: Contact = bincode::deserialize(bytes)?;
                        record.email = contact.email;
                        record.phone = contact.phone;
                        Ok(())
                    },
                },
                FieldGroup {
                    labels: &["network:billing"],
                    extract: |record| Ok(bincode::serialize(&record.billing_reference)?),
                    apply: |record, bytes| {
                        record.billing_reference = bincode::deserialize(bytes)?;
                        Ok(())
                    },
                },
            ]
        }
    }

    struct TestContext {
        network_id: NetworkId,
        network_key: SigningKeyPair,
        profile_key: EncryptionKeyPair,
    }

    fn setup() -> TestContext {
        let network_key = SigningKeyPair::generate();
        TestContext {
            network_id: NetworkId::from_public_key(&network_key.public_bytes()),
            network_key,
            profile_key: EncryptionKeyPair::generate(),
        }
    }

    fn sample() -> MemberProfile {
        MemberProfile {
            display_name: "Alice".into(),
            email: "alice@example.com".into(),
            phone: "+1 555 0100".into(),
            billing_reference: "inv-2041".into(),
        }
    }

    /// Resolver used when sealing: public keys only.
    fn seal_resolver(ctx: &TestContext) -> ChainResolver {
        let mut profiles = ScopedResolver::profile();
        profiles.insert_public("profile:self", "profile-1", ctx.profile_key.public_bytes());

        let mut networks = ScopedResolver::network();
        networks.insert_public(
            "network:billing",
            ctx.network_id.to_base64(),
            ed25519_public_to_x25519(ctx.network_id.public_key()).unwrap(),
        );

        ChainResolver::new().push(profiles).push(networks)
    }

    /// Resolver for a holder owning the profile key only.
    fn profile_holder(ctx: &TestContext) -> ChainResolver {
        let mut profiles = ScopedResolver::profile();
        profiles.insert_keypair(
            "profile:self",
            "profile-1",
            EncryptionKeyPair::from_bytes(&ctx.profile_key.secret_bytes()),
        );
        ChainResolver::new().push(profiles)
    }

    /// Resolver for a holder owning the network key only.
    fn network_holder(ctx: &TestContext) -> ChainResolver {
        let mut networks = ScopedResolver::network();
        networks.insert_keypair(
            "network:billing",
            ctx.network_id.to_base64(),
            ctx.network_key.to_x25519(),
        );
        ChainResolver::new().push(networks)
    }

    #[test]
    fn test_plaintext_holder_returns_plaintext() {
        let record = sample();
        let sealed = Sealed::plain(record.clone());

        let resolver = ChainResolver::new();
        assert_eq!(sealed.plaintext(&resolver).unwrap(), record);
    }

    #[test]
    fn test_plaintext_holder_cannot_manufacture_encrypted_view() {
        let sealed = Sealed::plain(sample());

        assert!(matches!(
            sealed.encrypted(),
            Err(Error::CannotManufactureEncryptedView)
        ));
        assert!(matches!(
            sealed.to_bytes(),
            Err(Error::CannotManufactureEncryptedView)
        ));
    }

    #[test]
    fn test_lazy_bytes_decrypt_full_access() {
        let ctx = setup();
        let record = sample();

        let sealed = Sealed::seal(&record, &ctx.network_id, &seal_resolver(&ctx)).unwrap();
        let bytes = sealed.to_bytes().unwrap();

        // Holder with both keys recovers everything.
        let holder = ChainResolver::new()
            .push(profile_holder(&ctx))
            .push(network_holder(&ctx));
        let lazy = Sealed::<MemberProfile>::from_bytes(&bytes).unwrap();
        let decrypted = lazy.plaintext(&holder).unwrap();

        assert_eq!(decrypted, record);
    }

    #[test]
    fn test_lazy_bytes_partial_access_leaves_defaults() {
        let ctx = setup();
        let record = sample();

        let sealed = Sealed::seal(&record, &ctx.network_id, &seal_resolver(&ctx)).unwrap();
        let bytes = sealed.to_bytes().unwrap();

        // Profile holder: contact group opens, billing stays default.
        let lazy = Sealed::<MemberProfile>::from_bytes(&bytes).unwrap();
        let partial = lazy.plaintext(&profile_holder(&ctx)).unwrap();

        assert_eq!(partial.display_name, record.display_name);
        assert_eq!(partial.email, record.email);
        assert_eq!(partial.phone, record.phone);
        assert_eq!(partial.billing_reference, String::default());

        // Network holder: billing opens, contact stays default.
        let partial = lazy.plaintext(&network_holder(&ctx)).unwrap();
        assert_eq!(partial.billing_reference, record.billing_reference);
        assert_eq!(partial.email, String::default());
    }

    #[test]
    fn test_lazy_bytes_encrypted_view_is_deserialize_only() {
        let ctx = setup();

        let sealed = Sealed::seal(&sample(), &ctx.network_id, &seal_resolver(&ctx)).unwrap();
        let bytes = sealed.to_bytes().unwrap();

        // No keys needed to get the encrypted shape back.
        let lazy = Sealed::<MemberProfile>::from_bytes(&bytes).unwrap();
        let encrypted = lazy.encrypted().unwrap();

        assert_eq!(encrypted.groups.len(), 2);
        assert_eq!(encrypted, sealed.encrypted().unwrap());
    }

    #[test]
    fn test_groups_keyed_by_sorted_label_set() {
        let ctx = setup();

        let sealed = Sealed::seal(&sample(), &ctx.network_id, &seal_resolver(&ctx)).unwrap();
        let encrypted = sealed.encrypted().unwrap();

        let label_sets: Vec<&Vec<String>> =
            encrypted.groups.iter().map(|g| &g.labels).collect();
        assert!(label_sets.contains(&&vec!["profile:self".to_string()]));
        assert!(label_sets.contains(&&vec!["network:billing".to_string()]));
    }

    #[test]
    fn test_seal_with_unknown_label_fails() {
        let ctx = setup();

        // Resolver that only knows the profile label.
        let mut profiles = ScopedResolver::profile();
        profiles.insert_public("profile:self", "profile-1", ctx.profile_key.public_bytes());
        let resolver = ChainResolver::new().push(profiles);

        let result = Sealed::seal(&sample(), &ctx.network_id, &resolver);
        assert!(matches!(result, Err(Error::UnknownLabel(l)) if l == "network:billing"));
    }

    #[test]
    fn test_duplicate_label_set_rejected() {
        #[derive(Debug, Default, Clone, Serialize, Deserialize)]
        struct BadRecord {
            a: u32,
            b: u32,
        }

        impl LabeledRecord for BadRecord {
            type Public = ();

            fn public_part(&self) {}

            fn apply_public(&mut self, _: ()) {}

            fn field_groups() -> Vec<FieldGroup<Self>> {
                vec![
                    FieldGroup {
                        labels: &["profile:self"],
                        extract: |r| Ok(bincode::serialize(&r.a)?),
                        apply: |r, b| {
                            r.a = bincode::deserialize(b)?;
                            Ok(())
                        },
                    },
                    FieldGroup {
                        labels: &["profile:self"],
                        extract: |r| Ok(bincode::serialize(&r.b)?),
                        apply: |r, b| {
                            r.b = bincode::deserialize(b)?;
                            Ok(())
                        },
                    },
                ]
            }
        }

        let ctx = setup();
        let mut profiles = ScopedResolver::profile();
        profiles.insert_public("profile:self", "profile-1", ctx.profile_key.public_bytes());
        let resolver = ChainResolver::new().push(profiles);

        let result = Sealed::seal(&BadRecord::default(), &ctx.network_id, &resolver);
        assert!(matches!(result, Err(Error::EncryptionFailed(_))));
    }

    #[test]
    fn test_wire_round_trip_preserves_groups() {
        let ctx = setup();

        let sealed = Sealed::seal(&sample(), &ctx.network_id, &seal_resolver(&ctx)).unwrap();
        let bytes = sealed.to_bytes().unwrap();
        let restored = Sealed::<MemberProfile>::from_bytes(&bytes).unwrap();

        assert_eq!(restored.encrypted().unwrap(), sealed.encrypted().unwrap());
    }
}
