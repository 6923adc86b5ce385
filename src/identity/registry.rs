//! Deduplicating identity registries
//!
//! A registry is an append-only, insertion-ordered sequence of
//! descriptors of one variant, deduplicated by the variant's semantic
//! profile comparison (never by id). Resolving an already-known
//! descriptor returns the registered id; resolving a new one appends it.

use super::{ConfigId, MachineIdentity, SoftwareIdentity};
use tracing::debug;

/// A descriptor variant that can live in an [`IdentityRegistry`]
pub trait IdentityDescriptor {
    fn id(&self) -> &ConfigId;

    /// Semantic equality for deduplication (ignores the id and any
    /// identifying-only facts)
    fn same_profile(&self, other: &Self) -> bool;

    /// Variant name for log lines
    fn variant() -> &'static str;
}

impl IdentityDescriptor for MachineIdentity {
    fn id(&self) -> &ConfigId {
        &self.id
    }

    fn same_profile(&self, other: &Self) -> bool {
        self.same_hardware_profile(other)
    }

    fn variant() -> &'static str {
        "machine"
    }
}

impl IdentityDescriptor for SoftwareIdentity {
    fn id(&self) -> &ConfigId {
        &self.id
    }

    fn same_profile(&self, other: &Self) -> bool {
        self.same_software_profile(other)
    }

    fn variant() -> &'static str {
        "software"
    }
}

/// Insertion-ordered, profile-deduplicated descriptor collection
///
/// Invariant: no two entries are equal under `same_profile`.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRegistry<T: IdentityDescriptor> {
    entries: Vec<T>,
}

impl<T: IdentityDescriptor> Default for IdentityRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: IdentityDescriptor> IdentityRegistry<T> {
    /// Rebuild a registry from persisted entries, preserving their order
    pub fn from_entries(entries: Vec<T>) -> Self {
        Self { entries }
    }

    /// Return the registered id for an equal descriptor, inserting the
    /// given one (with its own id) if no profile match exists
    ///
    /// Idempotent: resolving equal descriptors always yields the same id.
    /// Insertion is the only side effect.
    pub fn resolve(&mut self, descriptor: T) -> ConfigId {
        if let Some(existing) = self.entries.iter().find(|e| e.same_profile(&descriptor)) {
            return existing.id().clone();
        }
        let id = descriptor.id().clone();
        debug!(
            variant = T::variant(),
            id = %id,
            "registering new identity descriptor"
        );
        self.entries.push(descriptor);
        id
    }

    /// Look up a descriptor by its stable id
    pub fn find_by_id(&self, id: &ConfigId) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PackageSpec;

    fn software(runtime: &str, packages: &[(&str, &str)]) -> SoftwareIdentity {
        SoftwareIdentity::new(
            runtime,
            packages
                .iter()
                .map(|(n, v)| PackageSpec::new(*n, *v))
                .collect(),
        )
    }

    #[test]
    fn test_resolve_deduplicates_equal_profiles() {
        let mut registry = IdentityRegistry::default();
        let first = software("1.80.0", &[("serde", "1.0")]);
        let id = registry.resolve(first);

        // A second probe of the same stack carries a fresh random id but
        // must adopt the registered one.
        let again = software("1.80.0", &[("serde", "1.0")]);
        assert_eq!(registry.resolve(again), id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_appends_new_profiles_in_order() {
        let mut registry = IdentityRegistry::default();
        let id_a = registry.resolve(software("1.80.0", &[("serde", "1.0")]));
        let id_b = registry.resolve(software("1.80.0", &[("serde", "1.1")]));
        assert_ne!(id_a, id_b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entries()[0].id, id_a);
        assert_eq!(registry.entries()[1].id, id_b);
    }

    #[test]
    fn test_find_by_id() {
        let mut registry = IdentityRegistry::default();
        let id = registry.resolve(software("1.80.0", &[]));
        assert!(registry.find_by_id(&id).is_some());
        assert!(registry.find_by_id(&ConfigId::from("ffffffff")).is_none());
    }
}
