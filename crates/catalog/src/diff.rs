//! Read-only view of a catalog with a pending change applied
//!
//! Recomposition resolves against the catalog as it will look after the
//! change, before the catalog has published it. [`CatalogDiff`] is that
//! view: `(base ∪ added) − removed`, matched with the same rules as every
//! other catalog.

use crate::traits::{Catalog, CatalogChange};
use mosaic_core::{ComponentDescriptor, DescriptorId, DescriptorSnapshot, ExportMatch, ImportDefinition};
use std::collections::HashSet;
use std::sync::Arc;

/// Ephemeral overlay of a pending change on a base descriptor set
#[derive(Debug)]
pub struct CatalogDiff {
    descriptors: DescriptorSnapshot,
    added: HashSet<DescriptorId>,
    removed: HashSet<DescriptorId>,
}

impl CatalogDiff {
    /// Overlay `added` and `removed` on the current contents of `base`
    pub fn new(
        base: &dyn Catalog,
        added: &[Arc<ComponentDescriptor>],
        removed: &[Arc<ComponentDescriptor>],
    ) -> Self {
        Self::from_snapshot(&base.descriptors(), added, removed)
    }

    /// Overlay `added` and `removed` on `base`
    pub fn from_snapshot(
        base: &DescriptorSnapshot,
        added: &[Arc<ComponentDescriptor>],
        removed: &[Arc<ComponentDescriptor>],
    ) -> Self {
        Self {
            descriptors: base.with_changes(added, removed),
            added: added.iter().map(|d| d.id()).collect(),
            removed: removed.iter().map(|d| d.id()).collect(),
        }
    }

    /// View of `change` applied to its own base
    pub fn from_change(change: &CatalogChange) -> Self {
        Self::from_snapshot(change.base(), change.added(), change.removed())
    }

    /// Whether `id` enters with this change
    pub fn is_added(&self, id: DescriptorId) -> bool {
        self.added.contains(&id) && !self.removed.contains(&id)
    }

    /// Whether `id` leaves with this change
    pub fn is_removed(&self, id: DescriptorId) -> bool {
        self.removed.contains(&id)
    }

    /// Whether `id` is visible through the overlay
    pub fn contains(&self, id: DescriptorId) -> bool {
        self.descriptors.contains(id)
    }
}

impl Catalog for CatalogDiff {
    fn descriptors(&self) -> DescriptorSnapshot {
        self.descriptors.clone()
    }

    fn matching_exports(&self, import: &ImportDefinition) -> Vec<ExportMatch> {
        self.descriptors.matching_exports(import)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentCatalog;
    use mosaic_core::ExportDefinition;

    fn part(name: &str, contract: &str) -> Arc<ComponentDescriptor> {
        ComponentDescriptor::builder(name)
            .export(ExportDefinition::new(contract))
            .build()
    }

    #[test]
    fn test_overlay_hides_removed_and_shows_added() {
        let old = part("Old", "Greeter");
        let keep = part("Keep", "Logger");
        let base = ComponentCatalog::with_descriptors(vec![old.clone(), keep.clone()]);
        let new = part("New", "Greeter");

        let diff = CatalogDiff::new(&base, &[new.clone()], &[old.clone()]);
        let greeters = diff.matching_exports(&ImportDefinition::many("Greeter"));
        assert_eq!(greeters.len(), 1);
        assert_eq!(greeters[0].descriptor().id(), new.id());
        assert!(diff.contains(keep.id()));
        assert!(diff.is_added(new.id()));
        assert!(diff.is_removed(old.id()));

        // The base is untouched
        assert_eq!(base.len(), 2);
        assert!(base.descriptors().contains(old.id()));
    }

    #[test]
    fn test_removed_wins_over_added() {
        let both = part("Both", "Greeter");
        let diff = CatalogDiff::from_snapshot(&DescriptorSnapshot::empty(), &[both.clone()], &[both.clone()]);
        assert!(!diff.contains(both.id()));
        assert!(!diff.is_added(both.id()));
    }
}
