//! Diff overlay properties
//!
//! `CatalogDiff(S, A, D)` must show exactly `(S ∪ A) − D` and never offer an
//! export from a removed descriptor.

use mosaic_catalog::{Catalog, CatalogDiff, ComponentCatalog};
use mosaic_core::{ComponentDescriptor, DescriptorId, ExportDefinition, ImportDefinition};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

const CONTRACTS: [&str; 3] = ["Greeter", "Logger", "Store"];

fn descriptor(i: usize, contract: usize) -> Arc<ComponentDescriptor> {
    ComponentDescriptor::builder(format!("P{i}"))
        .export(ExportDefinition::new(CONTRACTS[contract % CONTRACTS.len()]))
        .build()
}

proptest! {
    #[test]
    fn prop_diff_is_union_minus_removed(
        base_contracts in prop::collection::vec(0usize..3, 0..12),
        added_contracts in prop::collection::vec(0usize..3, 0..6),
        removed_mask in prop::collection::vec(any::<bool>(), 12),
    ) {
        let base: Vec<_> = base_contracts
            .iter()
            .enumerate()
            .map(|(i, c)| descriptor(i, *c))
            .collect();
        let added: Vec<_> = added_contracts
            .iter()
            .enumerate()
            .map(|(i, c)| descriptor(100 + i, *c))
            .collect();
        let removed: Vec<_> = base
            .iter()
            .zip(removed_mask.iter())
            .filter(|(_, remove)| **remove)
            .map(|(d, _)| Arc::clone(d))
            .collect();

        let catalog = ComponentCatalog::with_descriptors(base.clone());
        let diff = CatalogDiff::new(&catalog, &added, &removed);

        let removed_ids: HashSet<DescriptorId> = removed.iter().map(|d| d.id()).collect();
        let expected: HashSet<DescriptorId> = base
            .iter()
            .chain(added.iter())
            .map(|d| d.id())
            .filter(|id| !removed_ids.contains(id))
            .collect();
        let actual: HashSet<DescriptorId> = diff.descriptors().iter().map(|d| d.id()).collect();
        prop_assert_eq!(actual, expected);

        for contract in CONTRACTS {
            for m in diff.matching_exports(&ImportDefinition::many(contract)) {
                prop_assert!(!removed_ids.contains(&m.descriptor().id()));
            }
        }

        // The base catalog never sees the pending change
        prop_assert_eq!(catalog.descriptors().len(), base.len());
    }
}

#[test]
fn test_diff_is_restartable_and_stable() {
    let catalog = ComponentCatalog::with_descriptors(vec![descriptor(0, 0), descriptor(1, 0)]);
    let diff = CatalogDiff::new(&catalog, &[descriptor(2, 0)], &[]);
    let import = ImportDefinition::many("Greeter");

    let first: Vec<_> = diff.matching_exports(&import).iter().map(|m| m.export_ref()).collect();
    let second: Vec<_> = diff.matching_exports(&import).iter().map(|m| m.export_ref()).collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}
