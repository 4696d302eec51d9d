//! Catalog over an explicit set of descriptors

use crate::notifier::{ChangeNotifier, ChangeReport};
use crate::traits::{Catalog, CatalogChange, CatalogChangeListener, SubscriptionId};
use mosaic_core::{ComponentDescriptor, DescriptorId, DescriptorSnapshot, MosaicResult};
use parking_lot::{ReentrantMutex, RwLock};
use std::sync::{Arc, Weak};

/// A mutable catalog of descriptors supplied by the caller
///
/// Changes go through the full change protocol, so listeners see each
/// `add`/`remove` as one atomic change.
pub struct ComponentCatalog {
    snapshot: Arc<RwLock<DescriptorSnapshot>>,
    notifier: ChangeNotifier,
    change_lock: ReentrantMutex<()>,
}

impl ComponentCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::with_descriptors(Vec::new())
    }

    /// Catalog seeded with `descriptors`; duplicates by id are dropped
    pub fn with_descriptors(descriptors: impl IntoIterator<Item = Arc<ComponentDescriptor>>) -> Self {
        let seed: Vec<_> = descriptors.into_iter().collect();
        Self {
            snapshot: Arc::new(RwLock::new(DescriptorSnapshot::empty().with_changes(&seed, &[]))),
            notifier: ChangeNotifier::new(),
            change_lock: ReentrantMutex::new(()),
        }
    }

    /// Add one descriptor
    pub fn add(&self, descriptor: Arc<ComponentDescriptor>) -> MosaicResult<ChangeReport> {
        self.apply_change(vec![descriptor], &[])
    }

    /// Remove the descriptor with `id`
    pub fn remove(&self, id: DescriptorId) -> MosaicResult<ChangeReport> {
        self.apply_change(Vec::new(), &[id])
    }

    /// Add and remove descriptors as one change
    ///
    /// Descriptors already present are not re-added and unknown ids are
    /// ignored.
    pub fn apply_change(
        &self,
        added: Vec<Arc<ComponentDescriptor>>,
        removed: &[DescriptorId],
    ) -> MosaicResult<ChangeReport> {
        let _guard = self.change_lock.lock();
        let base = self.snapshot.read().clone();

        let mut fresh: Vec<Arc<ComponentDescriptor>> = Vec::with_capacity(added.len());
        for descriptor in added {
            if !base.contains(descriptor.id()) && !fresh.iter().any(|d| d.id() == descriptor.id()) {
                fresh.push(descriptor);
            }
        }
        let gone: Vec<Arc<ComponentDescriptor>> = removed
            .iter()
            .filter_map(|id| base.get(*id).cloned())
            .collect();

        let change = CatalogChange::new(base, fresh, gone);
        let snapshot = Arc::clone(&self.snapshot);
        let (added, removed) = (change.added().to_vec(), change.removed().to_vec());
        self.notifier.publish(change, move || {
            let mut current = snapshot.write();
            *current = current.with_changes(&added, &removed);
        })
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    /// True if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog for ComponentCatalog {
    fn descriptors(&self) -> DescriptorSnapshot {
        self.snapshot.read().clone()
    }

    fn subscribe(&self, listener: Weak<dyn CatalogChangeListener>) -> Option<SubscriptionId> {
        Some(self.notifier.subscribe(listener))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

impl std::fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCatalog")
            .field("descriptors", &self.len())
            .field("notifier", &self.notifier)
            .finish()
    }
}
