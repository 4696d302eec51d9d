//! Catalog traits
//!
//! A [`Catalog`] is an observable set of component descriptors. Resolvers
//! read it through immutable [`DescriptorSnapshot`]s and subscribe to
//! changes through [`CatalogChangeListener`].

use mosaic_concurrency::ScopeHandle;
use mosaic_core::{
    ComponentDescriptor, DescriptorSnapshot, ExportMatch, ImportDefinition, MosaicResult,
};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};

/// Handle returned by [`Catalog::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A pending change to a catalog's descriptor set
///
/// `base` is the descriptor set before the change. The catalog publishes
/// `(base ∪ added) − removed` once the change's scope completes.
#[derive(Debug, Clone)]
pub struct CatalogChange {
    base: DescriptorSnapshot,
    added: Vec<Arc<ComponentDescriptor>>,
    removed: Vec<Arc<ComponentDescriptor>>,
}

impl CatalogChange {
    /// Describe a change against `base`
    pub fn new(
        base: DescriptorSnapshot,
        added: Vec<Arc<ComponentDescriptor>>,
        removed: Vec<Arc<ComponentDescriptor>>,
    ) -> Self {
        Self {
            base,
            added,
            removed,
        }
    }

    /// Descriptor set before the change
    pub fn base(&self) -> &DescriptorSnapshot {
        &self.base
    }

    /// Descriptors entering the catalog
    pub fn added(&self) -> &[Arc<ComponentDescriptor>] {
        &self.added
    }

    /// Descriptors leaving the catalog
    pub fn removed(&self) -> &[Arc<ComponentDescriptor>] {
        &self.removed
    }

    /// True when nothing is added or removed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Descriptor set once the change is applied
    pub fn after(&self) -> DescriptorSnapshot {
        self.base.with_changes(&self.added, &self.removed)
    }

    /// Same delta expressed against a different base
    pub fn rebased(&self, base: DescriptorSnapshot) -> Self {
        Self {
            base,
            added: self.added.clone(),
            removed: self.removed.clone(),
        }
    }
}

/// Observer of catalog changes
///
/// `catalog_changing` runs before the new descriptor set is visible. Work
/// that must commit with the change is registered on `scope` (or on a scope
/// nested under it). The catalog's own publish is queued first, so it runs
/// before any listener's completion actions.
///
/// A listener error is reported by the catalog but never blocks the change.
pub trait CatalogChangeListener: Send + Sync {
    /// The change is about to be published
    fn catalog_changing(&self, change: &CatalogChange, scope: &ScopeHandle) -> MosaicResult<()>;

    /// The change has been published
    fn catalog_changed(&self, _change: &CatalogChange) {}
}

/// An observable source of component descriptors
pub trait Catalog: Send + Sync {
    /// Current descriptor set
    fn descriptors(&self) -> DescriptorSnapshot;

    /// Exports in the current descriptor set that satisfy `import`
    fn matching_exports(&self, import: &ImportDefinition) -> Vec<ExportMatch> {
        self.descriptors().matching_exports(import)
    }

    /// Register a change listener
    ///
    /// The catalog holds the listener weakly. Static catalogs return `None`.
    fn subscribe(&self, _listener: Weak<dyn CatalogChangeListener>) -> Option<SubscriptionId> {
        None
    }

    /// Remove a listener registered with [`Catalog::subscribe`]
    fn unsubscribe(&self, _id: SubscriptionId) -> bool {
        false
    }
}

/// Turns one source file into descriptors
pub trait DescriptorExtractor: Send + Sync {
    /// Extract every descriptor `source` declares
    fn extract(&self, source: &Path) -> MosaicResult<Vec<Arc<ComponentDescriptor>>>;
}

impl<C: Catalog + ?Sized> Catalog for Arc<C> {
    fn descriptors(&self) -> DescriptorSnapshot {
        (**self).descriptors()
    }

    fn matching_exports(&self, import: &ImportDefinition) -> Vec<ExportMatch> {
        (**self).matching_exports(import)
    }

    fn subscribe(&self, listener: Weak<dyn CatalogChangeListener>) -> Option<SubscriptionId> {
        (**self).subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        (**self).unsubscribe(id)
    }
}

/// A snapshot is a catalog that never changes
impl Catalog for DescriptorSnapshot {
    fn descriptors(&self) -> DescriptorSnapshot {
        self.clone()
    }

    fn matching_exports(&self, import: &ImportDefinition) -> Vec<ExportMatch> {
        DescriptorSnapshot::matching_exports(self, import)
    }
}
