//! Catalog that unions a dynamic list of child catalogs
//!
//! Adding or removing a child is itself a catalog change. Changes inside a
//! child are forwarded to the aggregate's listeners, re-expressed against
//! the aggregate's own descriptor set and carried on the child's scope so
//! they commit together with the child.

use crate::notifier::{ChangeNotifier, ChangeReport};
use crate::traits::{Catalog, CatalogChange, CatalogChangeListener, SubscriptionId};
use mosaic_concurrency::ScopeHandle;
use mosaic_core::{ComponentDescriptor, DescriptorId, DescriptorSnapshot, MosaicResult};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Identifies a child of an [`AggregateCatalog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogId(u64);

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "catalog-{}", self.0)
    }
}

struct Child {
    id: CatalogId,
    catalog: Arc<dyn Catalog>,
    // Kept alive here; the child only holds it weakly
    _forwarder: Arc<dyn CatalogChangeListener>,
    subscription: Option<SubscriptionId>,
}

struct AggregateInner {
    children: RwLock<Vec<Child>>,
    notifier: ChangeNotifier,
    change_lock: ReentrantMutex<()>,
    next_id: AtomicU64,
}

impl AggregateInner {
    /// Union of the children, first occurrence wins
    fn descriptors(&self) -> DescriptorSnapshot {
        let all: Vec<Arc<ComponentDescriptor>> = self
            .children
            .read()
            .iter()
            .flat_map(|c| c.catalog.descriptors().iter().cloned().collect::<Vec<_>>())
            .collect();
        DescriptorSnapshot::empty().with_changes(&all, &[])
    }

    /// Union of the children with `child` replaced by `replacement`
    fn descriptors_with(&self, child: CatalogId, replacement: &DescriptorSnapshot) -> DescriptorSnapshot {
        let mut all: Vec<Arc<ComponentDescriptor>> = Vec::new();
        for c in self.children.read().iter() {
            if c.id == child {
                all.extend(replacement.iter().cloned());
            } else {
                all.extend(c.catalog.descriptors().iter().cloned());
            }
        }
        DescriptorSnapshot::empty().with_changes(&all, &[])
    }

    /// Union of the children without `child`
    fn descriptors_without(&self, child: CatalogId) -> DescriptorSnapshot {
        self.descriptors_with(child, &DescriptorSnapshot::empty())
    }
}

/// Change that turns `base` into `after`
fn delta(base: DescriptorSnapshot, after: &DescriptorSnapshot) -> CatalogChange {
    let before: HashSet<DescriptorId> = base.ids();
    let now: HashSet<DescriptorId> = after.ids();
    let added = after.iter().filter(|d| !before.contains(&d.id())).cloned().collect();
    let removed = base.iter().filter(|d| !now.contains(&d.id())).cloned().collect();
    CatalogChange::new(base, added, removed)
}

/// Re-publishes one child's changes on the aggregate
struct ChildForwarder {
    child: CatalogId,
    aggregate: Weak<AggregateInner>,
    pending: Mutex<Vec<CatalogChange>>,
}

impl CatalogChangeListener for ChildForwarder {
    fn catalog_changing(&self, change: &CatalogChange, scope: &ScopeHandle) -> MosaicResult<()> {
        let Some(inner) = self.aggregate.upgrade() else {
            return Ok(());
        };
        let _guard = inner.change_lock.lock();
        let base = inner.descriptors();
        let rebased = delta(base, &inner.descriptors_with(self.child, &change.after()));
        if rebased.is_empty() {
            return Ok(());
        }

        debug!(
            target: "mosaic::catalog",
            child = %self.child,
            added = rebased.added().len(),
            removed = rebased.removed().len(),
            "Forwarding child catalog change"
        );
        let failures = inner.notifier.notify_changing(&rebased, scope);
        self.pending.lock().push(rebased);
        match failures.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }

    fn catalog_changed(&self, _change: &CatalogChange) {
        let Some(inner) = self.aggregate.upgrade() else {
            return;
        };
        let Some(rebased) = self.pending.lock().pop() else {
            return;
        };
        inner.notifier.notify_changed(&rebased);
    }
}

/// A catalog over the union of other catalogs
#[derive(Clone)]
pub struct AggregateCatalog {
    inner: Arc<AggregateInner>,
}

impl AggregateCatalog {
    /// Aggregate with no children
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AggregateInner {
                children: RwLock::new(Vec::new()),
                notifier: ChangeNotifier::new(),
                change_lock: ReentrantMutex::new(()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Add a child catalog
    ///
    /// Its descriptors become visible as one change. Later changes inside
    /// the child are forwarded.
    pub fn add_catalog(&self, catalog: Arc<dyn Catalog>) -> MosaicResult<(CatalogId, ChangeReport)> {
        let _guard = self.inner.change_lock.lock();
        let id = CatalogId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let forwarder: Arc<dyn CatalogChangeListener> = Arc::new(ChildForwarder {
            child: id,
            aggregate: Arc::downgrade(&self.inner),
            pending: Mutex::new(Vec::new()),
        });

        let base = self.inner.descriptors();
        let mut after: Vec<Arc<ComponentDescriptor>> = base.iter().cloned().collect();
        after.extend(catalog.descriptors().iter().cloned());
        let change = delta(base, &DescriptorSnapshot::empty().with_changes(&after, &[]));

        let child = Child {
            id,
            catalog: Arc::clone(&catalog),
            _forwarder: Arc::clone(&forwarder),
            subscription: None,
        };
        let report = if change.is_empty() {
            self.inner.children.write().push(child);
            ChangeReport::default()
        } else {
            let inner = Arc::clone(&self.inner);
            self.inner
                .notifier
                .publish(change, move || inner.children.write().push(child))?
        };

        let subscription = catalog.subscribe(Arc::downgrade(&forwarder));
        if let Some(entry) = self.inner.children.write().iter_mut().find(|c| c.id == id) {
            entry.subscription = subscription;
        }
        info!(target: "mosaic::catalog", catalog = %id, added = report.added, "Child catalog added");
        Ok((id, report))
    }

    /// Remove a child catalog
    ///
    /// Its descriptors disappear as one change, except those another child
    /// also provides. Returns `None` for an unknown id.
    pub fn remove_catalog(&self, id: CatalogId) -> MosaicResult<Option<(Arc<dyn Catalog>, ChangeReport)>> {
        let _guard = self.inner.change_lock.lock();
        let (catalog, subscription) = {
            let children = self.inner.children.read();
            match children.iter().find(|c| c.id == id) {
                Some(c) => (Arc::clone(&c.catalog), c.subscription),
                None => return Ok(None),
            }
        };
        if let Some(subscription) = subscription {
            catalog.unsubscribe(subscription);
        }

        let change = delta(self.inner.descriptors(), &self.inner.descriptors_without(id));
        let report = if change.is_empty() {
            self.inner.children.write().retain(|c| c.id != id);
            ChangeReport::default()
        } else {
            let inner = Arc::clone(&self.inner);
            self.inner.notifier.publish(change, move || {
                inner.children.write().retain(|c| c.id != id);
            })?
        };
        info!(target: "mosaic::catalog", catalog = %id, removed = report.removed, "Child catalog removed");
        Ok(Some((catalog, report)))
    }

    /// Child catalogs in insertion order
    pub fn catalogs(&self) -> Vec<(CatalogId, Arc<dyn Catalog>)> {
        self.inner
            .children
            .read()
            .iter()
            .map(|c| (c.id, Arc::clone(&c.catalog)))
            .collect()
    }

    /// Number of child catalogs
    pub fn len(&self) -> usize {
        self.inner.children.read().len()
    }

    /// True if there are no children
    pub fn is_empty(&self) -> bool {
        self.inner.children.read().is_empty()
    }
}

impl Default for AggregateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog for AggregateCatalog {
    fn descriptors(&self) -> DescriptorSnapshot {
        self.inner.descriptors()
    }

    fn subscribe(&self, listener: Weak<dyn CatalogChangeListener>) -> Option<SubscriptionId> {
        Some(self.inner.notifier.subscribe(listener))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.notifier.unsubscribe(id)
    }
}

impl fmt::Debug for AggregateCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateCatalog")
            .field("children", &self.len())
            .field("notifier", &self.inner.notifier)
            .finish()
    }
}

impl Drop for AggregateInner {
    fn drop(&mut self) {
        for child in self.children.get_mut().iter() {
            if let Some(subscription) = child.subscription {
                child.catalog.unsubscribe(subscription);
            }
        }
    }
}
