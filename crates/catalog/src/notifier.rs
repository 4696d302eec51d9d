//! Listener registry and the change protocol shared by every mutable catalog
//!
//! Publishing a change:
//!
//! 1. open a root [`AtomicScope`] and queue the catalog's own swap as its
//!    first completion action
//! 2. call `catalog_changing` on every live listener with that scope
//! 3. complete the scope: the swap runs, then whatever listeners queued
//! 4. call `catalog_changed` on every live listener
//!
//! Listener errors are logged and returned in the [`ChangeReport`]. They do
//! not stop the change.

use crate::traits::{CatalogChange, CatalogChangeListener, SubscriptionId};
use mosaic_concurrency::{AtomicScope, ScopeHandle};
use mosaic_core::{MosaicError, MosaicResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Outcome of publishing one catalog change
#[derive(Debug, Default)]
pub struct ChangeReport {
    /// Descriptors added
    pub added: usize,
    /// Descriptors removed
    pub removed: usize,
    /// Listeners notified
    pub listeners: usize,
    /// Errors returned by `catalog_changing`
    pub listener_failures: Vec<MosaicError>,
}

impl ChangeReport {
    /// True when the change was empty and nothing was published
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Weakly held listeners of one catalog
pub struct ChangeNotifier {
    listeners: RwLock<Vec<(SubscriptionId, Weak<dyn CatalogChangeListener>)>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    /// Notifier with no listeners
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener
    pub fn subscribe(&self, listener: Weak<dyn CatalogChangeListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of listeners still alive
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|(_, l)| l.strong_count() > 0)
            .count()
    }

    /// Upgrade live listeners and forget dead ones
    ///
    /// Callbacks run on the returned list, never under the registry lock, so
    /// listeners may subscribe or unsubscribe while being notified.
    fn live(&self) -> Vec<Arc<dyn CatalogChangeListener>> {
        let mut dead = false;
        let live: Vec<_> = self
            .listeners
            .read()
            .iter()
            .filter_map(|(_, l)| {
                let upgraded = l.upgrade();
                dead |= upgraded.is_none();
                upgraded
            })
            .collect();
        if dead {
            self.listeners.write().retain(|(_, l)| l.strong_count() > 0);
        }
        live
    }

    /// Call `catalog_changing` on every live listener
    pub fn notify_changing(&self, change: &CatalogChange, scope: &ScopeHandle) -> Vec<MosaicError> {
        let mut failures = Vec::new();
        for listener in self.live() {
            if let Err(e) = listener.catalog_changing(change, scope) {
                warn!(
                    target: "mosaic::catalog",
                    error = %e,
                    added = change.added().len(),
                    removed = change.removed().len(),
                    "Catalog listener failed to prepare for change"
                );
                failures.push(e);
            }
        }
        failures
    }

    /// Call `catalog_changed` on every live listener
    pub fn notify_changed(&self, change: &CatalogChange) {
        for listener in self.live() {
            listener.catalog_changed(change);
        }
    }

    /// Run the change protocol, with `apply` making the new set visible
    ///
    /// An empty change publishes nothing and notifies nobody.
    pub fn publish<F>(&self, change: CatalogChange, apply: F) -> MosaicResult<ChangeReport>
    where
        F: FnOnce() + Send + 'static,
    {
        if change.is_empty() {
            return Ok(ChangeReport::default());
        }

        let mut scope = AtomicScope::root();
        scope.add_completion_action(apply)?;

        let listeners = self.listener_count();
        let listener_failures = self.notify_changing(&change, &scope.handle());
        scope.complete()?;
        drop(scope);

        self.notify_changed(&change);

        debug!(
            target: "mosaic::catalog",
            added = change.added().len(),
            removed = change.removed().len(),
            listeners,
            failures = listener_failures.len(),
            "Catalog change published"
        );
        Ok(ChangeReport {
            added: change.added().len(),
            removed: change.removed().len(),
            listeners,
            listener_failures,
        })
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{ComponentDescriptor, DescriptorSnapshot, ExportDefinition};
    use parking_lot::Mutex;

    struct Recorder {
        seen: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl CatalogChangeListener for Recorder {
        fn catalog_changing(&self, _: &CatalogChange, scope: &ScopeHandle) -> MosaicResult<()> {
            self.seen.lock().push("changing");
            let seen = Arc::clone(&self.seen);
            scope.add_completion_action(move || seen.lock().push("listener action"))?;
            if self.fail {
                return Err(MosaicError::part_creation("Recorder", "refused"));
            }
            Ok(())
        }

        fn catalog_changed(&self, _: &CatalogChange) {
            self.seen.lock().push("changed");
        }
    }

    fn one_added() -> CatalogChange {
        let d = ComponentDescriptor::builder("A")
            .export(ExportDefinition::new("X"))
            .build();
        CatalogChange::new(DescriptorSnapshot::empty(), vec![d], vec![])
    }

    #[test]
    fn test_publish_orders_swap_before_listener_actions() {
        let notifier = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener: Arc<dyn CatalogChangeListener> = Arc::new(Recorder {
            seen: Arc::clone(&seen),
            fail: false,
        });
        notifier.subscribe(Arc::downgrade(&listener));

        let swap_seen = Arc::clone(&seen);
        let report = notifier
            .publish(one_added(), move || swap_seen.lock().push("swap"))
            .unwrap();

        assert_eq!(report.added, 1);
        assert_eq!(report.listeners, 1);
        assert_eq!(
            *seen.lock(),
            vec!["changing", "swap", "listener action", "changed"]
        );
    }

    #[test]
    fn test_listener_failure_does_not_block_change() {
        let notifier = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener: Arc<dyn CatalogChangeListener> = Arc::new(Recorder {
            seen: Arc::clone(&seen),
            fail: true,
        });
        notifier.subscribe(Arc::downgrade(&listener));

        let applied = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&applied);
        let report = notifier
            .publish(one_added(), move || *flag.lock() = true)
            .unwrap();

        assert!(*applied.lock());
        assert_eq!(report.listener_failures.len(), 1);
    }

    #[test]
    fn test_dead_listeners_are_dropped() {
        let notifier = ChangeNotifier::new();
        {
            let listener: Arc<dyn CatalogChangeListener> = Arc::new(Recorder {
                seen: Arc::new(Mutex::new(Vec::new())),
                fail: false,
            });
            notifier.subscribe(Arc::downgrade(&listener));
            assert_eq!(notifier.listener_count(), 1);
        }
        assert_eq!(notifier.listener_count(), 0);
        let report = notifier.publish(one_added(), || {}).unwrap();
        assert_eq!(report.listeners, 0);
    }

    #[test]
    fn test_unsubscribe() {
        let notifier = ChangeNotifier::new();
        let listener: Arc<dyn CatalogChangeListener> = Arc::new(Recorder {
            seen: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        });
        let id = notifier.subscribe(Arc::downgrade(&listener));
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
    }

    #[test]
    fn test_empty_change_is_noop() {
        let notifier = ChangeNotifier::new();
        let change = CatalogChange::new(DescriptorSnapshot::empty(), vec![], vec![]);
        let report = notifier.publish(change, || panic!("must not run")).unwrap();
        assert!(report.is_noop());
    }
}
