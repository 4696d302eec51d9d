//! Atomic scopes for transactional composition
//!
//! An [`AtomicScope`] holds speculative state for a series of composition
//! steps: a key/value scratch map, an ordered list of completion actions and
//! an ordered list of revert actions.
//!
//! # Lifecycle
//!
//! ```text
//! Open ──complete()──> Completed ──drop/dispose()──> Disposed
//!   │
//!   └──dispose()/drop──> Disposed   (revert actions run, newest first)
//! ```
//!
//! # Nesting
//!
//! - Nothing runs until the outermost scope completes. Completing a nested
//!   scope moves its actions and values into its parent; the parent decides.
//! - Opening a nested scope locks the parent. A locked parent rejects values,
//!   actions, completion and further nesting until the child completes or is
//!   disposed.
//! - Value lookups walk outwards through the parents unless `local_only`.
//!
//! # Disposal
//!
//! Dropping a scope disposes it. `dispose()` is idempotent: calls after the
//! first are no-ops. Disposing a completed scope never runs revert actions.

use mosaic_core::MosaicError;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Deferred work queued on a scope
pub type ScopeAction = Box<dyn FnOnce() + Send>;

/// Value stored in a scope's scratch map
pub type ScopeValue = Arc<dyn Any + Send + Sync>;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Misuse of an atomic scope
///
/// These are precondition violations, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The parent already has an active nested scope
    #[error("atomic scope already has an active nested scope")]
    AlreadyNested,
    /// The scope is locked by an active nested scope
    #[error("atomic scope is locked by an active nested scope")]
    Locked,
    /// The scope has been disposed
    #[error("atomic scope has been disposed")]
    Disposed,
    /// The scope has already been completed
    #[error("atomic scope has already been completed")]
    AlreadyCompleted,
}

impl From<ScopeError> for MosaicError {
    fn from(e: ScopeError) -> Self {
        match e {
            ScopeError::AlreadyNested => MosaicError::AlreadyNested,
            ScopeError::Locked => MosaicError::Locked,
            ScopeError::Disposed => MosaicError::Disposed,
            ScopeError::AlreadyCompleted => MosaicError::AlreadyCompleted,
        }
    }
}

#[derive(Default)]
struct ScopeState {
    values: Vec<(String, ScopeValue)>,
    complete_actions: Vec<ScopeAction>,
    revert_actions: Vec<ScopeAction>,
    completed: bool,
    disposed: bool,
    has_child: bool,
}

impl ScopeState {
    fn check_usable(&self) -> Result<(), ScopeError> {
        if self.disposed {
            return Err(ScopeError::Disposed);
        }
        if self.completed {
            return Err(ScopeError::AlreadyCompleted);
        }
        Ok(())
    }

    fn check_mutable(&self) -> Result<(), ScopeError> {
        self.check_usable()?;
        if self.has_child {
            return Err(ScopeError::Locked);
        }
        Ok(())
    }

    fn set_value(&mut self, key: String, value: ScopeValue) {
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.values.push((key, value)),
        }
    }

    fn get_value(&self, key: &str) -> Option<ScopeValue> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| Arc::clone(v))
    }
}

struct ScopeNode {
    id: u64,
    depth: usize,
    state: Mutex<ScopeState>,
    parent: Option<Arc<ScopeNode>>,
}

/// Non-owning reference to an open scope
///
/// Handles can nest new scopes and queue work, but only the owning
/// [`AtomicScope`] can complete or dispose. Cloning a handle never
/// affects the scope's lifetime.
#[derive(Clone)]
pub struct ScopeHandle {
    node: Arc<ScopeNode>,
}

impl ScopeHandle {
    /// Scope identifier, unique within the process
    pub fn id(&self) -> u64 {
        self.node.id
    }

    /// Nesting depth; 0 for a root scope
    pub fn depth(&self) -> usize {
        self.node.depth
    }

    /// True if this scope has no parent
    pub fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    /// True once `complete()` has succeeded
    pub fn is_completed(&self) -> bool {
        self.node.state.lock().completed
    }

    /// True once the scope has been disposed
    pub fn is_disposed(&self) -> bool {
        self.node.state.lock().disposed
    }

    /// True while a nested scope is active
    pub fn is_locked(&self) -> bool {
        self.node.state.lock().has_child
    }

    /// Number of queued `(completion, revert)` actions
    pub fn pending_actions(&self) -> (usize, usize) {
        let state = self.node.state.lock();
        (state.complete_actions.len(), state.revert_actions.len())
    }

    /// Open a scope nested under this one
    pub fn nest(&self) -> Result<AtomicScope, ScopeError> {
        AtomicScope::nested(self)
    }

    /// Store a scratch value, overwriting any value under the same key
    pub fn set_value<V: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: V,
    ) -> Result<(), ScopeError> {
        let mut state = self.node.state.lock();
        state.check_mutable()?;
        state.set_value(key.into(), Arc::new(value));
        Ok(())
    }

    /// Look up a scratch value
    ///
    /// Walks outwards through the parents unless `local_only`. A key holding
    /// a value of another type reads as absent.
    pub fn try_get_value<V: Any + Send + Sync + Clone>(
        &self,
        key: &str,
        local_only: bool,
    ) -> Result<Option<V>, ScopeError> {
        let local = {
            let state = self.node.state.lock();
            state.check_usable()?;
            state.get_value(key)
        };
        if let Some(value) = local {
            return Ok(value.downcast_ref::<V>().cloned());
        }
        if local_only {
            return Ok(None);
        }

        let mut current = self.node.parent.clone();
        while let Some(node) = current {
            if let Some(value) = node.state.lock().get_value(key) {
                return Ok(value.downcast_ref::<V>().cloned());
            }
            current = node.parent.clone();
        }
        Ok(None)
    }

    /// Queue an action that runs when the outermost scope completes
    pub fn add_completion_action(
        &self,
        action: impl FnOnce() + Send + 'static,
    ) -> Result<(), ScopeError> {
        let mut state = self.node.state.lock();
        state.check_mutable()?;
        state.complete_actions.push(Box::new(action));
        Ok(())
    }

    /// Queue an action that runs if this scope is disposed without completing
    pub fn add_revert_action(
        &self,
        action: impl FnOnce() + Send + 'static,
    ) -> Result<(), ScopeError> {
        let mut state = self.node.state.lock();
        state.check_mutable()?;
        state.revert_actions.push(Box::new(action));
        Ok(())
    }
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.node.state.lock();
        f.debug_struct("ScopeHandle")
            .field("id", &self.node.id)
            .field("depth", &self.node.depth)
            .field("values", &state.values.len())
            .field("complete_actions", &state.complete_actions.len())
            .field("revert_actions", &state.revert_actions.len())
            .field("completed", &state.completed)
            .field("disposed", &state.disposed)
            .field("locked", &state.has_child)
            .finish()
    }
}

/// Owning guard over a transactional scope
///
/// Dereferences to [`ScopeHandle`] for value and action access.
pub struct AtomicScope {
    handle: ScopeHandle,
}

impl AtomicScope {
    /// Open a root scope
    pub fn root() -> Self {
        Self::open(None)
    }

    /// Open a scope, nested under `parent` when given
    pub fn new(parent: Option<&ScopeHandle>) -> Result<Self, ScopeError> {
        match parent {
            Some(parent) => Self::nested(parent),
            None => Ok(Self::root()),
        }
    }

    /// Open a scope nested under `parent`, locking it
    ///
    /// Fails with `AlreadyNested` if the parent already has an active child.
    pub fn nested(parent: &ScopeHandle) -> Result<Self, ScopeError> {
        {
            let mut state = parent.node.state.lock();
            state.check_usable()?;
            if state.has_child {
                return Err(ScopeError::AlreadyNested);
            }
            state.has_child = true;
        }
        Ok(Self::open(Some(Arc::clone(&parent.node))))
    }

    fn open(parent: Option<Arc<ScopeNode>>) -> Self {
        let depth = parent.as_ref().map(|p| p.depth + 1).unwrap_or(0);
        let node = Arc::new(ScopeNode {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            depth,
            state: Mutex::new(ScopeState::default()),
            parent,
        });
        trace!(target: "mosaic::scope", scope = node.id, depth, "Scope opened");
        Self {
            handle: ScopeHandle { node },
        }
    }

    /// Non-owning handle to this scope
    pub fn handle(&self) -> ScopeHandle {
        self.handle.clone()
    }

    /// Complete the scope
    ///
    /// A root scope runs every completion action in insertion order, including
    /// actions appended while they run. A nested scope moves its actions and
    /// values into the parent, unlocking it, and runs nothing.
    pub fn complete(&mut self) -> Result<(), ScopeError> {
        let node = Arc::clone(&self.handle.node);
        node.state.lock().check_mutable()?;

        match &node.parent {
            None => self.final_complete(),
            Some(parent) => self.copy_complete(parent),
        }
    }

    fn final_complete(&mut self) -> Result<(), ScopeError> {
        let node = &self.handle.node;
        let mut executed = 0usize;
        loop {
            let actions = std::mem::take(&mut node.state.lock().complete_actions);
            if actions.is_empty() {
                break;
            }
            for action in actions {
                action();
                executed += 1;
            }
        }

        let mut state = node.state.lock();
        state.completed = true;
        state.revert_actions.clear();
        state.values.clear();
        debug!(target: "mosaic::scope", scope = node.id, executed, "Root scope completed");
        Ok(())
    }

    fn copy_complete(&mut self, parent: &Arc<ScopeNode>) -> Result<(), ScopeError> {
        let node = &self.handle.node;
        let mut state = node.state.lock();
        let mut parent_state = parent.state.lock();
        parent_state.check_usable()?;

        let completes = std::mem::take(&mut state.complete_actions);
        let reverts = std::mem::take(&mut state.revert_actions);
        let values = std::mem::take(&mut state.values);
        let moved = (completes.len(), reverts.len());

        parent_state.complete_actions.extend(completes);
        parent_state.revert_actions.extend(reverts);
        for (key, value) in values {
            parent_state.set_value(key, value);
        }
        parent_state.has_child = false;
        state.completed = true;

        debug!(
            target: "mosaic::scope",
            scope = node.id,
            parent = parent.id,
            completion_actions = moved.0,
            revert_actions = moved.1,
            "Nested scope merged into parent"
        );
        Ok(())
    }

    /// Dispose the scope
    ///
    /// If the scope was not completed, its revert actions run newest first and
    /// its state is discarded. The parent is unlocked. Idempotent.
    pub fn dispose(&mut self) -> Result<(), ScopeError> {
        let node = &self.handle.node;
        let (reverts, completed) = {
            let mut state = node.state.lock();
            if state.disposed {
                return Ok(());
            }
            state.disposed = true;
            state.values.clear();
            state.complete_actions.clear();
            (std::mem::take(&mut state.revert_actions), state.completed)
        };

        if !completed {
            if let Some(parent) = &node.parent {
                parent.state.lock().has_child = false;
            }
            let count = reverts.len();
            for action in reverts.into_iter().rev() {
                action();
            }
            if count > 0 {
                debug!(target: "mosaic::scope", scope = node.id, reverted = count, "Scope rolled back");
            }
        }
        trace!(target: "mosaic::scope", scope = node.id, completed, "Scope disposed");
        Ok(())
    }
}

impl Deref for AtomicScope {
    type Target = ScopeHandle;

    fn deref(&self) -> &ScopeHandle {
        &self.handle
    }
}

impl Drop for AtomicScope {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

impl fmt::Debug for AtomicScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicScope").field(&self.handle).finish()
    }
}
