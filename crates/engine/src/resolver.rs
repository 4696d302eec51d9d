//! Export resolution and recomposition
//!
//! [`ExportResolver`] turns imports into exports by building parts from the
//! descriptors its catalog offers, and keeps the shared parts it built in a
//! [`LiveGraph`].
//!
//! # Atomicity
//!
//! Every resolution and every recomposition runs inside an [`AtomicScope`].
//! Parts are built speculatively: a built instance gets a revert action that
//! releases it, and shared parts are queued as [`GraphEdit`]s that a single
//! completion action applies. A failure disposes the scope, so the graph
//! either takes every edit of a cycle or none of them.
//!
//! # Concurrency
//!
//! Resolutions and recompositions serialize on one re-entrant gate.
//! Between a catalog announcing a change and publishing it, the resolver
//! counts the change as in flight: `get_export` on other threads blocks
//! until the change commits or reverts, so no caller ever pairs the new
//! catalog with the old graph. The recomposition itself releases the gate
//! before the catalog commits, so a reader checks the in-flight count again
//! once it holds the gate and goes back to waiting if a change slipped in.
//!
//! # Re-entrancy
//!
//! A part factory may call back into the resolver that is building it. The
//! resolver remembers the scope and catalog view it has open on the current
//! thread and nests the re-entrant call under it. Cycles are detected per
//! thread through the stack of parts under construction.

use crate::config::ResolverOptions;
use crate::diagnostics::{CompositionEvent, DiagnosticListener, Diagnostics, ImportSite};
use crate::graph::{GraphEdit, ImportEdge, LiveGraph, PartRecord};
use crate::metrics::{Counters, ResolverMetrics};
use crate::recompose::{rebinds, RecompositionPlan, RecompositionReport, RecompositionState};
use chrono::Utc;
use mosaic_catalog::{Catalog, CatalogChange, CatalogChangeListener, CatalogDiff, SubscriptionId};
use mosaic_concurrency::{AtomicScope, ScopeHandle};
use mosaic_core::{
    select_exports, ComponentDescriptor, DescriptorId, Export, ImportDefinition, ImportValues,
    MosaicError, MosaicResult,
};
use parking_lot::{Condvar, Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

static NEXT_RESOLVER_ID: AtomicU64 = AtomicU64::new(1);

struct ActiveFrame {
    resolver: u64,
    scope: ScopeHandle,
    view: Arc<dyn Catalog>,
}

thread_local! {
    /// Scopes this thread has open, innermost last
    static ACTIVE: RefCell<Vec<ActiveFrame>> = const { RefCell::new(Vec::new()) };
    /// Parts under construction on this thread, innermost last
    static BUILDING: RefCell<Vec<(u64, DescriptorId, String)>> = const { RefCell::new(Vec::new()) };
}

fn active_frame(resolver: u64) -> Option<(ScopeHandle, Arc<dyn Catalog>)> {
    ACTIVE.with(|frames| {
        frames
            .borrow()
            .iter()
            .rev()
            .find(|f| f.resolver == resolver)
            .map(|f| (f.scope.clone(), Arc::clone(&f.view)))
    })
}

struct FrameGuard;

impl FrameGuard {
    fn push(resolver: u64, scope: ScopeHandle, view: Arc<dyn Catalog>) -> Self {
        ACTIVE.with(|frames| {
            frames.borrow_mut().push(ActiveFrame {
                resolver,
                scope,
                view,
            })
        });
        FrameGuard
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        ACTIVE.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

struct BuildGuard;

impl BuildGuard {
    fn enter(resolver: u64, descriptor: &ComponentDescriptor, max_depth: usize) -> MosaicResult<Self> {
        BUILDING.with(|building| {
            let mut stack = building.borrow_mut();
            if let Some(start) = stack
                .iter()
                .position(|(r, id, _)| *r == resolver && *id == descriptor.id())
            {
                let mut path: Vec<String> = stack[start..]
                    .iter()
                    .filter(|(r, _, _)| *r == resolver)
                    .map(|(_, _, name)| name.clone())
                    .collect();
                path.push(descriptor.name().to_string());
                return Err(MosaicError::CycleDetected { path });
            }
            let depth = stack.iter().filter(|(r, _, _)| *r == resolver).count();
            if depth >= max_depth {
                return Err(MosaicError::DepthExceeded {
                    part: descriptor.name().to_string(),
                    max_depth,
                });
            }
            stack.push((resolver, descriptor.id(), descriptor.name().to_string()));
            Ok(BuildGuard)
        })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        BUILDING.with(|building| {
            building.borrow_mut().pop();
        });
    }
}

fn part_key(id: DescriptorId) -> String {
    format!("part:{id}")
}

/// Contract a part is composed for, used when wrapping its failures
fn primary_contract(descriptor: &ComponentDescriptor) -> &str {
    descriptor
        .exports()
        .first()
        .map(|e| e.contract_name())
        .unwrap_or_else(|| descriptor.name())
}

/// State of one resolution or recomposition pass
struct Session {
    view: Arc<dyn Catalog>,
    scope: ScopeHandle,
    /// Shared parts that must be rebuilt even if the graph holds them
    force: FxHashSet<DescriptorId>,
    edits: Vec<GraphEdit>,
    /// Memoized currency checks, by record address
    current: FxHashMap<usize, bool>,
}

impl Session {
    fn new(view: Arc<dyn Catalog>, scope: ScopeHandle, force: FxHashSet<DescriptorId>) -> Self {
        Self {
            view,
            scope,
            force,
            edits: Vec::new(),
            current: FxHashMap::default(),
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: usize,
    owner: Option<ThreadId>,
}

struct Inner {
    id: u64,
    catalog: Arc<dyn Catalog>,
    options: ResolverOptions,
    graph: RwLock<LiveGraph>,
    gate: ReentrantMutex<()>,
    in_flight: Mutex<InFlight>,
    settled: Condvar,
    state: Mutex<RecompositionState>,
    counters: Arc<Counters>,
    diagnostics: Arc<Diagnostics>,
}

impl Inner {
    // ========================================================================
    // In-flight catalog changes
    // ========================================================================

    fn wait_settled(&self) {
        let me = thread::current().id();
        let mut in_flight = self.in_flight.lock();
        while in_flight.count > 0 && in_flight.owner != Some(me) {
            self.settled.wait(&mut in_flight);
        }
    }

    /// True if no other thread has a catalog change in flight
    fn settled_for_current(&self) -> bool {
        let in_flight = self.in_flight.lock();
        in_flight.count == 0 || in_flight.owner == Some(thread::current().id())
    }

    /// Take the gate with no other thread's catalog change in flight
    fn enter_settled(&self) -> ReentrantMutexGuard<'_, ()> {
        loop {
            self.wait_settled();
            let gate = self.gate.lock();
            if self.settled_for_current() {
                return gate;
            }
            drop(gate);
        }
    }

    fn begin_in_flight(&self) {
        let me = thread::current().id();
        let mut in_flight = self.in_flight.lock();
        while in_flight.count > 0 && in_flight.owner != Some(me) {
            self.settled.wait(&mut in_flight);
        }
        in_flight.count += 1;
        in_flight.owner = Some(me);
    }

    fn end_in_flight(&self) {
        let mut in_flight = self.in_flight.lock();
        in_flight.count = in_flight.count.saturating_sub(1);
        if in_flight.count == 0 {
            in_flight.owner = None;
            self.settled.notify_all();
        }
    }

    /// End the in-flight window when `scope` commits or reverts
    ///
    /// If `scope` no longer takes actions the window ends now. Whichever of
    /// commit, revert or that fallback comes first ends it; the rest do nothing.
    fn settle_with(self: &Arc<Self>, scope: &ScopeHandle) {
        let ended = Arc::new(AtomicBool::new(false));
        let end = || {
            let (inner, ended) = (Arc::clone(self), Arc::clone(&ended));
            move || {
                if !ended.swap(true, Ordering::AcqRel) {
                    inner.end_in_flight();
                }
            }
        };
        let registered = scope
            .add_revert_action(end())
            .and_then(|()| scope.add_completion_action(end()));
        if let Err(e) = registered {
            warn!(target: "mosaic::recompose", error = %e, "Scope refused settle actions, settling now");
            end()();
        }
    }

    fn set_state(&self, state: RecompositionState) {
        *self.state.lock() = state;
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Run `import` in a fresh scope, nested under this thread's open scope
    fn resolve(self: &Arc<Self>, import: &ImportDefinition) -> MosaicResult<Vec<Export>> {
        let reentrant = active_frame(self.id);
        let _gate = match reentrant {
            Some(_) => self.gate.lock(),
            None => self.enter_settled(),
        };

        let (parent, view) = match reentrant {
            Some((scope, view)) => (Some(scope), view),
            None => (None, Arc::new(self.catalog.descriptors()) as Arc<dyn Catalog>),
        };
        let mut scope = AtomicScope::new(parent.as_ref())?;
        let mut session = Session::new(Arc::clone(&view), scope.handle(), FxHashSet::default());

        let resolved = {
            let _frame = FrameGuard::push(self.id, scope.handle(), view);
            self.resolve_import(&mut session, import)
        };
        let exports = match resolved.and_then(|(exports, _)| {
            self.publish(&mut session, None)?;
            Ok(exports)
        }) {
            Ok(exports) => exports,
            Err(e) => {
                scope.dispose()?;
                debug!(target: "mosaic::resolve", contract = import.contract_name(), error = %e, "Resolution failed");
                return Err(e);
            }
        };
        scope.complete()?;

        Counters::add(&self.counters.exports_served, exports.len());
        debug!(
            target: "mosaic::resolve",
            contract = import.contract_name(),
            exports = exports.len(),
            nested = parent.is_some(),
            "Import resolved"
        );
        Ok(exports)
    }

    fn resolve_import(
        self: &Arc<Self>,
        session: &mut Session,
        import: &ImportDefinition,
    ) -> MosaicResult<(Vec<Export>, ImportEdge)> {
        let selected = select_exports(import, session.view.matching_exports(import))?;
        let mut exports = Vec::with_capacity(selected.len());
        let mut edge = ImportEdge::new(import.clone());
        for matched in selected {
            let descriptor = matched.descriptor();
            let record = self.part_for(session, descriptor).map_err(|e| {
                MosaicError::composition(import.contract_name(), descriptor.name(), e)
            })?;
            exports.push(Export::new(
                matched.definition().clone(),
                matched.export_ref(),
                descriptor.name(),
                Arc::clone(record.instance()),
            ));
            edge.bind(matched.export_ref(), record);
        }
        Ok((exports, edge))
    }

    /// The part built from `descriptor`, reused when shared and current
    fn part_for(
        self: &Arc<Self>,
        session: &mut Session,
        descriptor: &Arc<ComponentDescriptor>,
    ) -> MosaicResult<Arc<PartRecord>> {
        if descriptor.creation_policy().is_shared() {
            let id = descriptor.id();
            if let Some(record) = session
                .scope
                .try_get_value::<Arc<PartRecord>>(&part_key(id), false)?
            {
                Counters::bump(&self.counters.cache_hits);
                return Ok(record);
            }
            if !session.force.contains(&id) {
                let cached = self.graph.read().get(id).cloned();
                if let Some(record) = cached {
                    if self.is_current(session, &record)? {
                        Counters::bump(&self.counters.cache_hits);
                        return Ok(record);
                    }
                    debug!(target: "mosaic::resolve", part = descriptor.name(), "Cached part is stale");
                }
            }
        }
        self.build(session, descriptor)
    }

    /// The record a shared part resolves to in `session`, without building
    fn live_record(&self, session: &Session, id: DescriptorId) -> MosaicResult<Option<Arc<PartRecord>>> {
        if let Some(record) = session
            .scope
            .try_get_value::<Arc<PartRecord>>(&part_key(id), false)?
        {
            return Ok(Some(record));
        }
        if session.force.contains(&id) {
            return Ok(None);
        }
        Ok(self.graph.read().get(id).cloned())
    }

    /// Whether `record` would be built the same way against the session view
    ///
    /// Every edge must select the exports it holds, and every part it holds
    /// must still be the live one and itself current.
    fn is_current(&self, session: &mut Session, record: &Arc<PartRecord>) -> MosaicResult<bool> {
        let key = Arc::as_ptr(record) as usize;
        if let Some(known) = session.current.get(&key) {
            return Ok(*known);
        }
        let mut current = true;
        'edges: for edge in record.edges() {
            if rebinds(edge, session.view.as_ref()) {
                current = false;
                break;
            }
            for part in &edge.parts {
                if part.descriptor().creation_policy().is_shared() {
                    match self.live_record(session, part.id())? {
                        Some(live) if Arc::ptr_eq(&live, part) => {}
                        _ => {
                            current = false;
                            break 'edges;
                        }
                    }
                }
                if !self.is_current(session, part)? {
                    current = false;
                    break 'edges;
                }
            }
        }
        session.current.insert(key, current);
        Ok(current)
    }

    fn build(
        self: &Arc<Self>,
        session: &mut Session,
        descriptor: &Arc<ComponentDescriptor>,
    ) -> MosaicResult<Arc<PartRecord>> {
        let _building = BuildGuard::enter(self.id, descriptor, self.options.max_depth)?;

        let mut values = ImportValues::new();
        let mut edges = Vec::with_capacity(descriptor.imports().len());
        for import in descriptor.imports() {
            let (exports, edge) = self.resolve_import(session, import)?;
            values.push(import.clone(), exports);
            edges.push(edge);
        }

        let instance = descriptor.factory().create(&values)?;
        Counters::bump(&self.counters.parts_created);

        let factory = Arc::clone(descriptor.factory());
        let released = Arc::clone(&instance);
        let counters = Arc::clone(&self.counters);
        session.scope.add_revert_action(move || {
            factory.release(&released);
            Counters::bump(&counters.parts_released);
        })?;

        let shared = descriptor.creation_policy().is_shared();
        let record = Arc::new(PartRecord::new(Arc::clone(descriptor), instance, edges));
        if shared {
            session
                .scope
                .set_value(part_key(descriptor.id()), Arc::clone(&record))?;
            session.edits.push(GraphEdit::Upsert(Arc::clone(&record)));
        }
        debug!(target: "mosaic::resolve", part = descriptor.name(), shared, "Part built");
        Ok(record)
    }

    /// Queue the session's graph edits, plus `event`, for when the scope commits
    fn publish(self: &Arc<Self>, session: &mut Session, event: Option<CompositionEvent>) -> MosaicResult<()> {
        let edits = std::mem::take(&mut session.edits);
        if edits.is_empty() && event.is_none() {
            return Ok(());
        }
        let inner = Arc::clone(self);
        session.scope.add_completion_action(move || {
            let recomposed = event.is_some();
            let displaced = inner.graph.write().apply(edits);
            for record in &displaced {
                record.release();
            }
            Counters::add(&inner.counters.parts_released, displaced.len());
            if recomposed {
                Counters::bump(&inner.counters.recompositions_committed);
            }
            if let Some(event) = event {
                inner.diagnostics.emit(event);
            }
        })?;
        Ok(())
    }

    // ========================================================================
    // Recomposition
    // ========================================================================

    /// Rebuild whatever `diff` affects, inside a scope nested under `parent`
    /// (or under this thread's open scope, or a new root)
    fn recompose(
        self: &Arc<Self>,
        diff: Arc<CatalogDiff>,
        parent: Option<ScopeHandle>,
    ) -> MosaicResult<RecompositionReport> {
        let _gate = self.gate.lock();
        self.set_state(RecompositionState::DiffComputed);
        let plan = RecompositionPlan::compute(&self.graph.read(), &diff);
        if plan.is_empty() {
            self.set_state(RecompositionState::Idle);
            return Ok(RecompositionReport::default());
        }

        let result = self.run_plan(&plan, diff, parent);
        match &result {
            Ok(report) => {
                info!(
                    target: "mosaic::recompose",
                    affected = report.affected.len(),
                    rebuilt = report.rebuilt.len(),
                    evicted = report.evicted.len(),
                    state = %self.state(),
                    "Recomposition completed"
                );
            }
            Err(e) => {
                self.set_state(RecompositionState::RolledBack);
                Counters::bump(&self.counters.recompositions_rolled_back);
                warn!(
                    target: "mosaic::recompose",
                    affected = plan.affected.len(),
                    error = %e,
                    "Recomposition rolled back"
                );
                self.diagnostics.emit(CompositionEvent::RecompositionFailed {
                    at: Utc::now(),
                    affected: plan.affected.clone(),
                    error: e.to_string(),
                });
            }
        }
        // A merged cycle goes idle when its enclosing scope settles
        let mut state = self.state.lock();
        if *state != RecompositionState::Merged {
            *state = RecompositionState::Idle;
        }
        drop(state);
        result
    }

    fn state(&self) -> RecompositionState {
        *self.state.lock()
    }

    /// Go idle once the enclosing scope of a merged cycle commits or reverts
    fn idle_with(self: &Arc<Self>, scope: &ScopeHandle) -> MosaicResult<()> {
        let idle = || {
            let inner = Arc::clone(self);
            move || {
                let mut state = inner.state.lock();
                if *state == RecompositionState::Merged {
                    *state = RecompositionState::Idle;
                }
            }
        };
        scope.add_completion_action(idle())?;
        scope.add_revert_action(idle())?;
        Ok(())
    }

    fn run_plan(
        self: &Arc<Self>,
        plan: &RecompositionPlan,
        diff: Arc<CatalogDiff>,
        parent: Option<ScopeHandle>,
    ) -> MosaicResult<RecompositionReport> {
        if let Some(rejection) = plan.rejection() {
            return Err(rejection);
        }

        let parent = parent.or_else(|| active_frame(self.id).map(|(scope, _)| scope));
        let nested = parent.is_some();
        let mut scope = AtomicScope::new(parent.as_ref())?;
        self.set_state(RecompositionState::Resolving);

        let view: Arc<dyn Catalog> = diff;
        let mut session = Session::new(Arc::clone(&view), scope.handle(), plan.forced());
        let rebuilt = {
            let _frame = FrameGuard::push(self.id, scope.handle(), view);
            plan.rebuild.iter().try_for_each(|descriptor| {
                self.part_for(&mut session, descriptor)
                    .map(|_| ())
                    .map_err(|e| {
                        MosaicError::composition(primary_contract(descriptor), descriptor.name(), e)
                    })
            })
        };

        let report = plan.report();
        let queued = rebuilt.and_then(|()| {
            session
                .edits
                .extend(plan.evict.iter().map(|d| GraphEdit::Evict(d.id())));
            let event = CompositionEvent::Recomposed {
                at: Utc::now(),
                affected: report.affected.clone(),
                rebuilt: report.rebuilt.clone(),
                evicted: report.evicted.clone(),
            };
            self.publish(&mut session, Some(event))?;
            if nested {
                self.idle_with(&scope.handle())?;
            }
            Ok(())
        });
        if let Err(e) = queued {
            scope.dispose()?;
            return Err(e);
        }
        scope.complete()?;
        // Only a root scope has committed anything by now
        self.set_state(if nested {
            RecompositionState::Merged
        } else {
            RecompositionState::Committed
        });
        Ok(report)
    }
}

/// Catalog listener half of a resolver
struct ChangeRelay {
    inner: Weak<Inner>,
}

impl CatalogChangeListener for ChangeRelay {
    fn catalog_changing(&self, change: &CatalogChange, scope: &ScopeHandle) -> MosaicResult<()> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(());
        };
        inner.diagnostics.emit(CompositionEvent::CatalogChanged {
            at: Utc::now(),
            added: change.added().iter().map(|d| d.name().to_string()).collect(),
            removed: change.removed().iter().map(|d| d.name().to_string()).collect(),
        });

        inner.begin_in_flight();
        let result = inner.recompose(Arc::new(CatalogDiff::from_change(change)), Some(scope.clone()));
        inner.settle_with(scope);
        result.map(|_| ())
    }
}

/// Resolves imports against a catalog and keeps the live graph current
///
/// The resolver subscribes to its catalog on construction and recomposes on
/// every change the catalog announces. Dropping the resolver unsubscribes.
pub struct ExportResolver {
    inner: Arc<Inner>,
    _relay: Arc<dyn CatalogChangeListener>,
    subscription: Option<SubscriptionId>,
}

impl ExportResolver {
    /// Resolver over `catalog`
    pub fn new(catalog: Arc<dyn Catalog>, options: ResolverOptions) -> Self {
        let inner = Arc::new(Inner {
            id: NEXT_RESOLVER_ID.fetch_add(1, Ordering::Relaxed),
            catalog: Arc::clone(&catalog),
            diagnostics: Arc::new(Diagnostics::new(options.event_capacity)),
            options,
            graph: RwLock::new(LiveGraph::new()),
            gate: ReentrantMutex::new(()),
            in_flight: Mutex::new(InFlight::default()),
            settled: Condvar::new(),
            state: Mutex::new(RecompositionState::Idle),
            counters: Arc::new(Counters::default()),
        });
        let relay: Arc<dyn CatalogChangeListener> = Arc::new(ChangeRelay {
            inner: Arc::downgrade(&inner),
        });
        let subscription = catalog.subscribe(Arc::downgrade(&relay));
        debug!(
            target: "mosaic::resolve",
            resolver = inner.id,
            observing = subscription.is_some(),
            "Resolver created"
        );
        Self {
            inner,
            _relay: relay,
            subscription,
        }
    }

    /// Resolver over `catalog` with default options
    pub fn with_defaults(catalog: Arc<dyn Catalog>) -> Self {
        Self::new(catalog, ResolverOptions::default())
    }

    /// The catalog resolved against
    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.inner.catalog
    }

    /// Options in effect
    pub fn options(&self) -> &ResolverOptions {
        &self.inner.options
    }

    /// Resolve `import` honouring its cardinality
    ///
    /// Single-cardinality imports yield at most one export. A failure in a
    /// matched part's own imports is wrapped in [`MosaicError::Composition`];
    /// [`MosaicError::root_cause`] recovers the innermost failure.
    pub fn resolve(&self, import: &ImportDefinition) -> MosaicResult<Vec<Export>> {
        self.inner.resolve(import)
    }

    /// The single export of `contract`
    pub fn get_export(&self, contract: &str) -> MosaicResult<Export> {
        let import = ImportDefinition::new(contract);
        let mut exports = self.inner.resolve(&import)?;
        exports.pop().ok_or_else(|| MosaicError::CardinalityMismatch {
            contract: contract.to_string(),
            cardinality: import.cardinality(),
            found: 0,
        })
    }

    /// Every export of `contract`
    pub fn get_exports(&self, contract: &str) -> MosaicResult<Vec<Export>> {
        self.inner.resolve(&ImportDefinition::many(contract))
    }

    /// The single export of `contract`, downcast to `T`
    ///
    /// `Ok(None)` if the instance is not a `T`.
    pub fn get_exported_value<T: Any + Send + Sync>(&self, contract: &str) -> MosaicResult<Option<Arc<T>>> {
        Ok(self.get_export(contract)?.downcast::<T>())
    }

    /// Recompose for a change to the catalog
    ///
    /// `added` and `removed` are overlaid on the catalog's current
    /// descriptors. Every affected part is rebuilt in one scope; if any
    /// rebuild fails the graph is left as it was and the error returned.
    pub fn on_catalog_changed(
        &self,
        added: &[Arc<ComponentDescriptor>],
        removed: &[Arc<ComponentDescriptor>],
    ) -> MosaicResult<RecompositionReport> {
        self.inner.diagnostics.emit(CompositionEvent::CatalogChanged {
            at: Utc::now(),
            added: added.iter().map(|d| d.name().to_string()).collect(),
            removed: removed.iter().map(|d| d.name().to_string()).collect(),
        });
        let diff = Arc::new(CatalogDiff::new(self.inner.catalog.as_ref(), added, removed));
        self.inner.recompose(diff, None)
    }

    /// The live record for a shared part
    pub fn part(&self, id: DescriptorId) -> Option<Arc<PartRecord>> {
        self.inner.graph.read().get(id).cloned()
    }

    /// The live record for the shared part named `name`
    pub fn part_named(&self, name: &str) -> Option<Arc<PartRecord>> {
        self.inner
            .graph
            .read()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Every live shared part, ordered by name
    pub fn parts(&self) -> Vec<Arc<PartRecord>> {
        let mut parts: Vec<_> = self.inner.graph.read().iter().cloned().collect();
        parts.sort_by(|a, b| a.name().cmp(b.name()));
        parts
    }

    /// Number of batches applied to the live graph
    pub fn graph_version(&self) -> u64 {
        self.inner.graph.read().version()
    }

    /// Current recomposition phase
    pub fn state(&self) -> RecompositionState {
        *self.inner.state.lock()
    }

    /// Counter snapshot
    pub fn metrics(&self) -> ResolverMetrics {
        let live = self.inner.graph.read().len();
        self.inner.counters.snapshot(live)
    }

    /// Receive every diagnostic event from now on
    pub fn subscribe_diagnostics(&self, listener: Arc<dyn DiagnosticListener>) {
        self.inner.diagnostics.subscribe(listener);
    }

    /// Recent diagnostic events, oldest first
    pub fn recent_events(&self) -> Vec<CompositionEvent> {
        self.inner.diagnostics.recent()
    }

    /// The diagnostic sink, for wiring other event sources into it
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.inner.diagnostics
    }

    /// Import sites that currently point at `id`
    pub fn dependents_of(&self, id: DescriptorId) -> Vec<ImportSite> {
        let graph = self.inner.graph.read();
        let mut sites: Vec<ImportSite> = graph
            .iter()
            .flat_map(|p| {
                p.edges()
                    .iter()
                    .filter(|e| e.points_at(id))
                    .map(|e| ImportSite::new(p.name(), e.import.contract_name()))
                    .collect::<Vec<_>>()
            })
            .collect();
        sites.sort();
        sites
    }
}

impl Drop for ExportResolver {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.inner.catalog.unsubscribe(id);
        }
    }
}

impl std::fmt::Debug for ExportResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportResolver")
            .field("id", &self.inner.id)
            .field("parts", &self.inner.graph.read().len())
            .field("state", &*self.inner.state.lock())
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}
