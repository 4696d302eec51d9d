//! The live object graph
//!
//! Resolved shared parts and the import edges they were built with. The
//! graph is owned by one resolver and only changes when a batch of
//! [`GraphEdit`]s is applied by a completing scope, so readers never see a
//! half-applied recomposition.

use mosaic_core::{ComponentDescriptor, DescriptorId, ExportRef, ImportDefinition, Instance};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::sync::Arc;

/// The exports one import was bound to
#[derive(Debug, Clone)]
pub struct ImportEdge {
    /// The import as declared by the part
    pub import: ImportDefinition,
    /// Bound exports, in selection order
    pub targets: SmallVec<[ExportRef; 1]>,
    /// Records the targets were taken from, parallel to `targets`
    pub parts: SmallVec<[Arc<PartRecord>; 1]>,
}

impl ImportEdge {
    /// Edge for `import` with nothing bound yet
    pub fn new(import: ImportDefinition) -> Self {
        Self {
            import,
            targets: SmallVec::new(),
            parts: SmallVec::new(),
        }
    }

    /// Bind one export, taken from `part`
    pub fn bind(&mut self, target: ExportRef, part: Arc<PartRecord>) {
        self.targets.push(target);
        self.parts.push(part);
    }

    /// Whether any target belongs to `descriptor`
    pub fn points_at(&self, descriptor: DescriptorId) -> bool {
        self.targets.iter().any(|t| t.descriptor == descriptor)
    }

    /// Whether the edge leads to any of `ids`, directly or through
    /// non-shared parts it holds
    pub fn reaches(&self, ids: &FxHashSet<DescriptorId>) -> bool {
        self.targets.iter().any(|t| ids.contains(&t.descriptor))
            || self
                .parts
                .iter()
                .filter(|p| !p.descriptor().creation_policy().is_shared())
                .any(|p| p.reaches(ids))
    }
}

/// One built part
pub struct PartRecord {
    descriptor: Arc<ComponentDescriptor>,
    instance: Instance,
    edges: Vec<ImportEdge>,
}

impl PartRecord {
    /// Record a freshly built part
    pub fn new(descriptor: Arc<ComponentDescriptor>, instance: Instance, edges: Vec<ImportEdge>) -> Self {
        Self {
            descriptor,
            instance,
            edges,
        }
    }

    /// Descriptor the part was built from
    pub fn descriptor(&self) -> &Arc<ComponentDescriptor> {
        &self.descriptor
    }

    /// Descriptor identity
    pub fn id(&self) -> DescriptorId {
        self.descriptor.id()
    }

    /// Part name
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// The built instance, shared by all the part's exports
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Import edges, one per declared import
    pub fn edges(&self) -> &[ImportEdge] {
        &self.edges
    }

    /// Whether any edge points at `descriptor`
    pub fn depends_on(&self, descriptor: DescriptorId) -> bool {
        self.edges.iter().any(|e| e.points_at(descriptor))
    }

    /// Whether any edge leads to one of `ids`
    pub fn reaches(&self, ids: &FxHashSet<DescriptorId>) -> bool {
        self.edges.iter().any(|e| e.reaches(ids))
    }

    /// Release the instance through the part's factory
    pub fn release(&self) {
        self.descriptor.factory().release(&self.instance);
    }
}

impl std::fmt::Debug for PartRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartRecord")
            .field("part", &self.descriptor.name())
            .field("id", &self.descriptor.id())
            .field("edges", &self.edges)
            .finish_non_exhaustive()
    }
}

/// A pending change to the graph
#[derive(Debug, Clone)]
pub enum GraphEdit {
    /// Insert or replace the record for its descriptor
    Upsert(Arc<PartRecord>),
    /// Drop the record for a descriptor
    Evict(DescriptorId),
}

/// Shared parts by descriptor
#[derive(Debug, Default)]
pub struct LiveGraph {
    parts: FxHashMap<DescriptorId, Arc<PartRecord>>,
    version: u64,
}

impl LiveGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `id`
    pub fn get(&self, id: DescriptorId) -> Option<&Arc<PartRecord>> {
        self.parts.get(&id)
    }

    /// Whether `id` has a record
    pub fn contains(&self, id: DescriptorId) -> bool {
        self.parts.contains_key(&id)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True if nothing has been built
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// All records, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PartRecord>> {
        self.parts.values()
    }

    /// Number of edit batches applied
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Parts with an edge pointing at `id`
    pub fn dependents_of(&self, id: DescriptorId) -> Vec<DescriptorId> {
        self.parts
            .values()
            .filter(|p| p.depends_on(id))
            .map(|p| p.id())
            .collect()
    }

    /// `seeds` plus every part that transitively depends on one of them
    pub fn dependent_closure(&self, seeds: FxHashSet<DescriptorId>) -> FxHashSet<DescriptorId> {
        let mut closure = seeds;
        loop {
            let grown: Vec<DescriptorId> = self
                .parts
                .values()
                .filter(|p| !closure.contains(&p.id()) && p.reaches(&closure))
                .map(|p| p.id())
                .collect();
            if grown.is_empty() {
                return closure;
            }
            closure.extend(grown);
        }
    }

    /// Apply a batch, returning the records it displaced
    ///
    /// A record replaced by an identical `Arc` is not reported.
    pub fn apply(&mut self, edits: Vec<GraphEdit>) -> Vec<Arc<PartRecord>> {
        let mut displaced = Vec::new();
        for edit in edits {
            match edit {
                GraphEdit::Upsert(record) => {
                    if let Some(old) = self.parts.insert(record.id(), Arc::clone(&record)) {
                        if !Arc::ptr_eq(&old, &record) {
                            displaced.push(old);
                        }
                    }
                }
                GraphEdit::Evict(id) => {
                    if let Some(old) = self.parts.remove(&id) {
                        displaced.push(old);
                    }
                }
            }
        }
        self.version += 1;
        displaced
    }
}
