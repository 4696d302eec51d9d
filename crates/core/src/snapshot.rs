//! Immutable descriptor snapshots and export matching
//!
//! Catalogs hand out [`DescriptorSnapshot`]s: cheap-to-clone, immutable views
//! of their descriptor set. Concurrent readers iterate a snapshot while the
//! catalog rescans and publishes a new one, so a read never races a refresh.
//!
//! Matching and selection live here so that every catalog (and the diff
//! overlay) applies exactly the same rules.

use crate::contract::{ExportDefinition, ImportCardinality, ImportDefinition};
use crate::descriptor::{ComponentDescriptor, DescriptorId, ExportRef};
use crate::error::{MosaicError, MosaicResult};
use std::collections::HashSet;
use std::sync::Arc;

/// One export of one descriptor that satisfies an import
#[derive(Debug, Clone)]
pub struct ExportMatch {
    descriptor: Arc<ComponentDescriptor>,
    index: usize,
}

impl ExportMatch {
    /// Create a match for the export at `index` of `descriptor`
    pub fn new(descriptor: Arc<ComponentDescriptor>, index: usize) -> Self {
        Self { descriptor, index }
    }

    /// Owning descriptor
    pub fn descriptor(&self) -> &Arc<ComponentDescriptor> {
        &self.descriptor
    }

    /// Export position within the descriptor
    pub fn index(&self) -> usize {
        self.index
    }

    /// The matched export definition
    pub fn definition(&self) -> &ExportDefinition {
        &self.descriptor.exports()[self.index]
    }

    /// Reference to the matched export
    pub fn export_ref(&self) -> ExportRef {
        self.descriptor.export_ref(self.index)
    }
}

/// Immutable, ordered view of a descriptor set
///
/// Iteration order is the order descriptors were published in, which is
/// stable for a fixed catalog state.
#[derive(Debug, Clone)]
pub struct DescriptorSnapshot {
    items: Arc<[Arc<ComponentDescriptor>]>,
}

impl DescriptorSnapshot {
    /// Snapshot over `descriptors`
    pub fn new(descriptors: Vec<Arc<ComponentDescriptor>>) -> Self {
        Self {
            items: descriptors.into(),
        }
    }

    /// Empty snapshot
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if there are no descriptors
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate descriptors; restartable by calling again
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<ComponentDescriptor>> {
        self.items.iter()
    }

    /// Descriptors as a slice
    pub fn as_slice(&self) -> &[Arc<ComponentDescriptor>] {
        &self.items
    }

    /// Whether a descriptor with `id` is present
    pub fn contains(&self, id: DescriptorId) -> bool {
        self.items.iter().any(|d| d.id() == id)
    }

    /// Descriptor with `id`
    pub fn get(&self, id: DescriptorId) -> Option<&Arc<ComponentDescriptor>> {
        self.items.iter().find(|d| d.id() == id)
    }

    /// Identities of every descriptor
    pub fn ids(&self) -> HashSet<DescriptorId> {
        self.items.iter().map(|d| d.id()).collect()
    }

    /// `(self ∪ added) − removed`, compared by identity
    ///
    /// Existing descriptors keep their order; new ones are appended in the
    /// order given. A descriptor both added and removed ends up absent.
    pub fn with_changes(
        &self,
        added: &[Arc<ComponentDescriptor>],
        removed: &[Arc<ComponentDescriptor>],
    ) -> DescriptorSnapshot {
        let removed: HashSet<DescriptorId> = removed.iter().map(|d| d.id()).collect();
        let mut seen: HashSet<DescriptorId> = HashSet::with_capacity(self.len() + added.len());
        let mut items = Vec::with_capacity(self.len() + added.len());
        for descriptor in self.items.iter().chain(added.iter()) {
            if removed.contains(&descriptor.id()) || !seen.insert(descriptor.id()) {
                continue;
            }
            items.push(Arc::clone(descriptor));
        }
        DescriptorSnapshot::new(items)
    }

    /// Every export that satisfies `import`, in snapshot then declaration order
    pub fn matching_exports(&self, import: &ImportDefinition) -> Vec<ExportMatch> {
        matching_exports_in(self.items.iter(), import)
    }
}

impl Default for DescriptorSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Arc<ComponentDescriptor>> for DescriptorSnapshot {
    fn from_iter<I: IntoIterator<Item = Arc<ComponentDescriptor>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DescriptorSnapshot {
    type Item = &'a Arc<ComponentDescriptor>;
    type IntoIter = std::slice::Iter<'a, Arc<ComponentDescriptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Every export among `descriptors` that satisfies `import`
pub fn matching_exports_in<'a>(
    descriptors: impl IntoIterator<Item = &'a Arc<ComponentDescriptor>>,
    import: &ImportDefinition,
) -> Vec<ExportMatch> {
    let mut matches = Vec::new();
    for descriptor in descriptors {
        for (index, export) in descriptor.exports().iter().enumerate() {
            if import.is_constraint_satisfied_by(export) {
                matches.push(ExportMatch::new(Arc::clone(descriptor), index));
            }
        }
    }
    matches
}

/// Apply cardinality and the priority tie-break to candidate exports
///
/// - `ZeroOrMore`: every candidate, order preserved.
/// - Single cardinality with several candidates: the unique candidate with
///   the highest `Priority` metadata wins. A tie at the top is ambiguous and
///   reported as a cardinality mismatch.
/// - `ExactlyOne` with no candidate is a cardinality mismatch; `ZeroOrOne`
///   with no candidate selects nothing.
pub fn select_exports(
    import: &ImportDefinition,
    candidates: Vec<ExportMatch>,
) -> MosaicResult<Vec<ExportMatch>> {
    let cardinality = import.cardinality();
    if !cardinality.is_single() {
        return Ok(candidates);
    }

    let mismatch = |found: usize| MosaicError::CardinalityMismatch {
        contract: import.contract_name().to_string(),
        cardinality,
        found,
    };

    match candidates.len() {
        0 if cardinality == ImportCardinality::ExactlyOne => Err(mismatch(0)),
        0 | 1 => Ok(candidates),
        found => {
            let top = candidates
                .iter()
                .map(|m| m.definition().priority())
                .max()
                .unwrap_or(0);
            let winners: Vec<ExportMatch> = candidates
                .into_iter()
                .filter(|m| m.definition().priority() == top)
                .collect();
            if winners.len() == 1 {
                Ok(winners)
            } else {
                Err(mismatch(found))
            }
        }
    }
}
