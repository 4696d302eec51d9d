//! Recomposition planning
//!
//! A catalog change is turned into a [`RecompositionPlan`] before any part
//! is rebuilt. Planning only reads the live graph and the diff view, so a
//! plan can be computed and thrown away without side effects.
//!
//! ```text
//! Idle ──> DiffComputed ──> Resolving ──> Committed ──> Idle
//!                               │
//!                               └──────> RolledBack ──> Idle
//! ```

use crate::diagnostics::ImportSite;
use crate::graph::{ImportEdge, LiveGraph};
use mosaic_catalog::{Catalog, CatalogDiff};
use mosaic_core::{select_exports, ComponentDescriptor, DescriptorId, MosaicError};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Phase of the resolver's recomposition cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecompositionState {
    /// No recomposition running
    #[default]
    Idle,
    /// The affected set is being computed
    DiffComputed,
    /// Affected parts are being rebuilt inside a scope
    Resolving,
    /// The scope completed into an enclosing scope and commits or reverts
    /// with it
    Merged,
    /// The root scope completed and the graph took the rebuilds
    Committed,
    /// The scope was disposed
    RolledBack,
}

impl fmt::Display for RecompositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecompositionState::Idle => "idle",
            RecompositionState::DiffComputed => "diff_computed",
            RecompositionState::Resolving => "resolving",
            RecompositionState::Merged => "merged",
            RecompositionState::Committed => "committed",
            RecompositionState::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// Outcome of a committed recomposition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecompositionReport {
    /// Imports re-bound by the change
    pub affected: Vec<ImportSite>,
    /// Parts rebuilt, by name
    pub rebuilt: Vec<String>,
    /// Parts dropped because their descriptor left the catalog, by name
    pub evicted: Vec<String>,
}

impl RecompositionReport {
    /// True if the change touched nothing in the live graph
    pub fn is_noop(&self) -> bool {
        self.affected.is_empty() && self.rebuilt.is_empty() && self.evicted.is_empty()
    }
}

/// What one catalog change does to the live graph
#[derive(Debug, Default)]
pub struct RecompositionPlan {
    /// Imports whose binding changes
    pub affected: Vec<ImportSite>,
    /// Parts to rebuild, ordered by name
    pub rebuild: Vec<Arc<ComponentDescriptor>>,
    /// Parts whose descriptor leaves the catalog
    pub evict: Vec<Arc<ComponentDescriptor>>,
    /// First affected import that does not allow recomposition
    pub rejected: Option<ImportSite>,
}

impl RecompositionPlan {
    /// Plan the change `diff` describes against `graph`
    ///
    /// A part is rebuilt if one of its imports would now select different
    /// exports, or if it depends on a part that is rebuilt or evicted.
    pub fn compute(graph: &LiveGraph, diff: &CatalogDiff) -> Self {
        let mut evict = Vec::new();
        let mut seeds = FxHashSet::default();
        for record in graph.iter() {
            if !diff.contains(record.id()) {
                evict.push(Arc::clone(record.descriptor()));
                seeds.insert(record.id());
            } else if record.edges().iter().any(|e| rebinds(e, diff)) {
                seeds.insert(record.id());
            }
        }

        let changed = graph.dependent_closure(seeds);
        let evicted: FxHashSet<DescriptorId> = evict.iter().map(|d| d.id()).collect();

        let mut rebuild = Vec::new();
        let mut affected = Vec::new();
        let mut rejected = None;
        for record in graph.iter() {
            if !changed.contains(&record.id()) || evicted.contains(&record.id()) {
                continue;
            }
            rebuild.push(Arc::clone(record.descriptor()));
            for edge in record.edges() {
                if !(edge.reaches(&changed) || rebinds(edge, diff)) {
                    continue;
                }
                let site = ImportSite::new(record.name(), edge.import.contract_name());
                if !edge.import.is_recomposable() && rejected.is_none() {
                    rejected = Some(site.clone());
                }
                affected.push(site);
            }
        }

        rebuild.sort_by(|a, b| a.name().cmp(b.name()));
        evict.sort_by(|a, b| a.name().cmp(b.name()));
        affected.sort();
        Self {
            affected,
            rebuild,
            evict,
            rejected,
        }
    }

    /// True if the change touches nothing in the graph
    pub fn is_empty(&self) -> bool {
        self.rebuild.is_empty() && self.evict.is_empty()
    }

    /// The error that forbids this change, if any
    pub fn rejection(&self) -> Option<MosaicError> {
        self.rejected.as_ref().map(|site| MosaicError::ChangeRejected {
            contract: site.contract.clone(),
            part: site.part.clone(),
        })
    }

    /// Descriptors that must not be served from the live graph
    pub fn forced(&self) -> FxHashSet<DescriptorId> {
        self.rebuild.iter().map(|d| d.id()).collect()
    }

    /// Report for this plan once committed
    pub fn report(&self) -> RecompositionReport {
        RecompositionReport {
            affected: self.affected.clone(),
            rebuilt: self.rebuild.iter().map(|d| d.name().to_string()).collect(),
            evicted: self.evict.iter().map(|d| d.name().to_string()).collect(),
        }
    }
}

/// Whether `edge` would select different exports against `view`
pub fn rebinds(edge: &ImportEdge, view: &dyn Catalog) -> bool {
    match select_exports(&edge.import, view.matching_exports(&edge.import)) {
        Ok(selected) => {
            selected.len() != edge.targets.len()
                || selected
                    .iter()
                    .zip(edge.targets.iter())
                    .any(|(m, target)| m.export_ref() != *target)
        }
        Err(_) => true,
    }
}
