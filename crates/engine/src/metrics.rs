//! Resolver counters
//!
//! # Memory Ordering
//!
//! Every counter uses Relaxed ordering. They are observational only and
//! never synchronize other memory; approximate cross-counter consistency is
//! acceptable.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) exports_served: AtomicU64,
    pub(crate) parts_created: AtomicU64,
    pub(crate) parts_released: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) recompositions_committed: AtomicU64,
    pub(crate) recompositions_rolled_back: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, live_parts: usize) -> ResolverMetrics {
        ResolverMetrics {
            exports_served: self.exports_served.load(Ordering::Relaxed),
            parts_created: self.parts_created.load(Ordering::Relaxed),
            parts_released: self.parts_released.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            recompositions_committed: self.recompositions_committed.load(Ordering::Relaxed),
            recompositions_rolled_back: self.recompositions_rolled_back.load(Ordering::Relaxed),
            live_parts,
        }
    }
}

/// Resolver metrics
///
/// Provides statistics about resolution and recomposition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverMetrics {
    /// Exports handed to callers
    pub exports_served: u64,
    /// Instances built by part factories
    pub parts_created: u64,
    /// Instances handed back to their factories
    pub parts_released: u64,
    /// Shared parts served from the live graph or the open scope
    pub cache_hits: u64,
    /// Recompositions that committed
    pub recompositions_committed: u64,
    /// Recompositions that rolled back
    pub recompositions_rolled_back: u64,
    /// Shared parts in the live graph
    pub live_parts: usize,
}

impl ResolverMetrics {
    /// Recompositions attempted
    pub fn recompositions(&self) -> u64 {
        self.recompositions_committed + self.recompositions_rolled_back
    }

    /// Instances built and not yet released
    pub fn outstanding_parts(&self) -> u64 {
        self.parts_created.saturating_sub(self.parts_released)
    }
}
