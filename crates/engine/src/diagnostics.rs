//! Composition diagnostics
//!
//! Recomposition runs on whatever thread delivered the catalog change, so
//! its outcome cannot be returned to the host. It is published here
//! instead: to every subscribed [`DiagnosticListener`] and into a bounded
//! ring of recent events.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// One import of one part
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImportSite {
    /// Importing part
    pub part: String,
    /// Imported contract
    pub contract: String,
}

impl ImportSite {
    /// Site for `part` importing `contract`
    pub fn new(part: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            part: part.into(),
            contract: contract.into(),
        }
    }
}

impl fmt::Display for ImportSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.part, self.contract)
    }
}

/// Something the host may want to know about
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionEvent {
    /// A catalog change reached the resolver
    CatalogChanged {
        /// When it was observed
        at: DateTime<Utc>,
        /// Names of descriptors added
        added: Vec<String>,
        /// Names of descriptors removed
        removed: Vec<String>,
    },
    /// A recomposition committed
    Recomposed {
        /// When it committed
        at: DateTime<Utc>,
        /// Imports re-bound by the change
        affected: Vec<ImportSite>,
        /// Parts rebuilt
        rebuilt: Vec<String>,
        /// Parts dropped because their descriptor left the catalog
        evicted: Vec<String>,
    },
    /// A recomposition rolled back; the live graph is unchanged
    RecompositionFailed {
        /// When it rolled back
        at: DateTime<Utc>,
        /// Imports the change would have re-bound
        affected: Vec<ImportSite>,
        /// Why it failed
        error: String,
    },
    /// A catalog source could not be turned into descriptors
    ExtractionFailed {
        /// When it was observed
        at: DateTime<Utc>,
        /// The source
        path: PathBuf,
        /// Why it failed
        message: String,
    },
}

impl CompositionEvent {
    /// When the event happened
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            CompositionEvent::CatalogChanged { at, .. }
            | CompositionEvent::Recomposed { at, .. }
            | CompositionEvent::RecompositionFailed { at, .. }
            | CompositionEvent::ExtractionFailed { at, .. } => *at,
        }
    }

    /// Short kind name, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            CompositionEvent::CatalogChanged { .. } => "catalog_changed",
            CompositionEvent::Recomposed { .. } => "recomposed",
            CompositionEvent::RecompositionFailed { .. } => "recomposition_failed",
            CompositionEvent::ExtractionFailed { .. } => "extraction_failed",
        }
    }

    /// True for the failure variants
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CompositionEvent::RecompositionFailed { .. } | CompositionEvent::ExtractionFailed { .. }
        )
    }
}

/// Receiver of composition events
pub trait DiagnosticListener: Send + Sync {
    /// Called once per event, on the thread that produced it
    fn on_event(&self, event: &CompositionEvent);
}

impl<F> DiagnosticListener for F
where
    F: Fn(&CompositionEvent) + Send + Sync,
{
    fn on_event(&self, event: &CompositionEvent) {
        self(event)
    }
}

/// Fan-out plus ring buffer of recent events
pub struct Diagnostics {
    listeners: RwLock<Vec<Arc<dyn DiagnosticListener>>>,
    recent: Mutex<VecDeque<CompositionEvent>>,
    capacity: usize,
}

impl Diagnostics {
    /// Keep at most `capacity` recent events
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            recent: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Add a listener
    pub fn subscribe(&self, listener: Arc<dyn DiagnosticListener>) {
        self.listeners.write().push(listener);
    }

    /// Record `event` and deliver it
    pub fn emit(&self, event: CompositionEvent) {
        tracing::trace!(target: "mosaic::recompose", kind = event.kind(), "Diagnostic event");
        let listeners: Vec<_> = self.listeners.read().iter().cloned().collect();
        for listener in &listeners {
            listener.on_event(&event);
        }
        if self.capacity > 0 {
            let mut recent = self.recent.lock();
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(event);
        }
    }

    /// Recent events, oldest first
    pub fn recent(&self) -> Vec<CompositionEvent> {
        self.recent.lock().iter().cloned().collect()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("listeners", &self.listeners.read().len())
            .field("recent", &self.recent.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction(n: usize) -> CompositionEvent {
        CompositionEvent::ExtractionFailed {
            at: Utc::now(),
            path: PathBuf::from(format!("{n}.toml")),
            message: "bad".to_string(),
        }
    }

    #[test]
    fn test_ring_keeps_newest() {
        let diagnostics = Diagnostics::new(2);
        for n in 0..3 {
            diagnostics.emit(extraction(n));
        }
        let recent = diagnostics.recent();
        assert_eq!(recent.len(), 2);
        assert!(matches!(&recent[0], CompositionEvent::ExtractionFailed { path, .. } if path == &PathBuf::from("1.toml")));
    }

    #[test]
    fn test_listeners_receive_events() {
        let diagnostics = Diagnostics::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        diagnostics.subscribe(Arc::new(move |e: &CompositionEvent| sink.lock().push(e.kind())));

        diagnostics.emit(extraction(0));
        assert_eq!(*seen.lock(), vec!["extraction_failed"]);
        assert!(diagnostics.recent().is_empty());
    }
}
