//! Shared test utilities for the workspace integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use mosaic::{CompositionEvent, Export, GenericPart};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Manifests
// ============================================================================

/// Manifest text for one component
pub struct ManifestBuilder {
    text: String,
}

impl ManifestBuilder {
    pub fn component(name: &str) -> Self {
        Self {
            text: format!("[[component]]\nname = \"{name}\"\n"),
        }
    }

    pub fn export(mut self, contract: &str, priority: i64) -> Self {
        self.text.push_str(&format!(
            "\n[[component.export]]\ncontract = \"{contract}\"\npriority = {priority}\n"
        ));
        self
    }

    pub fn import(mut self, contract: &str) -> Self {
        self.text
            .push_str(&format!("\n[[component.import]]\ncontract = \"{contract}\"\n"));
        self
    }

    pub fn write(self, dir: &Path, file: &str) {
        fs::write(dir.join(file), self.text).unwrap();
    }
}

// ============================================================================
// Exports
// ============================================================================

/// Names of the parts bound into a manifest part's imports
pub fn bound(export: &Export) -> Vec<String> {
    let part = export
        .downcast::<GenericPart>()
        .expect("manifest parts are generic");
    part.imports()
        .iter()
        .flat_map(|(_, exports)| exports.iter().map(|e| e.part_name().to_string()))
        .collect()
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Collects every event a container emits
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<CompositionEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, event: &CompositionEvent) {
        self.events.lock().push(event.clone());
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind()).collect()
    }

    pub fn events(&self) -> Vec<CompositionEvent> {
        self.events.lock().clone()
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}
