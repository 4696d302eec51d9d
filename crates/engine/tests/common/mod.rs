//! Shared fixtures for engine integration tests
#![allow(dead_code)]

use mosaic_catalog::{CatalogChange, CatalogChangeListener};
use mosaic_concurrency::ScopeHandle;
use mosaic_core::{
    ComponentDescriptor, Export, ExportDefinition, ImportDefinition, ImportValues, Instance,
    MosaicResult, PartFactory,
};
use parking_lot::Mutex;
use std::sync::{mpsc, Arc};

/// Instance built by [`Tracked`]: its name and the parts it was given
#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub deps: Vec<String>,
}

/// Records factory calls across a test
#[derive(Default)]
pub struct Tracker {
    created: Mutex<Vec<String>>,
    released: Mutex<Vec<String>>,
}

impl Tracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().clone()
    }

    pub fn created_count(&self, name: &str) -> usize {
        self.created.lock().iter().filter(|n| *n == name).count()
    }
}

pub struct Tracked {
    name: String,
    tracker: Arc<Tracker>,
}

impl PartFactory for Tracked {
    fn create(&self, imports: &ImportValues) -> MosaicResult<Instance> {
        self.tracker.created.lock().push(self.name.clone());
        let deps = imports
            .iter()
            .flat_map(|(_, exports)| exports.iter().map(|e| e.part_name().to_string()))
            .collect();
        Ok(Arc::new(Node {
            name: self.name.clone(),
            deps,
        }))
    }

    fn release(&self, _instance: &Instance) {
        self.tracker.released.lock().push(self.name.clone());
    }
}

/// Tracked part `name` exporting `export` and importing `imports`
pub fn part(
    tracker: &Arc<Tracker>,
    name: &str,
    export: ExportDefinition,
    imports: Vec<ImportDefinition>,
) -> Arc<ComponentDescriptor> {
    let mut builder = ComponentDescriptor::builder(name).export(export);
    for import in imports {
        builder = builder.import(import);
    }
    builder
        .factory(Tracked {
            name: name.to_string(),
            tracker: Arc::clone(tracker),
        })
        .build()
}

/// Names of the parts bound into the node behind `export`
pub fn deps(export: &Export) -> Vec<String> {
    export
        .downcast::<Node>()
        .map(|n| n.deps.clone())
        .unwrap_or_default()
}

/// Blocks the first change it sees until released
pub struct Gate {
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl Gate {
    /// The gate, a receiver told when a change is parked, and the release switch
    pub fn new() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Arc::new(Self {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        });
        (gate, entered_rx, release_tx)
    }
}

impl CatalogChangeListener for Gate {
    fn catalog_changing(&self, _: &CatalogChange, _: &ScopeHandle) -> MosaicResult<()> {
        if let Some(entered) = self.entered.lock().take() {
            entered.send(()).unwrap();
            self.release.lock().recv().unwrap();
        }
        Ok(())
    }
}
