//! Container Scenarios
//!
//! A container composes App from whatever Greeter its catalogs offer and
//! keeps the composition consistent as catalogs change underneath it.

use crate::common::*;
use mosaic::{
    Catalog, ComponentCatalog, ComponentDescriptor, CompositionContainer, CompositionEvent,
    ExportDefinition, ImportDefinition, MosaicConfig, MosaicError,
};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn greeter(name: &str, priority: i64) -> Arc<ComponentDescriptor> {
    ComponentDescriptor::builder(name)
        .export(ExportDefinition::new("Greeter").with_priority(priority))
        .build()
}

fn app() -> Arc<ComponentDescriptor> {
    ComponentDescriptor::builder("B")
        .export(ExportDefinition::new("App"))
        .import(ImportDefinition::new("Greeter"))
        .build()
}

fn observed(container: &CompositionContainer) -> Arc<EventLog> {
    let log = EventLog::new();
    let sink = Arc::clone(&log);
    container.subscribe_diagnostics(Arc::new(move |event: &CompositionEvent| sink.record(event)));
    log
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn removing_the_only_dependency_keeps_last_good_graph() {
    let container = CompositionContainer::new();
    let log = observed(&container);
    let a = greeter("A", 0);
    let catalog = Arc::new(ComponentCatalog::with_descriptors(vec![a.clone(), app()]));
    container.add_catalog(Arc::clone(&catalog) as Arc<dyn Catalog>).unwrap();

    let held = container.get_export("App").unwrap();
    assert_eq!(bound(&held), vec!["A"]);

    let report = catalog.remove(a.id()).unwrap();
    assert_eq!(report.listener_failures.len(), 1);

    let err = container.get_export("App").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        MosaicError::CardinalityMismatch { contract, found: 0, .. } if contract == "Greeter"
    ));
    assert_eq!(bound(&held), vec!["A"]);
    assert!(log
        .events()
        .iter()
        .any(|e| matches!(e, CompositionEvent::RecompositionFailed { .. })));

    // Once a greeter is back, App composes again
    catalog.add(greeter("A2", 0)).unwrap();
    assert_eq!(bound(&container.get_export("App").unwrap()), vec!["A2"]);
}

#[test]
fn plugging_in_a_preferred_catalog_rebinds_and_unplugging_restores() {
    let container = CompositionContainer::new();
    container
        .add_catalog(Arc::new(ComponentCatalog::with_descriptors(vec![
            greeter("A", 0),
            app(),
        ])))
        .unwrap();
    assert_eq!(bound(&container.get_export("App").unwrap()), vec!["A"]);

    let (preferred, report) = container
        .add_catalog(Arc::new(ComponentCatalog::with_descriptors(vec![greeter("A2", 5)])))
        .unwrap();
    assert!(report.listener_failures.is_empty());
    assert_eq!(bound(&container.get_export("App").unwrap()), vec!["A2"]);

    let report = container.remove_catalog(preferred).unwrap().unwrap();
    assert!(report.listener_failures.is_empty());
    assert_eq!(bound(&container.get_export("App").unwrap()), vec!["A"]);

    let metrics = container.metrics();
    assert_eq!(metrics.recompositions_committed, 2);
    assert_eq!(metrics.recompositions_rolled_back, 0);
    assert_eq!(metrics.live_parts, 2);
}

#[test]
fn collection_import_spans_catalogs() {
    let container = CompositionContainer::new();
    let board = ComponentDescriptor::builder("Board")
        .export(ExportDefinition::new("Board"))
        .import(ImportDefinition::many("Greeter"))
        .build();
    container
        .add_catalog(Arc::new(ComponentCatalog::with_descriptors(vec![board])))
        .unwrap();
    assert!(bound(&container.get_export("Board").unwrap()).is_empty());

    container
        .add_catalog(Arc::new(ComponentCatalog::with_descriptors(vec![greeter("A", 0)])))
        .unwrap();
    container
        .add_catalog(Arc::new(ComponentCatalog::with_descriptors(vec![greeter("A2", 0)])))
        .unwrap();
    assert_eq!(bound(&container.get_export("Board").unwrap()), vec!["A", "A2"]);
    assert_eq!(container.get_exports("Greeter").unwrap().len(), 2);
}

#[test]
fn configured_depth_limit_applies_to_container() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(mosaic::CONFIG_FILE_NAME),
        "[resolver]\nmax_depth = 1\n",
    )
    .unwrap();
    let container = CompositionContainer::open_config_dir(dir.path()).unwrap();
    assert_eq!(container.config().resolver.max_depth, 1);

    container
        .add_catalog(Arc::new(ComponentCatalog::with_descriptors(vec![
            greeter("A", 0),
            app(),
        ])))
        .unwrap();
    let err = container.get_export("App").unwrap_err();
    assert!(matches!(err.root_cause(), MosaicError::DepthExceeded { max_depth: 1, .. }));
    assert!(container.get_export("Greeter").is_ok());
}

#[test]
fn default_config_round_trips_through_file() {
    let dir = TempDir::new().unwrap();
    let container = CompositionContainer::open_config_dir(dir.path()).unwrap();
    let reloaded = MosaicConfig::from_file(&dir.path().join(mosaic::CONFIG_FILE_NAME)).unwrap();
    assert_eq!(container.config(), &reloaded);
}
