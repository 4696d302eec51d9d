//! Directory Catalogs in a Container
//!
//! Manifest directories feed the container; broken manifests surface as
//! diagnostics instead of failing the directory.

use crate::common::*;
use mosaic::{
    CompositionContainer, CompositionEvent, DirectoryCatalog, ManifestExtractor, MosaicConfig,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn extractor() -> Arc<ManifestExtractor> {
    Arc::new(ManifestExtractor::new())
}

fn seed(dir: &TempDir) {
    ManifestBuilder::component("A")
        .export("Greeter", 0)
        .write(dir.path(), "greeter.toml");
    ManifestBuilder::component("B")
        .export("App", 0)
        .import("Greeter")
        .write(dir.path(), "app.toml");
}

fn extraction_failures(container: &CompositionContainer) -> Vec<String> {
    container
        .recent_events()
        .into_iter()
        .filter_map(|e| match e {
            CompositionEvent::ExtractionFailed { path, .. } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn refresh(directory: &DirectoryCatalog) {
    let report = directory.refresh().unwrap();
    assert!(report.listener_failures.is_empty(), "{:?}", report.listener_failures);
}

#[test]
fn directory_manifests_compose() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    let container = CompositionContainer::new();
    let (_, directory) = container.add_directory(dir.path(), extractor(), false).unwrap();
    assert_eq!(directory.sources().len(), 2);

    let app = container.get_export("App").unwrap();
    assert_eq!(app.part_name(), "B");
    assert_eq!(bound(&app), vec!["A"]);
}

#[test]
fn broken_manifest_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    fs::write(dir.path().join("broken.toml"), "[[component]\nname = ").unwrap();

    let container = CompositionContainer::new();
    let (_, directory) = container.add_directory(dir.path(), extractor(), false).unwrap();
    assert_eq!(extraction_failures(&container), vec!["broken.toml"]);
    assert!(container.get_export("App").is_ok());

    // Failures found by later scans reach diagnostics too
    fs::write(dir.path().join("broken.toml"), "[[component]]\nname = \"\"\n").unwrap();
    refresh(&directory);
    assert_eq!(extraction_failures(&container), vec!["broken.toml", "broken.toml"]);
    assert_eq!(directory.load_errors().len(), 1);
}

#[test]
fn refresh_rebinds_to_new_manifests() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    let container = CompositionContainer::new();
    let (_, directory) = container.add_directory(dir.path(), extractor(), false).unwrap();
    assert_eq!(bound(&container.get_export("App").unwrap()), vec!["A"]);

    ManifestBuilder::component("A2")
        .export("Greeter", 5)
        .write(dir.path(), "preferred.toml");
    refresh(&directory);
    assert_eq!(bound(&container.get_export("App").unwrap()), vec!["A2"]);

    fs::remove_file(dir.path().join("preferred.toml")).unwrap();
    refresh(&directory);
    assert_eq!(bound(&container.get_export("App").unwrap()), vec!["A"]);
    assert_eq!(container.metrics().recompositions_committed, 2);
}

#[test]
fn removing_directory_catalog_drops_its_parts() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    let container = CompositionContainer::new();
    let (id, _) = container.add_directory(dir.path(), extractor(), false).unwrap();
    container.get_export("App").unwrap();
    assert_eq!(container.metrics().live_parts, 2);

    let report = container.remove_catalog(id).unwrap().unwrap();
    assert_eq!(report.removed, 2);
    assert!(report.listener_failures.is_empty());
    assert_eq!(container.metrics().live_parts, 0);
    assert!(container.get_export("App").is_err());
}

#[test]
fn configured_extension_selects_sources() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    ManifestBuilder::component("Part")
        .export("Other", 0)
        .write(dir.path(), "other.part");

    let config = MosaicConfig::from_toml_str("[directory]\nextension = \"part\"\n").unwrap();
    let container = CompositionContainer::with_config(config);
    container.add_directory(dir.path(), extractor(), false).unwrap();
    assert!(container.get_export("Other").is_ok());
    assert!(container.get_export("App").is_err());
}

#[test]
fn watched_directory_picks_up_new_manifests() {
    let dir = TempDir::new().unwrap();
    ManifestBuilder::component("B")
        .export("App", 0)
        .import("Greeter")
        .write(dir.path(), "app.toml");
    let container = CompositionContainer::new();
    container.add_directory(dir.path(), extractor(), true).unwrap();
    assert!(container.get_export("App").is_err());

    ManifestBuilder::component("A")
        .export("Greeter", 0)
        .write(dir.path(), "greeter.toml");
    assert!(wait_until(Duration::from_secs(10), || container
        .get_export("App")
        .is_ok()));
}
