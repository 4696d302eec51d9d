//! Directory catalog behavior against a real temporary directory
//!
//! Covers scanning, wholesale replacement of modified sources, isolation of
//! broken sources, change notification and the debouncing pump.

use mosaic_catalog::{
    Catalog, CatalogChange, CatalogChangeListener, DescriptorExtractor, DirectoryCatalog,
    DirectoryOptions, FsEvent, FsEventKind, LoadError, ManifestExtractor, WatchPump,
};
use mosaic_concurrency::ScopeHandle;
use mosaic_core::{ComponentDescriptor, ImportDefinition, MosaicError, MosaicResult};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn manifest(name: &str, contract: &str) -> String {
    format!("[[component]]\nname = \"{name}\"\n\n[[component.export]]\ncontract = \"{contract}\"\n")
}

fn write(dir: &Path, file: &str, text: &str) {
    fs::write(dir.join(file), text).unwrap();
}

fn open(dir: &TempDir, options: DirectoryOptions) -> Arc<DirectoryCatalog> {
    Arc::new(DirectoryCatalog::open(dir.path(), Arc::new(ManifestExtractor::new()), options).unwrap())
}

fn names(catalog: &DirectoryCatalog) -> Vec<String> {
    let mut names: Vec<String> = catalog
        .descriptors()
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    names.sort();
    names
}

#[derive(Default)]
struct Changes {
    seen: Mutex<Vec<(Vec<String>, Vec<String>)>>,
}

impl CatalogChangeListener for Changes {
    fn catalog_changing(&self, change: &CatalogChange, _: &ScopeHandle) -> MosaicResult<()> {
        let added = change.added().iter().map(|d| d.name().to_string()).collect();
        let removed = change.removed().iter().map(|d| d.name().to_string()).collect();
        self.seen.lock().push((added, removed));
        Ok(())
    }
}

#[test]
fn test_open_scans_matching_files_only() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", &manifest("A", "Greeter"));
    write(dir.path(), "b.toml", &manifest("B", "Logger"));
    write(dir.path(), "notes.txt", "not a manifest");

    let catalog = open(&dir, DirectoryOptions::default());
    assert_eq!(names(&catalog), vec!["A", "B"]);
    assert!(catalog.load_errors().is_empty());
    assert_eq!(
        catalog
            .matching_exports(&ImportDefinition::new("Greeter"))
            .len(),
        1
    );
    let origin = catalog.descriptors().iter().find(|d| d.name() == "A").unwrap().origin().map(Path::to_path_buf);
    assert_eq!(origin, Some(dir.path().join("a.toml")));
}

#[test]
fn test_open_rejects_missing_directory() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing");
    let result = DirectoryCatalog::open(&missing, Arc::new(ManifestExtractor::new()), DirectoryOptions::default());
    assert!(result.is_err());
}

#[test]
fn test_recursive_option() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    write(dir.path(), "top.toml", &manifest("Top", "Greeter"));
    write(&dir.path().join("nested"), "deep.toml", &manifest("Deep", "Greeter"));

    let flat = open(&dir, DirectoryOptions::default());
    assert_eq!(names(&flat), vec!["Top"]);

    let deep = open(&dir, DirectoryOptions::default().recursive(true));
    assert_eq!(names(&deep), vec!["Deep", "Top"]);
}

#[test]
fn test_broken_source_is_isolated_and_recovers() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "good.toml", &manifest("Good", "Greeter"));
    write(dir.path(), "bad.toml", "[[component]\nname = ");

    let catalog = open(&dir, DirectoryOptions::default());
    assert_eq!(names(&catalog), vec!["Good"]);
    let errors = catalog.load_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, dir.path().join("bad.toml"));

    write(dir.path(), "bad.toml", &manifest("Fixed", "Logger"));
    catalog.refresh().unwrap();
    assert_eq!(names(&catalog), vec!["Fixed", "Good"]);
    assert!(catalog.load_errors().is_empty());
}

/// Fails the first extraction it is asked for, then defers to manifests
struct FailsOnce {
    failed: AtomicBool,
    inner: ManifestExtractor,
}

impl DescriptorExtractor for FailsOnce {
    fn extract(&self, source: &Path) -> MosaicResult<Vec<Arc<ComponentDescriptor>>> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(MosaicError::Extraction {
                path: source.to_path_buf(),
                message: "file still being written".to_string(),
            });
        }
        self.inner.extract(source)
    }
}

#[test]
fn test_failed_source_is_retried_without_being_touched() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", &manifest("A", "Greeter"));
    let extractor = Arc::new(FailsOnce {
        failed: AtomicBool::new(false),
        inner: ManifestExtractor::new(),
    });
    let catalog = Arc::new(
        DirectoryCatalog::open(dir.path(), extractor, DirectoryOptions::default()).unwrap(),
    );
    let seen: Arc<Mutex<Vec<LoadError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    catalog.on_load_error(Arc::new(move |e: &LoadError| sink_seen.lock().push(e.clone())));

    assert!(names(&catalog).is_empty());
    assert_eq!(catalog.load_errors().len(), 1);

    let report = catalog.refresh().unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(names(&catalog), vec!["A"]);
    assert!(catalog.load_errors().is_empty());
    assert!(seen.lock().is_empty());
}

#[test]
fn test_unchanged_broken_source_is_not_reported_twice() {
    let dir = TempDir::new().unwrap();
    let catalog = open(&dir, DirectoryOptions::default());
    let seen: Arc<Mutex<Vec<LoadError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    catalog.on_load_error(Arc::new(move |e: &LoadError| sink_seen.lock().push(e.clone())));

    write(dir.path(), "bad.toml", "component = 3");
    catalog.refresh().unwrap();
    catalog.refresh().unwrap();
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(catalog.load_errors().len(), 1);
}

#[test]
fn test_load_error_sink_is_told() {
    let dir = TempDir::new().unwrap();
    let catalog = open(&dir, DirectoryOptions::default());
    let seen: Arc<Mutex<Vec<LoadError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    catalog.on_load_error(Arc::new(move |e: &LoadError| sink_seen.lock().push(e.clone())));

    write(dir.path(), "bad.toml", "component = 3");
    catalog.refresh().unwrap();
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_refresh_publishes_add_modify_delete() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", &manifest("A", "Greeter"));
    let catalog = open(&dir, DirectoryOptions::default());

    let changes = Arc::new(Changes::default());
    let listener: Arc<dyn CatalogChangeListener> = changes.clone();
    catalog.subscribe(Arc::downgrade(&listener));

    // Nothing changed
    assert!(catalog.refresh().unwrap().is_noop());

    write(dir.path(), "b.toml", &manifest("B", "Greeter"));
    catalog.refresh().unwrap();

    // Different length guarantees a new fingerprint
    write(dir.path(), "a.toml", &manifest("A2", "Greeter2"));
    catalog.refresh().unwrap();

    fs::remove_file(dir.path().join("b.toml")).unwrap();
    catalog.refresh().unwrap();

    assert_eq!(
        *changes.seen.lock(),
        vec![
            (vec!["B".to_string()], vec![]),
            (vec!["A2".to_string()], vec!["A".to_string()]),
            (vec![], vec!["B".to_string()]),
        ]
    );
    assert_eq!(names(&catalog), vec!["A2"]);
    assert_eq!(catalog.generation(), 4);
}

#[test]
fn test_pump_debounces_bursts_into_one_refresh() {
    let dir = TempDir::new().unwrap();
    let catalog = open(
        &dir,
        DirectoryOptions::default().debounce(Duration::from_millis(50)),
    );
    let pump = WatchPump::spawn(Arc::clone(&catalog)).unwrap();

    write(dir.path(), "a.toml", &manifest("A", "Greeter"));
    write(dir.path(), "b.toml", &manifest("B", "Greeter"));
    for file in ["a.toml", "b.toml", "a.toml"] {
        assert!(pump.submit(FsEvent::new(dir.path().join(file), FsEventKind::Created)));
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while names(&catalog).len() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(names(&catalog), vec!["A", "B"]);

    let stats = pump.stats();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.refreshes, 1);
    pump.shutdown();
    assert!(!pump.submit(FsEvent::new(dir.path().join("a.toml"), FsEventKind::Removed)));
}

#[test]
fn test_pump_ignores_unrelated_files() {
    let dir = TempDir::new().unwrap();
    let catalog = open(
        &dir,
        DirectoryOptions::default().debounce(Duration::from_millis(20)),
    );
    let pump = WatchPump::spawn(Arc::clone(&catalog)).unwrap();

    pump.submit(FsEvent::new(dir.path().join("readme.md"), FsEventKind::Modified));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(pump.stats().refreshes, 0);
}

/// Blocks the first refresh that reaches it until released
struct Gate {
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
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

#[test]
fn test_full_channel_drops_events_while_refreshing() {
    let dir = TempDir::new().unwrap();
    let catalog = open(
        &dir,
        DirectoryOptions::default()
            .channel_capacity(1)
            .debounce(Duration::from_millis(20)),
    );
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gate: Arc<dyn CatalogChangeListener> = Arc::new(Gate {
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(release_rx),
    });
    catalog.subscribe(Arc::downgrade(&gate));

    let pump = WatchPump::spawn(Arc::clone(&catalog)).unwrap();
    write(dir.path(), "a.toml", &manifest("A", "Greeter"));
    assert!(pump.submit(FsEvent::new(dir.path().join("a.toml"), FsEventKind::Created)));

    // The pump is now parked inside refresh and not draining
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let sender = pump.sender();
    for _ in 0..64 {
        assert!(sender.submit(FsEvent::new(dir.path().join("a.toml"), FsEventKind::Modified)));
    }
    let stats = pump.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.dropped, 63);

    release_tx.send(()).unwrap();
    pump.shutdown();
    assert_eq!(names(&catalog), vec!["A"]);
}

#[test]
fn test_dropped_event_still_forces_a_rescan() {
    let dir = TempDir::new().unwrap();
    let catalog = open(
        &dir,
        DirectoryOptions::default()
            .channel_capacity(1)
            .debounce(Duration::from_millis(20)),
    );
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gate: Arc<dyn CatalogChangeListener> = Arc::new(Gate {
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(release_rx),
    });
    catalog.subscribe(Arc::downgrade(&gate));

    let pump = WatchPump::spawn(Arc::clone(&catalog)).unwrap();
    write(dir.path(), "a.toml", &manifest("A", "Greeter"));
    assert!(pump.submit(FsEvent::new(dir.path().join("a.toml"), FsEventKind::Created)));
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // Only the irrelevant event fits; the one that matters is dropped
    assert!(pump.submit(FsEvent::new(dir.path().join("notes.md"), FsEventKind::Modified)));
    write(dir.path(), "b.toml", &manifest("B", "Greeter"));
    assert!(pump.submit(FsEvent::new(dir.path().join("b.toml"), FsEventKind::Created)));
    assert_eq!(pump.stats().dropped, 1);

    release_tx.send(()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while names(&catalog).len() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(names(&catalog), vec!["A", "B"]);
    assert!(pump.stats().refreshes >= 2);
    pump.shutdown();
}
