//! Directory-backed catalog
//!
//! Scans a directory for component sources and rescans on [`refresh`].
//! Each source is fingerprinted by size and modification time; a source
//! whose fingerprint changed is re-extracted and replaces its previous
//! descriptors wholesale. A source that fails to extract contributes no
//! descriptors and is recorded in [`load_errors`] instead of failing the
//! refresh. Failed sources are extracted again on every refresh, so a
//! transient failure clears without the file being touched.
//!
//! All filesystem work happens before the change protocol starts, so no
//! I/O runs while a scope is open.
//!
//! [`refresh`]: DirectoryCatalog::refresh
//! [`load_errors`]: DirectoryCatalog::load_errors

use crate::notifier::{ChangeNotifier, ChangeReport};
use crate::traits::{Catalog, CatalogChange, CatalogChangeListener, DescriptorExtractor, SubscriptionId};
use chrono::{DateTime, Utc};
use mosaic_core::{ComponentDescriptor, DescriptorSnapshot, MosaicError, MosaicResult};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default source extension
pub const DEFAULT_EXTENSION: &str = "toml";

/// Options for a [`DirectoryCatalog`] and its watcher
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryOptions {
    /// Extension of source files, without the dot
    pub extension: String,
    /// Descend into subdirectories
    pub recursive: bool,
    /// Quiet period before a burst of filesystem events triggers a rescan
    pub debounce: Duration,
    /// Capacity of the watcher's event channel
    pub channel_capacity: usize,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            recursive: false,
            debounce: Duration::from_millis(100),
            channel_capacity: 256,
        }
    }
}

impl DirectoryOptions {
    /// Set the source extension
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Scan subdirectories too
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set the watcher debounce window
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the watcher channel capacity (at least 1)
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Whether `path` names a source file under these options
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

/// A source that could not be loaded
#[derive(Debug, Clone, PartialEq)]
pub struct LoadError {
    /// Offending file
    pub path: PathBuf,
    /// Why it failed
    pub message: String,
    /// When the failure was observed
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone)]
struct Source {
    fingerprint: Fingerprint,
    descriptors: Vec<Arc<ComponentDescriptor>>,
    error: Option<LoadError>,
}

/// Callback told about every source that fails to load
pub type LoadErrorSink = Arc<dyn Fn(&LoadError) + Send + Sync>;

/// Catalog of the component sources found in one directory
pub struct DirectoryCatalog {
    path: PathBuf,
    options: DirectoryOptions,
    extractor: Arc<dyn DescriptorExtractor>,
    snapshot: Arc<RwLock<DescriptorSnapshot>>,
    sources: Mutex<BTreeMap<PathBuf, Source>>,
    notifier: ChangeNotifier,
    change_lock: ReentrantMutex<()>,
    generation: AtomicU64,
    error_sink: RwLock<Option<LoadErrorSink>>,
}

impl DirectoryCatalog {
    /// Open a catalog over `path` and load it
    ///
    /// Fails if `path` is not a readable directory. Sources that fail to
    /// extract do not fail the open; see [`DirectoryCatalog::load_errors`].
    pub fn open(
        path: impl AsRef<Path>,
        extractor: Arc<dyn DescriptorExtractor>,
        options: DirectoryOptions,
    ) -> MosaicResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !std::fs::metadata(&path)?.is_dir() {
            return Err(MosaicError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("'{}' is not a directory", path.display()),
            )));
        }

        let catalog = Self {
            path,
            options,
            extractor,
            snapshot: Arc::new(RwLock::new(DescriptorSnapshot::empty())),
            sources: Mutex::new(BTreeMap::new()),
            notifier: ChangeNotifier::new(),
            change_lock: ReentrantMutex::new(()),
            generation: AtomicU64::new(0),
            error_sink: RwLock::new(None),
        };
        let report = catalog.refresh()?;
        info!(
            target: "mosaic::catalog",
            path = %catalog.path.display(),
            descriptors = report.added,
            errors = catalog.load_errors().len(),
            "Directory catalog opened"
        );
        Ok(catalog)
    }

    /// Directory being scanned
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan options
    pub fn options(&self) -> &DirectoryOptions {
        &self.options
    }

    /// Number of published changes so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Sources that failed to load on the most recent scan, by path
    pub fn load_errors(&self) -> Vec<LoadError> {
        self.sources
            .lock()
            .values()
            .filter_map(|s| s.error.clone())
            .collect()
    }

    /// Paths currently contributing descriptors or errors
    pub fn sources(&self) -> Vec<PathBuf> {
        self.sources.lock().keys().cloned().collect()
    }

    /// Report future load failures to `sink`
    pub fn on_load_error(&self, sink: LoadErrorSink) {
        *self.error_sink.write() = Some(sink);
    }

    /// Rescan the directory and publish what changed as one catalog change
    ///
    /// Fails only if the directory itself cannot be read.
    pub fn refresh(&self) -> MosaicResult<ChangeReport> {
        let _guard = self.change_lock.lock();
        let found = self.scan()?;

        let mut sources = self.sources.lock();
        let mut added: Vec<Arc<ComponentDescriptor>> = Vec::new();
        let mut removed: Vec<Arc<ComponentDescriptor>> = Vec::new();
        let mut next: BTreeMap<PathBuf, Source> = BTreeMap::new();
        let mut failures: Vec<LoadError> = Vec::new();

        for (path, fingerprint) in found {
            match sources.remove(&path) {
                Some(existing) if existing.fingerprint == fingerprint && existing.error.is_none() => {
                    next.insert(path, existing);
                }
                previous => {
                    // A failed source is retried even when its fingerprint is unchanged
                    let mut retried = false;
                    if let Some(previous) = previous {
                        retried = previous.fingerprint == fingerprint;
                        if !retried {
                            debug!(target: "mosaic::catalog", path = %path.display(), "Source modified");
                        }
                        removed.extend(previous.descriptors);
                    }
                    let source = self.load(&path, fingerprint);
                    added.extend(source.descriptors.iter().cloned());
                    // The sink already heard about an unchanged source that still fails
                    if !retried {
                        failures.extend(source.error.clone());
                    }
                    next.insert(path, source);
                }
            }
        }
        // Whatever was not seen again has been deleted
        for (path, gone) in std::mem::take(&mut *sources) {
            debug!(target: "mosaic::catalog", path = %path.display(), "Source removed");
            removed.extend(gone.descriptors);
        }
        *sources = next;
        drop(sources);

        let sink = self.error_sink.read().clone();
        if let Some(sink) = sink {
            for failure in &failures {
                sink(failure);
            }
        }

        let base = self.snapshot.read().clone();
        let change = CatalogChange::new(base, added, removed);
        if change.is_empty() {
            return Ok(ChangeReport::default());
        }

        let snapshot = Arc::clone(&self.snapshot);
        let (added, removed) = (change.added().to_vec(), change.removed().to_vec());
        let report = self.notifier.publish(change, move || {
            let mut current = snapshot.write();
            *current = current.with_changes(&added, &removed);
        })?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        info!(
            target: "mosaic::catalog",
            path = %self.path.display(),
            added = report.added,
            removed = report.removed,
            "Directory catalog refreshed"
        );
        Ok(report)
    }

    fn scan(&self) -> MosaicResult<Vec<(PathBuf, Fingerprint)>> {
        let walker = WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(if self.options.recursive { usize::MAX } else { 1 })
            .sort_by_file_name();

        let mut found = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(MosaicError::Io(e.into()));
                }
                Err(e) => {
                    warn!(target: "mosaic::catalog", error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.options.matches(entry.path()) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => found.push((
                    entry.path().to_path_buf(),
                    Fingerprint {
                        len: meta.len(),
                        modified: meta.modified().ok(),
                    },
                )),
                Err(e) => {
                    warn!(target: "mosaic::catalog", path = %entry.path().display(), error = %e, "Skipping source without metadata");
                }
            }
        }
        Ok(found)
    }

    fn load(&self, path: &Path, fingerprint: Fingerprint) -> Source {
        match self.extractor.extract(path) {
            Ok(descriptors) => Source {
                fingerprint,
                descriptors,
                error: None,
            },
            Err(e) => {
                warn!(
                    target: "mosaic::catalog",
                    path = %path.display(),
                    error = %e,
                    "Failed to extract descriptors"
                );
                let error = LoadError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                    at: Utc::now(),
                };
                Source {
                    fingerprint,
                    descriptors: Vec::new(),
                    error: Some(error),
                }
            }
        }
    }
}

impl Catalog for DirectoryCatalog {
    fn descriptors(&self) -> DescriptorSnapshot {
        self.snapshot.read().clone()
    }

    fn subscribe(&self, listener: Weak<dyn CatalogChangeListener>) -> Option<SubscriptionId> {
        Some(self.notifier.subscribe(listener))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

impl std::fmt::Debug for DirectoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryCatalog")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("descriptors", &self.snapshot.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = DirectoryOptions::default()
            .extension(".part")
            .recursive(true)
            .channel_capacity(0);
        assert_eq!(options.extension, "part");
        assert!(options.recursive);
        assert_eq!(options.channel_capacity, 1);
        assert!(options.matches(Path::new("a/b.PART")));
        assert!(!options.matches(Path::new("a/b.toml")));
        assert!(!options.matches(Path::new("a/part")));
    }
}
