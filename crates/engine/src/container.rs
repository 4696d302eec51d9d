//! Host-facing composition container
//!
//! A [`CompositionContainer`] wires the pieces a host usually wants together:
//! an [`AggregateCatalog`] to plug catalogs into, an [`ExportResolver`]
//! observing it, and filesystem watchers for directory catalogs.
//!
//! ```ignore
//! use mosaic_engine::CompositionContainer;
//!
//! let container = CompositionContainer::new();
//! container.add_catalog(Arc::new(catalog))?;
//! let app = container.get_export("App")?;
//! ```

use crate::config::{MosaicConfig, CONFIG_FILE_NAME};
use crate::diagnostics::{CompositionEvent, DiagnosticListener, Diagnostics};
use crate::metrics::ResolverMetrics;
use crate::resolver::ExportResolver;
use mosaic_catalog::{
    AggregateCatalog, Catalog, CatalogId, CatalogWatcher, ChangeReport, DescriptorExtractor,
    DirectoryCatalog, LoadError,
};
use mosaic_core::{Export, ImportDefinition, MosaicResult};
use parking_lot::Mutex;
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn extraction_event(error: &LoadError) -> CompositionEvent {
    CompositionEvent::ExtractionFailed {
        at: error.at,
        path: error.path.clone(),
        message: error.message.clone(),
    }
}

/// Aggregate catalog plus the resolver observing it
pub struct CompositionContainer {
    config: MosaicConfig,
    catalog: AggregateCatalog,
    resolver: ExportResolver,
    watchers: Mutex<Vec<(CatalogId, CatalogWatcher)>>,
}

impl CompositionContainer {
    /// Empty container with default configuration
    pub fn new() -> Self {
        Self::with_config(MosaicConfig::default())
    }

    /// Empty container configured by `config`
    pub fn with_config(config: MosaicConfig) -> Self {
        let catalog = AggregateCatalog::new();
        let resolver = ExportResolver::new(Arc::new(catalog.clone()), config.resolver_options());
        Self {
            config,
            catalog,
            resolver,
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Container configured from `mosaic.toml` in `dir`
    ///
    /// Writes the default file first if none exists.
    pub fn open_config_dir(dir: &Path) -> MosaicResult<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        MosaicConfig::write_default_if_missing(&path)?;
        Ok(Self::with_config(MosaicConfig::from_file(&path)?))
    }

    /// Configuration in effect
    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    /// The aggregate every added catalog joins
    pub fn catalog(&self) -> &AggregateCatalog {
        &self.catalog
    }

    /// The resolver observing the aggregate
    pub fn resolver(&self) -> &ExportResolver {
        &self.resolver
    }

    /// Plug in a catalog
    ///
    /// A recomposition failure caused by the new descriptors is reported in
    /// the returned [`ChangeReport`] and as a diagnostic event; it does not
    /// stop the catalog from joining.
    pub fn add_catalog(&self, catalog: Arc<dyn Catalog>) -> MosaicResult<(CatalogId, ChangeReport)> {
        self.catalog.add_catalog(catalog)
    }

    /// Unplug a catalog, stopping its watcher if it has one
    pub fn remove_catalog(&self, id: CatalogId) -> MosaicResult<Option<ChangeReport>> {
        let watcher = {
            let mut watchers = self.watchers.lock();
            watchers
                .iter()
                .position(|(owner, _)| *owner == id)
                .map(|i| watchers.remove(i))
        };
        drop(watcher);
        Ok(self.catalog.remove_catalog(id)?.map(|(_, report)| report))
    }

    /// Plug in the manifests under `dir`
    ///
    /// Sources that fail to load are reported as
    /// [`CompositionEvent::ExtractionFailed`]. With `watch`, the directory is
    /// rescanned whenever its files change.
    pub fn add_directory(
        &self,
        dir: impl AsRef<Path>,
        extractor: Arc<dyn DescriptorExtractor>,
        watch: bool,
    ) -> MosaicResult<(CatalogId, Arc<DirectoryCatalog>)> {
        let directory = Arc::new(DirectoryCatalog::open(
            dir,
            extractor,
            self.config.directory_options(),
        )?);

        let diagnostics: Arc<Diagnostics> = Arc::clone(self.resolver.diagnostics());
        for error in directory.load_errors() {
            diagnostics.emit(extraction_event(&error));
        }
        directory.on_load_error(Arc::new(move |error: &LoadError| {
            diagnostics.emit(extraction_event(error))
        }));

        let (id, _) = self.add_catalog(Arc::clone(&directory) as Arc<dyn Catalog>)?;
        if watch {
            let watcher = CatalogWatcher::start(Arc::clone(&directory))?;
            self.watchers.lock().push((id, watcher));
        }
        info!(
            target: "mosaic::catalog",
            catalog = %id,
            path = %directory.path().display(),
            descriptors = directory.descriptors().len(),
            watch,
            "Directory catalog added"
        );
        Ok((id, directory))
    }

    /// The single export of `contract`
    pub fn get_export(&self, contract: &str) -> MosaicResult<Export> {
        self.resolver.get_export(contract)
    }

    /// Every export of `contract`
    pub fn get_exports(&self, contract: &str) -> MosaicResult<Vec<Export>> {
        self.resolver.get_exports(contract)
    }

    /// The single export of `contract`, downcast to `T`
    pub fn get_exported_value<T: Any + Send + Sync>(&self, contract: &str) -> MosaicResult<Option<Arc<T>>> {
        self.resolver.get_exported_value(contract)
    }

    /// Resolve an arbitrary import
    pub fn resolve(&self, import: &ImportDefinition) -> MosaicResult<Vec<Export>> {
        self.resolver.resolve(import)
    }

    /// Receive every diagnostic event from now on
    pub fn subscribe_diagnostics(&self, listener: Arc<dyn DiagnosticListener>) {
        self.resolver.subscribe_diagnostics(listener);
    }

    /// Recent diagnostic events, oldest first
    pub fn recent_events(&self) -> Vec<CompositionEvent> {
        self.resolver.recent_events()
    }

    /// Resolver counters
    pub fn metrics(&self) -> ResolverMetrics {
        self.resolver.metrics()
    }
}

impl Default for CompositionContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompositionContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionContainer")
            .field("catalogs", &self.catalog.len())
            .field("watchers", &self.watchers.lock().len())
            .field("resolver", &self.resolver)
            .finish()
    }
}
