//! Mosaic - transactional component composition
//!
//! Mosaic builds object graphs from declarative component descriptors and
//! keeps them consistent while the set of available components changes.
//!
//! # Quick Start
//!
//! ```ignore
//! use mosaic::{CompositionContainer, ComponentCatalog, ComponentDescriptor, ExportDefinition};
//!
//! let container = CompositionContainer::new();
//! let greeter = ComponentDescriptor::builder("ConsoleGreeter")
//!     .export(ExportDefinition::new("Greeter"))
//!     .build();
//! container.add_catalog(Arc::new(ComponentCatalog::with_descriptors(vec![greeter])))?;
//!
//! let export = container.get_export("Greeter")?;
//! ```
//!
//! # Architecture
//!
//! - `mosaic-core`: contracts, descriptors, exports and errors
//! - `mosaic-concurrency`: nested atomic scopes
//! - `mosaic-catalog`: observable descriptor sets and the change protocol
//! - `mosaic-engine`: export resolution, recomposition and the container

pub use mosaic_catalog::{
    AggregateCatalog, Catalog, CatalogChange, CatalogChangeListener, CatalogDiff, CatalogId,
    CatalogWatcher, ChangeReport, ComponentCatalog, DescriptorExtractor, DirectoryCatalog,
    DirectoryOptions, LoadError, ManifestExtractor, SubscriptionId,
};
pub use mosaic_concurrency::{AtomicScope, ScopeError, ScopeHandle};
pub use mosaic_core::{
    ComponentDescriptor, CreationPolicy, DescriptorId, DescriptorSnapshot, Export,
    ExportDefinition, GenericPart, GenericPartFactory, ImportCardinality, ImportDefinition,
    ImportValues, Instance, MetadataValue, MosaicError, MosaicResult, PartFactory,
};
pub use mosaic_engine::{
    CompositionContainer, CompositionEvent, DiagnosticListener, ExportResolver, ImportSite,
    MosaicConfig, RecompositionReport, RecompositionState, ResolverMetrics, ResolverOptions,
    CONFIG_FILE_NAME,
};
