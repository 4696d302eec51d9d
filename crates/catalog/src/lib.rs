//! Component catalogs for mosaic
//!
//! This crate provides the descriptor sources resolution reads from:
//! - Catalog / CatalogChangeListener: the observable-set abstraction
//! - ChangeNotifier: the two-phase change protocol every mutable catalog runs
//! - ComponentCatalog: an explicit, caller-managed descriptor set
//! - AggregateCatalog: the union of child catalogs, forwarding their changes
//! - DirectoryCatalog + CatalogWatcher: descriptors loaded from manifest files
//!   and kept current by filesystem events
//! - CatalogDiff: the view of a pending change used by recomposition

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod component;
pub mod diff;
pub mod directory;
pub mod manifest;
pub mod notifier;
pub mod traits;
pub mod watcher;

pub use aggregate::{AggregateCatalog, CatalogId};
pub use component::ComponentCatalog;
pub use diff::CatalogDiff;
pub use directory::{DirectoryCatalog, DirectoryOptions, LoadError, LoadErrorSink, DEFAULT_EXTENSION};
pub use manifest::ManifestExtractor;
pub use notifier::{ChangeNotifier, ChangeReport};
pub use traits::{
    Catalog, CatalogChange, CatalogChangeListener, DescriptorExtractor, SubscriptionId,
};
pub use watcher::{CatalogWatcher, EventSender, FsEvent, FsEventKind, WatchPump, WatchStats};
