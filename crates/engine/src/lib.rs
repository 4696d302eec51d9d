//! Composition engine for mosaic
//!
//! This crate orchestrates the lower layers:
//! - ExportResolver: builds parts on demand and owns the live graph
//! - Recomposition: catalog changes re-bind affected imports atomically
//! - Diagnostics: outcomes of work that runs on catalog threads
//! - Configuration: `mosaic.toml`
//! - CompositionContainer: the host-facing facade
//!
//! The engine is the only component that mutates the live graph, and only
//! from a completing atomic scope.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod container;
pub mod diagnostics;
pub mod graph;
pub mod metrics;
pub mod recompose;
pub mod resolver;

pub use config::{MosaicConfig, ResolverOptions, CONFIG_FILE_NAME};
pub use container::CompositionContainer;
pub use diagnostics::{CompositionEvent, DiagnosticListener, Diagnostics, ImportSite};
pub use graph::{GraphEdit, ImportEdge, LiveGraph, PartRecord};
pub use metrics::ResolverMetrics;
pub use recompose::{RecompositionPlan, RecompositionReport, RecompositionState};
pub use resolver::ExportResolver;
