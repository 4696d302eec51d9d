//! Core types for mosaic
//!
//! This crate defines the foundational types used throughout the system:
//! - ExportDefinition / ImportDefinition: contracts and constraint matching
//! - Conventions: metadata keys resolution depends on (type identity,
//!   creation policy, priority)
//! - ComponentDescriptor: immutable metadata for one creatable part
//! - Export / Instance / PartFactory: what resolution produces
//! - DescriptorSnapshot: immutable catalog views and export selection
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod conventions;
pub mod descriptor;
pub mod error;
pub mod instance;
pub mod snapshot;

pub use contract::{
    ExportDefinition, ExportFilter, ImportCardinality, ImportDefinition, Metadata, MetadataValue,
};
pub use conventions::CreationPolicy;
pub use descriptor::{ComponentDescriptor, DescriptorBuilder, DescriptorId, ExportRef};
pub use error::{MosaicError, MosaicResult};
pub use instance::{Export, GenericPart, GenericPartFactory, ImportValues, Instance, PartFactory};
pub use snapshot::{matching_exports_in, select_exports, DescriptorSnapshot, ExportMatch};
