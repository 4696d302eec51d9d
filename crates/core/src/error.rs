//! Error types for mosaic
//!
//! This module defines the error hierarchy shared by every layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors fall into three groups:
//! - Scope misuse (`AlreadyNested`, `Locked`, `Disposed`, `AlreadyCompleted`):
//!   programmer errors, never retried.
//! - Resolution failures (`CardinalityMismatch`, `Composition`, `CycleDetected`,
//!   `ChangeRejected`, `PartCreation`, `DepthExceeded`): recoverable at the
//!   granularity of the import that failed.
//! - Environment failures (`Extraction`, `Watch`, `Config`, `Io`).

use crate::contract::ImportCardinality;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mosaic operations
pub type MosaicResult<T> = std::result::Result<T, MosaicError>;

/// Error types for the composition engine
#[derive(Debug, Error)]
pub enum MosaicError {
    /// A scope was opened under a parent that already has an active child
    #[error("atomic scope already has an active nested scope")]
    AlreadyNested,

    /// The scope is locked by an active nested scope
    #[error("atomic scope is locked by an active nested scope")]
    Locked,

    /// The scope has been disposed
    #[error("atomic scope has been disposed")]
    Disposed,

    /// The scope has already been completed
    #[error("atomic scope has already been completed")]
    AlreadyCompleted,

    /// Zero or too many exports matched an import
    #[error(
        "cardinality mismatch for contract '{contract}': expected {cardinality}, found {found} export(s)"
    )]
    CardinalityMismatch {
        /// Contract name of the import
        contract: String,
        /// Cardinality the import declared
        cardinality: ImportCardinality,
        /// Number of candidate exports found
        found: usize,
    },

    /// A matched part could not be composed because one of its own imports failed
    #[error("cannot compose part '{part}' for contract '{contract}': {source}")]
    Composition {
        /// Contract name that was being resolved
        contract: String,
        /// Display name of the part that could not be built
        part: String,
        /// The underlying failure
        #[source]
        source: Box<MosaicError>,
    },

    /// The parts reference each other through their imports
    #[error("composition cycle detected: {}", path.join(" -> "))]
    CycleDetected {
        /// Part names along the cycle, first and last equal
        path: Vec<String>,
    },

    /// A catalog change would alter an import that does not allow recomposition
    #[error("change rejected: import '{contract}' of part '{part}' is not recomposable")]
    ChangeRejected {
        /// Contract name of the affected import
        contract: String,
        /// Display name of the importing part
        part: String,
    },

    /// A part factory failed to build an instance
    #[error("part '{part}' failed to build: {message}")]
    PartCreation {
        /// Display name of the part
        part: String,
        /// Factory-provided reason
        message: String,
    },

    /// Resolution went deeper than the configured limit
    #[error("maximum resolution depth {max_depth} exceeded while composing part '{part}'")]
    DepthExceeded {
        /// Part being composed when the limit was hit
        part: String,
        /// Configured limit
        max_depth: usize,
    },

    /// A source could not be turned into descriptors
    #[error("failed to extract descriptors from '{}': {message}", path.display())]
    Extraction {
        /// The source that failed
        path: PathBuf,
        /// Extractor-provided reason
        message: String,
    },

    /// The filesystem watcher could not be set up
    #[error("watch error: {message}")]
    Watch {
        /// Watcher-provided reason
        message: String,
    },

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// I/O error (directory scans, config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MosaicError {
    /// Wrap a transitive failure with the contract and part being composed
    pub fn composition(
        contract: impl Into<String>,
        part: impl Into<String>,
        source: MosaicError,
    ) -> Self {
        MosaicError::Composition {
            contract: contract.into(),
            part: part.into(),
            source: Box::new(source),
        }
    }

    /// Create a part creation error
    pub fn part_creation(part: impl Into<String>, message: impl Into<String>) -> Self {
        MosaicError::PartCreation {
            part: part.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        MosaicError::Config {
            message: message.into(),
        }
    }

    /// Innermost cause of a chain of `Composition` errors
    pub fn root_cause(&self) -> &MosaicError {
        let mut current = self;
        while let MosaicError::Composition { source, .. } = current {
            current = source;
        }
        current
    }

    /// True for misuse of an atomic scope
    pub fn is_scope_misuse(&self) -> bool {
        matches!(
            self,
            MosaicError::AlreadyNested
                | MosaicError::Locked
                | MosaicError::Disposed
                | MosaicError::AlreadyCompleted
        )
    }

    /// True when the failure is confined to one import and the caller may retry later
    pub fn is_recoverable(&self) -> bool {
        !self.is_scope_misuse() && !matches!(self, MosaicError::Config { .. })
    }
}
