//! Concurrency layer for mosaic
//!
//! This crate implements the transactional scope composition work runs in:
//! - AtomicScope: nested, rollback-capable container for speculative state
//! - Completion actions deferred to the outermost scope
//! - Revert actions run newest-first on rollback
//! - Lock enforcement while a nested scope is active

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod scope;

pub use scope::{AtomicScope, ScopeAction, ScopeError, ScopeHandle, ScopeValue};
