//! Component descriptors
//!
//! A descriptor is the immutable metadata for one creatable part: its
//! exports, its imports, its creation policy and the factory that builds it.
//! Catalogs produce descriptors; nothing mutates them afterwards. A refreshed
//! source yields brand-new descriptors with new identities.

use crate::contract::{ExportDefinition, ImportDefinition};
use crate::conventions::{self, CreationPolicy};
use crate::instance::{GenericPartFactory, PartFactory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Identity of a component descriptor
///
/// A wrapper around a UUID v4. Set arithmetic over catalogs (diffs,
/// removals) compares descriptors by this identity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DescriptorId(Uuid);

impl DescriptorId {
    /// Create a new random DescriptorId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a DescriptorId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for DescriptorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one export of one descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExportRef {
    /// Owning descriptor
    pub descriptor: DescriptorId,
    /// Position in the descriptor's export list
    pub index: usize,
}

/// Immutable metadata for one creatable part
#[derive(Clone)]
pub struct ComponentDescriptor {
    id: DescriptorId,
    name: String,
    exports: Vec<ExportDefinition>,
    imports: Vec<ImportDefinition>,
    creation_policy: CreationPolicy,
    origin: Option<PathBuf>,
    factory: Arc<dyn PartFactory>,
}

impl ComponentDescriptor {
    /// Start building a descriptor named `name`
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    /// Identity
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exports in declaration order
    pub fn exports(&self) -> &[ExportDefinition] {
        &self.exports
    }

    /// Imports in declaration order
    pub fn imports(&self) -> &[ImportDefinition] {
        &self.imports
    }

    /// Part-level creation policy
    pub fn creation_policy(&self) -> CreationPolicy {
        self.creation_policy
    }

    /// Source this descriptor was extracted from, if any
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Factory that builds instances
    pub fn factory(&self) -> &Arc<dyn PartFactory> {
        &self.factory
    }

    /// Reference to the export at `index`
    pub fn export_ref(&self, index: usize) -> ExportRef {
        ExportRef {
            descriptor: self.id,
            index,
        }
    }

    /// Whether any export has the given contract name
    pub fn exports_contract(&self, contract_name: &str) -> bool {
        self.exports
            .iter()
            .any(|export| export.contract_name() == contract_name)
    }
}

impl PartialEq for ComponentDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentDescriptor {}

impl Hash for ComponentDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("exports", &self.exports)
            .field("imports", &self.imports)
            .field("creation_policy", &self.creation_policy)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ComponentDescriptor`]
pub struct DescriptorBuilder {
    name: String,
    exports: Vec<ExportDefinition>,
    imports: Vec<ImportDefinition>,
    creation_policy: CreationPolicy,
    origin: Option<PathBuf>,
    factory: Option<Arc<dyn PartFactory>>,
}

impl DescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exports: Vec::new(),
            imports: Vec::new(),
            creation_policy: CreationPolicy::Any,
            origin: None,
            factory: None,
        }
    }

    /// Add an export
    pub fn export(mut self, export: ExportDefinition) -> Self {
        self.exports.push(export);
        self
    }

    /// Add an import
    pub fn import(mut self, import: ImportDefinition) -> Self {
        self.imports.push(import);
        self
    }

    /// Set the part-level creation policy
    pub fn creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.creation_policy = policy;
        self
    }

    /// Record the source the descriptor came from
    pub fn origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Set the factory; defaults to [`GenericPartFactory`]
    pub fn factory(mut self, factory: impl PartFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Set a shared factory
    pub fn shared_factory(mut self, factory: Arc<dyn PartFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Finish the descriptor
    ///
    /// A non-`Any` part policy is stamped onto every export that does not
    /// carry its own, so imports that require a policy can match on it.
    pub fn build(self) -> Arc<ComponentDescriptor> {
        let policy = self.creation_policy;
        let exports = self
            .exports
            .into_iter()
            .map(|export| {
                if policy != CreationPolicy::Any
                    && export.metadata_value(conventions::CREATION_POLICY).is_none()
                {
                    export.with_creation_policy(policy)
                } else {
                    export
                }
            })
            .collect();
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(GenericPartFactory::new(self.name.clone())));

        Arc::new(ComponentDescriptor {
            id: DescriptorId::new(),
            name: self.name,
            exports,
            imports: self.imports,
            creation_policy: policy,
            origin: self.origin,
            factory,
        })
    }
}
