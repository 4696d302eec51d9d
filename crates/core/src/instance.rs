//! Instances, exports and part factories
//!
//! The engine never looks inside an instance: it is an `Arc<dyn Any>` built
//! by the descriptor's [`PartFactory`] from the exports bound to the part's
//! imports. Hosts downcast exports back to concrete types.

use crate::contract::{ExportDefinition, ImportDefinition};
use crate::descriptor::ExportRef;
use crate::error::MosaicResult;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A built part instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A resolved export: definition, provenance and the instance behind it
#[derive(Clone)]
pub struct Export {
    definition: ExportDefinition,
    export_ref: ExportRef,
    part_name: Arc<str>,
    instance: Instance,
}

impl Export {
    /// Create a resolved export
    pub fn new(
        definition: ExportDefinition,
        export_ref: ExportRef,
        part_name: impl Into<Arc<str>>,
        instance: Instance,
    ) -> Self {
        Self {
            definition,
            export_ref,
            part_name: part_name.into(),
            instance,
        }
    }

    /// Export definition
    pub fn definition(&self) -> &ExportDefinition {
        &self.definition
    }

    /// Which descriptor and export this came from
    pub fn export_ref(&self) -> ExportRef {
        self.export_ref
    }

    /// Display name of the exporting part
    pub fn part_name(&self) -> &str {
        &self.part_name
    }

    /// The instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Downcast the instance to a concrete type
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }

    /// Whether two exports share the same instance
    pub fn same_instance(&self, other: &Export) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Export")
            .field("contract", &self.definition.contract_name())
            .field("part", &self.part_name)
            .field("descriptor", &self.export_ref.descriptor)
            .finish_non_exhaustive()
    }
}

/// Exports bound to each import of a part, in import declaration order
#[derive(Debug, Clone, Default)]
pub struct ImportValues {
    entries: Vec<(ImportDefinition, Vec<Export>)>,
}

impl ImportValues {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `exports` to `import`
    pub fn push(&mut self, import: ImportDefinition, exports: Vec<Export>) {
        self.entries.push((import, exports));
    }

    /// Exports bound to the first import of `contract_name`
    pub fn get(&self, contract_name: &str) -> &[Export] {
        self.entries
            .iter()
            .find(|(import, _)| import.contract_name() == contract_name)
            .map(|(_, exports)| exports.as_slice())
            .unwrap_or(&[])
    }

    /// First export bound to `contract_name`
    pub fn single(&self, contract_name: &str) -> Option<&Export> {
        self.get(contract_name).first()
    }

    /// All bindings
    pub fn iter(&self) -> impl Iterator<Item = (&ImportDefinition, &[Export])> {
        self.entries
            .iter()
            .map(|(import, exports)| (import, exports.as_slice()))
    }

    /// Number of bound imports
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no imports are bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds instances of one part
///
/// Implemented for any `Fn(&ImportValues) -> MosaicResult<Instance>` closure.
pub trait PartFactory: Send + Sync {
    /// Build an instance from the exports bound to the part's imports
    fn create(&self, imports: &ImportValues) -> MosaicResult<Instance>;

    /// Release an instance the engine no longer holds
    ///
    /// Called for tentatively built instances when a scope rolls back, and for
    /// evicted instances after a recomposition commits.
    fn release(&self, _instance: &Instance) {}
}

impl<F> PartFactory for F
where
    F: Fn(&ImportValues) -> MosaicResult<Instance> + Send + Sync,
{
    fn create(&self, imports: &ImportValues) -> MosaicResult<Instance> {
        self(imports)
    }
}

/// Instance produced by [`GenericPartFactory`]
///
/// Records the part name and the exports bound to its imports. Used for
/// descriptors that carry no behavior of their own, such as manifest parts.
#[derive(Debug)]
pub struct GenericPart {
    name: String,
    imports: ImportValues,
}

impl GenericPart {
    /// Part name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound imports
    pub fn imports(&self) -> &ImportValues {
        &self.imports
    }
}

/// Default factory producing [`GenericPart`] instances
#[derive(Debug, Clone)]
pub struct GenericPartFactory {
    name: String,
}

impl GenericPartFactory {
    /// Factory for parts named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PartFactory for GenericPartFactory {
    fn create(&self, imports: &ImportValues) -> MosaicResult<Instance> {
        Ok(Arc::new(GenericPart {
            name: self.name.clone(),
            imports: imports.clone(),
        }))
    }
}
