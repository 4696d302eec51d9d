//! Component manifests
//!
//! A manifest is a TOML file declaring one or more components:
//!
//! ```toml
//! [[component]]
//! name = "ConsoleGreeter"
//! creation_policy = "shared"      # "any" (default), "shared", "non_shared"
//!
//! [[component.export]]
//! contract = "Greeter"
//! priority = 10                   # optional tie-break, default 0
//! metadata = { language = "en" }
//!
//! [[component.import]]
//! contract = "Logger"
//! cardinality = "zero_or_one"     # "exactly_one" (default), "zero_or_more"
//! recomposable = true             # default true
//! ```
//!
//! Components get their factory from the extractor's registry, looked up by
//! the component's `factory` key or, failing that, its name. Unregistered
//! components are built by [`GenericPartFactory`].

use crate::traits::DescriptorExtractor;
use mosaic_core::{
    ComponentDescriptor, CreationPolicy, ExportDefinition, GenericPartFactory, ImportCardinality,
    ImportDefinition, Metadata, MosaicError, MosaicResult, PartFactory,
};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default, rename = "component")]
    components: Vec<ComponentManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ComponentManifest {
    name: String,
    #[serde(default)]
    factory: Option<String>,
    #[serde(default)]
    creation_policy: CreationPolicy,
    #[serde(default, rename = "export")]
    exports: Vec<ExportManifest>,
    #[serde(default, rename = "import")]
    imports: Vec<ImportManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExportManifest {
    contract: String,
    #[serde(default)]
    type_identity: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImportManifest {
    contract: String,
    #[serde(default)]
    cardinality: ImportCardinality,
    #[serde(default)]
    type_identity: Option<String>,
    #[serde(default)]
    required_metadata: Vec<String>,
    #[serde(default)]
    creation_policy: CreationPolicy,
    #[serde(default = "default_recomposable")]
    recomposable: bool,
}

fn default_recomposable() -> bool {
    true
}

/// Extracts descriptors from TOML component manifests
#[derive(Default)]
pub struct ManifestExtractor {
    factories: RwLock<HashMap<String, Arc<dyn PartFactory>>>,
}

impl ManifestExtractor {
    /// Extractor with an empty factory registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory used for components named (or declaring
    /// `factory =`) `key`
    pub fn register_factory(&self, key: impl Into<String>, factory: Arc<dyn PartFactory>) {
        self.factories.write().insert(key.into(), factory);
    }

    /// Builder form of [`ManifestExtractor::register_factory`]
    pub fn with_factory(self, key: impl Into<String>, factory: impl PartFactory + 'static) -> Self {
        self.register_factory(key, Arc::new(factory));
        self
    }

    /// Parse manifest text, stamping `origin` on every descriptor
    pub fn parse(&self, text: &str, origin: &Path) -> MosaicResult<Vec<Arc<ComponentDescriptor>>> {
        let manifest: ManifestFile = toml::from_str(text).map_err(|e| MosaicError::Extraction {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

        let factories = self.factories.read();
        let mut descriptors = Vec::with_capacity(manifest.components.len());
        for component in manifest.components {
            descriptors.push(self.build(component, origin, &factories)?);
        }
        Ok(descriptors)
    }

    fn build(
        &self,
        component: ComponentManifest,
        origin: &Path,
        factories: &HashMap<String, Arc<dyn PartFactory>>,
    ) -> MosaicResult<Arc<ComponentDescriptor>> {
        let invalid = |message: String| MosaicError::Extraction {
            path: origin.to_path_buf(),
            message,
        };
        if component.name.trim().is_empty() {
            return Err(invalid("component name must not be empty".to_string()));
        }

        let factory: Arc<dyn PartFactory> = match &component.factory {
            Some(key) => factories.get(key).cloned().ok_or_else(|| {
                invalid(format!(
                    "component '{}' names unknown factory '{key}'",
                    component.name
                ))
            })?,
            None => factories
                .get(&component.name)
                .cloned()
                .unwrap_or_else(|| Arc::new(GenericPartFactory::new(component.name.clone()))),
        };

        let mut builder = ComponentDescriptor::builder(component.name.as_str())
            .creation_policy(component.creation_policy)
            .origin(PathBuf::from(origin))
            .shared_factory(factory);

        for export in component.exports {
            if export.contract.trim().is_empty() {
                return Err(invalid(format!(
                    "component '{}' has an export without a contract",
                    component.name
                )));
            }
            let mut definition = ExportDefinition::new(export.contract);
            for (key, value) in export.metadata {
                definition = definition.with_metadata(key, value);
            }
            if let Some(identity) = export.type_identity {
                definition = definition.with_type_identity(identity);
            }
            if let Some(priority) = export.priority {
                definition = definition.with_priority(priority);
            }
            builder = builder.export(definition);
        }

        for import in component.imports {
            if import.contract.trim().is_empty() {
                return Err(invalid(format!(
                    "component '{}' has an import without a contract",
                    component.name
                )));
            }
            let mut definition = ImportDefinition::new(import.contract)
                .with_cardinality(import.cardinality)
                .with_creation_policy(import.creation_policy)
                .with_recomposable(import.recomposable);
            if let Some(identity) = import.type_identity {
                definition = definition.with_type_identity(identity);
            }
            for key in import.required_metadata {
                definition = definition.with_required_metadata(key);
            }
            builder = builder.import(definition);
        }

        Ok(builder.build())
    }
}

impl DescriptorExtractor for ManifestExtractor {
    fn extract(&self, source: &Path) -> MosaicResult<Vec<Arc<ComponentDescriptor>>> {
        let text = std::fs::read_to_string(source).map_err(|e| MosaicError::Extraction {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;
        self.parse(&text, source)
    }
}

impl std::fmt::Debug for ManifestExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestExtractor")
            .field("factories", &self.factories.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{GenericPart, ImportValues, Instance};

    const GREETERS: &str = r#"
[[component]]
name = "ConsoleGreeter"
creation_policy = "shared"

[[component.export]]
contract = "Greeter"
priority = 10
metadata = { language = "en" }

[[component.import]]
contract = "Logger"
cardinality = "zero_or_one"
recomposable = false

[[component]]
name = "Plain"

[[component.export]]
contract = "Greeter"
"#;

    #[test]
    fn test_parse_components() {
        let extractor = ManifestExtractor::new();
        let parts = extractor.parse(GREETERS, Path::new("greeters.toml")).unwrap();
        assert_eq!(parts.len(), 2);

        let console = &parts[0];
        assert_eq!(console.name(), "ConsoleGreeter");
        assert_eq!(console.creation_policy(), CreationPolicy::Shared);
        assert_eq!(console.origin(), Some(Path::new("greeters.toml")));
        let export = &console.exports()[0];
        assert_eq!(export.priority(), 10);
        assert_eq!(export.creation_policy(), CreationPolicy::Shared);
        assert_eq!(
            export.metadata_value("language").and_then(|v| v.as_str()),
            Some("en")
        );
        let import = &console.imports()[0];
        assert_eq!(import.cardinality(), ImportCardinality::ZeroOrOne);
        assert!(!import.is_recomposable());

        assert_eq!(parts[1].exports()[0].priority(), 0);
    }

    #[test]
    fn test_malformed_manifest_is_extraction_error() {
        let extractor = ManifestExtractor::new();
        let err = extractor
            .parse("[[component]]\nname = 3\n", Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, MosaicError::Extraction { ref path, .. } if path == Path::new("bad.toml")));
    }

    #[test]
    fn test_unknown_factory_is_rejected() {
        let extractor = ManifestExtractor::new();
        let text = "[[component]]\nname = \"A\"\nfactory = \"missing\"\n";
        assert!(extractor.parse(text, Path::new("a.toml")).is_err());
    }

    #[test]
    fn test_registered_factory_is_used() {
        let extractor = ManifestExtractor::new().with_factory(
            "Plain",
            |_: &ImportValues| -> MosaicResult<Instance> { Ok(Arc::new(42u32)) },
        );
        let parts = extractor.parse(GREETERS, Path::new("greeters.toml")).unwrap();

        let built = parts[1].factory().create(&ImportValues::new()).unwrap();
        assert_eq!(built.downcast_ref::<u32>(), Some(&42));

        let generic = parts[0].factory().create(&ImportValues::new()).unwrap();
        assert!(generic.downcast_ref::<GenericPart>().is_some());
    }
}
