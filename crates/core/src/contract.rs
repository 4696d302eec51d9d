//! Export and import contracts
//!
//! An export is a `(contract name, metadata)` pair promised by a part. An
//! import is a constraint over exports plus a cardinality. Matching is a pure
//! function of the two definitions: no ordering, no catalog state.

use crate::conventions::{self, CreationPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Metadata
// ============================================================================

/// A single metadata value attached to an export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list of values
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    /// String payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

/// Metadata bag of an export, ordered by key
pub type Metadata = BTreeMap<String, MetadataValue>;

// ============================================================================
// Export definition
// ============================================================================

/// A capability promised by a part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDefinition {
    contract_name: String,
    #[serde(default)]
    metadata: Metadata,
}

impl ExportDefinition {
    /// Create an export for `contract_name` with no metadata
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self {
            contract_name: contract_name.into(),
            metadata: Metadata::new(),
        }
    }

    /// Add or replace one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the structural type identity
    pub fn with_type_identity(self, identity: impl Into<String>) -> Self {
        self.with_metadata(conventions::EXPORT_TYPE_IDENTITY, identity.into())
    }

    /// Set the tie-break priority
    pub fn with_priority(self, priority: i64) -> Self {
        self.with_metadata(conventions::PRIORITY, priority)
    }

    /// Set the creation policy stamp
    pub fn with_creation_policy(self, policy: CreationPolicy) -> Self {
        self.with_metadata(conventions::CREATION_POLICY, policy.as_str())
    }

    /// Contract name
    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    /// Full metadata bag
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Look up one metadata entry
    pub fn metadata_value(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Type identity, defaulting to the contract name
    pub fn type_identity(&self) -> String {
        self.metadata
            .get(conventions::EXPORT_TYPE_IDENTITY)
            .and_then(MetadataValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| conventions::default_type_identity(&self.contract_name))
    }

    /// Tie-break priority, 0 when absent or not an integer
    pub fn priority(&self) -> i64 {
        self.metadata
            .get(conventions::PRIORITY)
            .and_then(MetadataValue::as_int)
            .unwrap_or(0)
    }

    /// Creation policy stamp, `Any` when absent or unparseable
    pub fn creation_policy(&self) -> CreationPolicy {
        self.metadata
            .get(conventions::CREATION_POLICY)
            .and_then(MetadataValue::as_str)
            .and_then(CreationPolicy::parse)
            .unwrap_or_default()
    }
}

// ============================================================================
// Import definition
// ============================================================================

/// How many exports an import accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportCardinality {
    /// Optional single export
    ZeroOrOne,
    /// Exactly one export
    #[default]
    ExactlyOne,
    /// Any number of exports
    ZeroOrMore,
}

impl ImportCardinality {
    /// Single-valued imports need a tie-break when several exports match
    pub fn is_single(self) -> bool {
        !matches!(self, ImportCardinality::ZeroOrMore)
    }

    /// Whether `count` selected exports satisfy this cardinality
    pub fn accepts(self, count: usize) -> bool {
        match self {
            ImportCardinality::ZeroOrOne => count <= 1,
            ImportCardinality::ExactlyOne => count == 1,
            ImportCardinality::ZeroOrMore => true,
        }
    }
}

impl fmt::Display for ImportCardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportCardinality::ZeroOrOne => f.write_str("zero or one"),
            ImportCardinality::ExactlyOne => f.write_str("exactly one"),
            ImportCardinality::ZeroOrMore => f.write_str("zero or more"),
        }
    }
}

/// Custom predicate over export definitions
pub type ExportFilter = Arc<dyn Fn(&ExportDefinition) -> bool + Send + Sync>;

/// A dependency required by a part
#[derive(Clone)]
pub struct ImportDefinition {
    contract_name: String,
    required_type_identity: Option<String>,
    required_metadata: Vec<String>,
    required_creation_policy: CreationPolicy,
    cardinality: ImportCardinality,
    recomposable: bool,
    filter: Option<ExportFilter>,
}

impl ImportDefinition {
    /// Import exactly one export of `contract_name`
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self {
            contract_name: contract_name.into(),
            required_type_identity: None,
            required_metadata: Vec::new(),
            required_creation_policy: CreationPolicy::Any,
            cardinality: ImportCardinality::ExactlyOne,
            recomposable: true,
            filter: None,
        }
    }

    /// Import zero or one export of `contract_name`
    pub fn optional(contract_name: impl Into<String>) -> Self {
        Self::new(contract_name).with_cardinality(ImportCardinality::ZeroOrOne)
    }

    /// Import every export of `contract_name`
    pub fn many(contract_name: impl Into<String>) -> Self {
        Self::new(contract_name).with_cardinality(ImportCardinality::ZeroOrMore)
    }

    /// Set the cardinality
    pub fn with_cardinality(mut self, cardinality: ImportCardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Require a structural type identity
    pub fn with_type_identity(mut self, identity: impl Into<String>) -> Self {
        self.required_type_identity = Some(identity.into());
        self
    }

    /// Require a metadata key to be present on candidate exports
    pub fn with_required_metadata(mut self, key: impl Into<String>) -> Self {
        self.required_metadata.push(key.into());
        self
    }

    /// Require a creation policy
    pub fn with_creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.required_creation_policy = policy;
        self
    }

    /// Allow or forbid recomposition of this import
    pub fn with_recomposable(mut self, recomposable: bool) -> Self {
        self.recomposable = recomposable;
        self
    }

    /// Add a custom predicate evaluated after the structural checks
    pub fn with_filter(
        mut self,
        filter: impl Fn(&ExportDefinition) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Contract name
    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    /// Cardinality
    pub fn cardinality(&self) -> ImportCardinality {
        self.cardinality
    }

    /// Whether the import may be re-satisfied after composition
    pub fn is_recomposable(&self) -> bool {
        self.recomposable
    }

    /// Required type identity, if any
    pub fn required_type_identity(&self) -> Option<&str> {
        self.required_type_identity.as_deref()
    }

    /// Metadata keys every candidate must carry
    pub fn required_metadata(&self) -> &[String] {
        &self.required_metadata
    }

    /// Required creation policy
    pub fn required_creation_policy(&self) -> CreationPolicy {
        self.required_creation_policy
    }

    /// Evaluate the constraint against one export
    pub fn is_constraint_satisfied_by(&self, export: &ExportDefinition) -> bool {
        if export.contract_name() != self.contract_name {
            return false;
        }
        if let Some(identity) = &self.required_type_identity {
            if &export.type_identity() != identity {
                return false;
            }
        }
        if !self
            .required_metadata
            .iter()
            .all(|key| export.metadata().contains_key(key))
        {
            return false;
        }
        if !export
            .creation_policy()
            .is_compatible_with(self.required_creation_policy)
        {
            return false;
        }
        match &self.filter {
            Some(filter) => filter(export),
            None => true,
        }
    }
}

impl fmt::Debug for ImportDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportDefinition")
            .field("contract_name", &self.contract_name)
            .field("required_type_identity", &self.required_type_identity)
            .field("required_metadata", &self.required_metadata)
            .field("required_creation_policy", &self.required_creation_policy)
            .field("cardinality", &self.cardinality)
            .field("recomposable", &self.recomposable)
            .field("filter", &self.filter.as_ref().map(|_| ".."))
            .finish()
    }
}

impl fmt::Display for ImportDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.contract_name, self.cardinality)
    }
}
