//! Contract-identity conventions
//!
//! Metadata keys that resolution correctness depends on. Catalogs stamp
//! them onto export definitions; the matcher reads them back. Anything that
//! builds descriptors must agree on these names or exports silently stop
//! matching.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata key carrying the structural type identity of an export
pub const EXPORT_TYPE_IDENTITY: &str = "ExportTypeIdentity";

/// Metadata key carrying the creation policy of the exporting part
pub const CREATION_POLICY: &str = "CreationPolicy";

/// Metadata key carrying the tie-break priority of an export
///
/// Integer; absent means 0. Higher wins.
pub const PRIORITY: &str = "Priority";

/// Keys reserved by the conventions above
pub const RESERVED_KEYS: [&str; 3] = [EXPORT_TYPE_IDENTITY, CREATION_POLICY, PRIORITY];

/// How instances of a part are shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationPolicy {
    /// No preference; compatible with everything
    #[default]
    Any,
    /// One instance per resolver, cached in the live graph
    Shared,
    /// A fresh instance per request
    NonShared,
}

impl CreationPolicy {
    /// Whether an export with this policy satisfies an import requiring `required`
    ///
    /// `Any` on either side matches; otherwise the policies must be equal.
    pub fn is_compatible_with(self, required: CreationPolicy) -> bool {
        match (self, required) {
            (CreationPolicy::Any, _) | (_, CreationPolicy::Any) => true,
            (a, b) => a == b,
        }
    }

    /// Whether instances built under this policy are cached
    ///
    /// `Any` resolves to shared, matching the default of the part model.
    pub fn is_shared(self) -> bool {
        !matches!(self, CreationPolicy::NonShared)
    }

    /// Metadata string form
    pub fn as_str(self) -> &'static str {
        match self {
            CreationPolicy::Any => "Any",
            CreationPolicy::Shared => "Shared",
            CreationPolicy::NonShared => "NonShared",
        }
    }

    /// Parse the metadata string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Any" => Some(CreationPolicy::Any),
            "Shared" => Some(CreationPolicy::Shared),
            "NonShared" => Some(CreationPolicy::NonShared),
            _ => None,
        }
    }
}

impl fmt::Display for CreationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type identity used when a descriptor does not declare one explicitly
///
/// By convention the identity of an export is its contract name.
pub fn default_type_identity(contract_name: &str) -> String {
    contract_name.to_string()
}

/// Whether `key` is one of the reserved convention keys
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}
