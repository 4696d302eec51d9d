//! Engine configuration via `mosaic.toml`
//!
//! Hosts that prefer code can build [`ResolverOptions`] and
//! [`DirectoryOptions`] directly; the file form maps onto both.

use mosaic_catalog::DirectoryOptions;
use mosaic_core::{MosaicError, MosaicResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "mosaic.toml";

/// Default resolution depth limit
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default number of diagnostic events kept
pub const DEFAULT_EVENT_CAPACITY: usize = 128;

/// Resolver tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Deepest chain of parts one resolution may build
    pub max_depth: usize,
    /// Recent diagnostic events kept in memory
    pub event_capacity: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ResolverOptions {
    /// Set the depth limit
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the diagnostic ring size
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// `[resolver]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Deepest chain of parts one resolution may build
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Recent diagnostic events kept in memory
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// `[directory]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// Source file extension
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Scan subdirectories
    #[serde(default)]
    pub recursive: bool,
    /// Watcher debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Watcher channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_extension() -> String {
    mosaic_catalog::DEFAULT_EXTENSION.to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            recursive: false,
            debounce_ms: default_debounce_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Engine configuration loaded from `mosaic.toml`
///
/// # Example
///
/// ```toml
/// [resolver]
/// max_depth = 64
/// event_capacity = 128
///
/// [directory]
/// extension = "toml"
/// recursive = false
/// debounce_ms = 100
/// channel_capacity = 256
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MosaicConfig {
    /// Resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Directory catalog settings
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl MosaicConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Mosaic composition engine configuration

[resolver]
# Deepest chain of parts a single resolution may build (default: 64).
# Hitting it fails that resolution with a depth error.
max_depth = 64

# Recent diagnostic events kept in memory (default: 128, 0 disables).
event_capacity = 128

[directory]
# Extension of component manifest files, without the dot.
extension = "toml"

# Scan subdirectories too.
recursive = false

# Quiet period after a burst of filesystem events before rescanning.
debounce_ms = 100

# Events buffered between the OS watcher and the rescan thread.
# Events beyond this are dropped; the pending rescan covers them.
channel_capacity = 256
"#
    }

    /// Check values that parse but make no sense
    pub fn validate(&self) -> MosaicResult<()> {
        if self.resolver.max_depth == 0 {
            return Err(MosaicError::config("resolver.max_depth must be at least 1"));
        }
        let extension = self.directory.extension.trim_start_matches('.');
        if extension.is_empty() || extension.contains(['/', '\\']) {
            return Err(MosaicError::config(format!(
                "directory.extension '{}' is not a file extension",
                self.directory.extension
            )));
        }
        if self.directory.channel_capacity == 0 {
            return Err(MosaicError::config(
                "directory.channel_capacity must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parse config text and validate it
    pub fn from_toml_str(text: &str) -> MosaicResult<Self> {
        let config: MosaicConfig = toml::from_str(text)
            .map_err(|e| MosaicError::config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> MosaicResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MosaicError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            MosaicError::Config { message } => {
                MosaicError::config(format!("{} ({})", message, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> MosaicResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                MosaicError::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> MosaicResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MosaicError::config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content).map_err(|e| {
            MosaicError::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Resolver options described by the `[resolver]` section
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions::default()
            .with_max_depth(self.resolver.max_depth)
            .with_event_capacity(self.resolver.event_capacity)
    }

    /// Directory options described by the `[directory]` section
    pub fn directory_options(&self) -> DirectoryOptions {
        DirectoryOptions::default()
            .extension(self.directory.extension.as_str())
            .recursive(self.directory.recursive)
            .debounce(Duration::from_millis(self.directory.debounce_ms))
            .channel_capacity(self.directory.channel_capacity)
    }
}
