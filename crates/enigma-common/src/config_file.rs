//! Configuration file structures for enigma.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ModuleConfig`]: Which guest module to load
//! - [`JournalConfig`]: Where processed results are recorded

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ContractConfig, RuntimeConfig};

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.engine]
/// fuel_metering = true
///
/// [runtime.execution]
/// max_fuel = 10_000_000
/// max_memory_mb = 128
///
/// [module]
/// path = "./main.wasm"
///
/// [contract]
/// memory = "memory"
/// buffer_pointer = "get_buffer_pointer"
/// process = "process_string"
/// vertex_pointer = "get_vertex_ptr"
/// vertex_count = 3
///
/// [journal]
/// enabled = true
/// path = "./app_data.jsonl"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine + execution settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Guest module location.
    #[serde(default)]
    pub module: ModuleConfig,

    /// Guest export contract.
    #[serde(default)]
    pub contract: ContractConfig,

    /// Result journal settings.
    #[serde(default)]
    pub journal: JournalConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "Configuration file loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Guest module location.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleConfig {
    /// Path to the WebAssembly binary.
    #[serde(default = "defaults::module_path")]
    pub path: PathBuf,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            path: defaults::module_path(),
        }
    }
}

/// Result journal configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JournalConfig {
    /// Persist journal entries to disk.
    ///
    /// Entries are always emitted through `tracing`; this only controls the
    /// JSON lines file.
    #[serde(default = "defaults::journal_enabled")]
    pub enabled: bool,

    /// Path of the JSON lines journal file.
    #[serde(default = "defaults::journal_path")]
    pub path: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::journal_enabled(),
            path: defaults::journal_path(),
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    use std::path::PathBuf;

    pub fn module_path() -> PathBuf {
        PathBuf::from("main.wasm")
    }

    pub const fn journal_enabled() -> bool {
        true
    }

    pub fn journal_path() -> PathBuf {
        PathBuf::from("app_data.jsonl")
    }
}
