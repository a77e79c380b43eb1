//! Common types, errors, and configuration for enigma.
//!
//! This crate provides shared functionality used across the enigma workspace:
//! - Error types using `thiserror` for the host bridge and its collaborators
//! - Configuration structures for the engine, execution limits and the guest
//!   export contract
//! - TOML configuration file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{ContractConfig, EngineConfig, ExecutionConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError, JournalConfig, ModuleConfig};
pub use error::{ExportKind, HostError, RuntimeError};
