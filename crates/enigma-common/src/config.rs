//! Configuration structures for enigma.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Top-level configuration containing engine and execution settings
//! - [`EngineConfig`]: Wasmtime engine settings (allocation strategy, fuel, optimization)
//! - [`ExecutionConfig`]: Per-call execution limits (fuel, linear memory)
//! - [`ContractConfig`]: Names of the exports the guest module is expected to provide

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// This structure contains everything the runtime host needs to build its
/// engine and store. It can be loaded from the `[runtime]` table of a TOML
/// configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-call execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Wasmtime engine configuration.
///
/// These settings are fixed when the engine is created and apply to every
/// module compiled and every store created from it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Use the pooling allocator for instance memory.
    ///
    /// The host only ever holds a single instance, so the on-demand allocator
    /// is the default.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Number of instance slots in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Enable fuel metering.
    ///
    /// When enabled, every guest call runs with the budget configured in
    /// [`ExecutionConfig::max_fuel`] and runaway loops are reported instead
    /// of hanging the host thread.
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,

    /// Optimize generated code for speed.
    #[serde(default = "defaults::optimize")]
    pub optimize: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            fuel_metering: defaults::fuel_metering(),
            optimize: defaults::optimize(),
        }
    }
}

/// Per-call execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Fuel granted to every call into guest code.
    ///
    /// The budget is refilled before each call. Ignored unless
    /// [`EngineConfig::fuel_metering`] is enabled.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Maximum linear memory in megabytes.
    ///
    /// Guest `memory.grow` requests beyond this limit fail.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            max_memory_mb: defaults::max_memory_mb(),
        }
    }
}

impl ExecutionConfig {
    /// Get the memory limit in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize) * 1024 * 1024
    }
}

/// The export contract a guest module is expected to honor.
///
/// Every named export is resolved once right after instantiation, so a module
/// that omits one fails before any guest code is called.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractConfig {
    /// Name of the linear memory export.
    #[serde(default = "defaults::memory_export")]
    pub memory: String,

    /// Zero-argument export returning the offset of the input staging buffer.
    #[serde(default = "defaults::buffer_pointer_export")]
    pub buffer_pointer: String,

    /// Export taking the staged input length and returning an `i32` result.
    #[serde(default = "defaults::process_export")]
    pub process: String,

    /// Zero-argument export returning the offset of the vertex buffer.
    ///
    /// `None` disables the rendering handoff.
    #[serde(default = "defaults::vertex_pointer_export")]
    pub vertex_pointer: Option<String>,

    /// Number of vertices in the guest vertex buffer.
    #[serde(default = "defaults::vertex_count")]
    pub vertex_count: u32,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            memory: defaults::memory_export(),
            buffer_pointer: defaults::buffer_pointer_export(),
            process: defaults::process_export(),
            vertex_pointer: defaults::vertex_pointer_export(),
            vertex_count: defaults::vertex_count(),
        }
    }
}

impl ContractConfig {
    /// Name of the vertex pointer export, if the rendering handoff is enabled.
    ///
    /// TOML has no null, so an empty name also disables it.
    pub fn vertex_export(&self) -> Option<&str> {
        self.vertex_pointer.as_deref().filter(|name| !name.is_empty())
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        false
    }

    pub const fn max_instances() -> u32 {
        1
    }

    pub const fn instance_memory_mb() -> u32 {
        64
    }

    pub const fn fuel_metering() -> bool {
        true
    }

    pub const fn optimize() -> bool {
        true
    }

    pub const fn max_fuel() -> u64 {
        10_000_000
    }

    pub const fn max_memory_mb() -> u32 {
        128
    }

    pub fn memory_export() -> String {
        "memory".to_string()
    }

    pub fn buffer_pointer_export() -> String {
        "get_buffer_pointer".to_string()
    }

    pub fn process_export() -> String {
        "process_string".to_string()
    }

    #[allow(clippy::unnecessary_wraps)]
    pub fn vertex_pointer_export() -> Option<String> {
        Some("get_vertex_ptr".to_string())
    }

    pub const fn vertex_count() -> u32 {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert!(!config.engine.pooling_allocator);
        assert_eq!(config.engine.max_instances, 1);
        assert_eq!(config.engine.instance_memory_mb, 64);
        assert!(config.engine.fuel_metering);
        assert!(config.engine.optimize);

        assert_eq!(config.execution.max_fuel, 10_000_000);
        assert_eq!(config.execution.max_memory_mb, 128);
    }

    #[test]
    fn test_default_contract() {
        let contract = ContractConfig::default();

        assert_eq!(contract.memory, "memory");
        assert_eq!(contract.buffer_pointer, "get_buffer_pointer");
        assert_eq!(contract.process, "process_string");
        assert_eq!(contract.vertex_pointer.as_deref(), Some("get_vertex_ptr"));
        assert_eq!(contract.vertex_count, 3);
    }

    #[test]
    fn test_config_serialization() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RuntimeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.engine.fuel_metering, deserialized.engine.fuel_metering);
        assert_eq!(config.execution.max_fuel, deserialized.execution.max_fuel);
    }

    #[test]
    fn test_max_memory_bytes() {
        let config = ExecutionConfig {
            max_memory_mb: 2,
            ..Default::default()
        };

        assert_eq!(config.max_memory_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"execution": {"max_fuel": 500}}"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();

        // Explicitly set value
        assert_eq!(config.execution.max_fuel, 500);
        // Default values for unspecified fields
        assert_eq!(config.execution.max_memory_mb, 128);
        assert!(config.engine.fuel_metering);
    }

    #[test]
    fn test_contract_without_vertex_export() {
        let json = r#"{"vertex_pointer": null}"#;
        let contract: ContractConfig = serde_json::from_str(json).unwrap();

        assert!(contract.vertex_export().is_none());
        assert_eq!(contract.process, "process_string");
    }

    #[test]
    fn test_empty_vertex_export_disables_rendering() {
        let contract = ContractConfig {
            vertex_pointer: Some(String::new()),
            ..Default::default()
        };

        assert!(contract.vertex_export().is_none());
        assert_eq!(
            ContractConfig::default().vertex_export(),
            Some("get_vertex_ptr")
        );
    }
}
