//! Per-host store context.
//!
//! This module provides:
//! - [`HostContext`]: State carried by the single store of a runtime host
//! - [`CallMetrics`]: Counters describing the calls made into the guest
//! - [`create_store`]: Store construction with fuel and memory limits

use std::time::Duration;

use uuid::Uuid;
use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};

use crate::WasmEngine;
use enigma_common::{ExecutionConfig, RuntimeError};

/// State owned by the store of a runtime host.
///
/// There is exactly one store per host. Its identifier is stamped on every
/// handle the host issues, so handles cannot be used against another store.
pub struct HostContext {
    /// Identifier of this store.
    pub store_id: Uuid,

    /// Call metrics.
    pub metrics: CallMetrics,

    /// Resource limits enforced on the guest.
    limits: StoreLimits,
}

/// Counters describing guest calls made through a store.
#[derive(Debug, Clone, Default)]
pub struct CallMetrics {
    /// Number of calls dispatched into guest code.
    pub calls: u64,

    /// Number of calls that ended in a trap, including budget exhaustion.
    pub traps: u64,

    /// Fuel consumed by the most recent call.
    pub last_fuel_consumed: u64,

    /// Fuel consumed across all calls.
    pub total_fuel_consumed: u64,

    /// Wall-clock time spent in guest code.
    pub guest_time: Duration,
}

impl HostContext {
    /// Create a new context for the given store identifier.
    pub fn new(store_id: Uuid, config: &ExecutionConfig) -> Self {
        let limits = StoreLimitsBuilder::new()
            .memory_size(config.max_memory_bytes())
            .memories(1)
            .instances(1)
            .build();

        Self {
            store_id,
            metrics: CallMetrics::default(),
            limits,
        }
    }

    /// Record the outcome of one guest call.
    pub fn record_call(&mut self, fuel_consumed: u64, elapsed: Duration, trapped: bool) {
        self.metrics.calls += 1;
        if trapped {
            self.metrics.traps += 1;
        }
        self.metrics.last_fuel_consumed = fuel_consumed;
        self.metrics.total_fuel_consumed = self
            .metrics
            .total_fuel_consumed
            .saturating_add(fuel_consumed);
        self.metrics.guest_time += elapsed;
    }
}

/// Create a new Wasmtime store with the given configuration.
///
/// # Arguments
///
/// * `engine` - The shared Wasmtime engine
/// * `config` - Execution configuration (fuel, memory limits)
/// * `store_id` - Identifier stamped on handles issued by this store
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    store_id: Uuid,
) -> Result<Store<HostContext>, RuntimeError> {
    let context = HostContext::new(store_id, config);
    let mut store = Store::new(engine.inner(), context);
    store.limiter(|ctx| &mut ctx.limits);

    // Start-up code runs under the same budget as any call
    if engine.is_fuel_metered() {
        refuel(&mut store, config.max_fuel)?;
    }

    Ok(store)
}

/// Reset the fuel of a store to the given budget.
///
/// # Errors
///
/// Returns an error if the engine was created without fuel metering.
pub fn refuel(store: &mut Store<HostContext>, budget: u64) -> Result<(), RuntimeError> {
    store
        .set_fuel(budget)
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to set fuel: {e}")))
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<HostContext>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<HostContext>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}
