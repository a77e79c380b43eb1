//! Wasmtime runtime host and guest memory bridge for enigma.
//!
//! This crate owns everything that touches guest state:
//! - [`WasmEngine`]: Configured Wasmtime engine
//! - [`CompiledModule`]: Compiled WebAssembly module wrapper
//! - [`RuntimeHost`]: Owner of the engine/module/store/instance triple
//! - [`FunctionHandle`] / [`MemoryHandle`]: Exports resolved once by name
//! - [`MemoryView`] / [`MemorySpan`]: Bounds-checked access to guest memory
//! - [`GuestExports`]: The guest export contract and staging protocol
//! - [`SharedHost`]: Mutex-guarded host for multiple owners
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (Created once, immutable)                              │
//! │  - Fuel metering                                        │
//! │  - Compilation settings                                 │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   CompiledModule                        │
//! │  (Retained for the host's lifetime)                     │
//! │  - Validated, compiled machine code                     │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │            Store<HostContext> + Instance                │
//! │  (Exactly one per RuntimeHost)                          │
//! │  - Linear memory, globals                               │
//! │  - Per-call fuel budget, memory limits                  │
//! │  - Call metrics                                         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod dispatch;
pub mod engine;
pub mod exports;
pub mod host;
pub mod memory;
pub mod module;
pub mod protocol;
pub mod shared;
pub mod store;

pub use engine::WasmEngine;
pub use exports::{FunctionHandle, MemoryHandle};
pub use host::RuntimeHost;
pub use memory::{GuestOffset, MemorySpan, MemoryView};
pub use module::CompiledModule;
pub use protocol::{FLOATS_PER_VERTEX, GuestExports, VERTEX_STRIDE};
pub use shared::SharedHost;
