//! Export resolution.
//!
//! Exports are looked up by exact name once, right after instantiation, and
//! turned into typed handles. Every later call or memory access goes through
//! the handle, never through the name.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;
use wasmtime::{Extern, Func, FuncType, Memory, ValType};

use crate::RuntimeHost;
use crate::module::export_kind_of;
use enigma_common::{ExportKind, RuntimeError};

/// A resolved function export.
///
/// The handle records the declared signature so arity and types can be
/// checked before entering guest code.
#[derive(Debug, Clone)]
pub struct FunctionHandle {
    name: Arc<str>,
    func: Func,
    ty: FuncType,
    store_id: Uuid,
}

impl FunctionHandle {
    /// The export name this handle was resolved from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of declared parameters.
    pub fn param_count(&self) -> usize {
        self.ty.params().len()
    }

    /// Number of declared results.
    pub fn result_count(&self) -> usize {
        self.ty.results().len()
    }

    /// Declared parameter types.
    pub fn params(&self) -> impl ExactSizeIterator<Item = ValType> + '_ {
        self.ty.params()
    }

    /// Declared result types.
    pub fn results(&self) -> impl ExactSizeIterator<Item = ValType> + '_ {
        self.ty.results()
    }

    /// Human-readable signature, e.g. `(i32) -> i32`.
    pub fn signature(&self) -> String {
        render_signature(
            self.ty.params().map(|ty| ty.to_string()),
            self.ty.results().map(|ty| ty.to_string()),
        )
    }

    pub(crate) fn func(&self) -> &Func {
        &self.func
    }

    pub(crate) fn store_id(&self) -> Uuid {
        self.store_id
    }
}

/// A resolved memory export.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    name: Arc<str>,
    memory: Memory,
    store_id: Uuid,
}

impl MemoryHandle {
    /// The export name this handle was resolved from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn memory(&self) -> &Memory {
        &self.memory
    }

    pub(crate) fn store_id(&self) -> Uuid {
        self.store_id
    }
}

impl RuntimeHost {
    /// Resolve a function export by exact name.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ExportNotFound`] if no export has this name
    /// - [`RuntimeError::ExportKindMismatch`] if the export is not a function
    pub fn resolve_function(&mut self, name: &str) -> Result<FunctionHandle, RuntimeError> {
        let store_id = self.store_id();
        let live = self.live_mut()?;

        match live.instance.get_export(&mut live.store, name) {
            Some(Extern::Func(func)) => {
                let ty = func.ty(&live.store);
                let handle = FunctionHandle {
                    name: Arc::from(name),
                    func,
                    ty,
                    store_id,
                };
                debug!(name, signature = %handle.signature(), "Function export resolved");
                Ok(handle)
            }
            Some(other) => Err(RuntimeError::ExportKindMismatch {
                name: name.to_string(),
                expected: ExportKind::Function,
                found: export_kind_of(&other.ty(&live.store)),
            }),
            None => Err(RuntimeError::export_not_found(name)),
        }
    }

    /// Resolve a memory export by exact name.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ExportNotFound`] if no export has this name
    /// - [`RuntimeError::ExportKindMismatch`] if the export is not a memory
    pub fn resolve_memory(&mut self, name: &str) -> Result<MemoryHandle, RuntimeError> {
        let store_id = self.store_id();
        let live = self.live_mut()?;

        match live.instance.get_export(&mut live.store, name) {
            Some(Extern::Memory(memory)) => {
                debug!(
                    name,
                    size_bytes = memory.data_size(&live.store),
                    "Memory export resolved"
                );
                Ok(MemoryHandle {
                    name: Arc::from(name),
                    memory,
                    store_id,
                })
            }
            Some(other) => Err(RuntimeError::ExportKindMismatch {
                name: name.to_string(),
                expected: ExportKind::Memory,
                found: export_kind_of(&other.ty(&live.store)),
            }),
            None => Err(RuntimeError::export_not_found(name)),
        }
    }
}

/// Render a signature from parameter and result type names.
pub(crate) fn render_signature(
    params: impl Iterator<Item = String>,
    results: impl Iterator<Item = String>,
) -> String {
    let params: Vec<String> = params.collect();
    let results: Vec<String> = results.collect();

    match results.len() {
        0 => format!("({})", params.join(", ")),
        1 => format!("({}) -> {}", params.join(", "), results[0]),
        _ => format!("({}) -> ({})", params.join(", "), results.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enigma_common::RuntimeConfig;

    const EXPORTS_WAT: &str = r#"
        (module
            (memory (export "memory") 1)
            (global (export "counter") (mut i32) (i32.const 0))
            (table (export "table") 1 funcref)
            (func (export "get_buffer_pointer") (result i32) i32.const 1024)
            (func (export "add") (param i32 i32) (result i32)
                (i32.add (local.get 0) (local.get 1)))
        )
    "#;

    fn live_host() -> RuntimeHost {
        let mut host = RuntimeHost::new(&RuntimeConfig::default()).unwrap();
        let module = host.load_wat(EXPORTS_WAT).unwrap();
        host.instantiate(&module).unwrap();
        host
    }

    #[test]
    fn test_resolve_function() {
        let mut host = live_host();
        let add = host.resolve_function("add").unwrap();

        assert_eq!(add.name(), "add");
        assert_eq!(add.param_count(), 2);
        assert_eq!(add.result_count(), 1);
        assert_eq!(add.signature(), "(i32, i32) -> i32");
    }

    #[test]
    fn test_resolve_memory() {
        let mut host = live_host();
        let memory = host.resolve_memory("memory").unwrap();

        assert_eq!(memory.name(), "memory");
        assert_eq!(memory.store_id(), host.store_id());
    }

    #[test]
    fn test_resolve_missing_export() {
        let mut host = live_host();
        let generation = host.generation();

        let result = host.resolve_function("does_not_exist");
        assert!(matches!(result, Err(RuntimeError::ExportNotFound { ref name }) if name == "does_not_exist"));

        let result = host.resolve_memory("does_not_exist");
        assert!(matches!(result, Err(RuntimeError::ExportNotFound { .. })));

        // Lookup leaves the instance untouched
        assert_eq!(host.generation(), generation);
        assert!(host.resolve_function("add").is_ok());
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut host = live_host();
        let result = host.resolve_memory("Memory");
        assert!(matches!(result, Err(RuntimeError::ExportNotFound { .. })));
    }

    #[test]
    fn test_kind_mismatch() {
        let mut host = live_host();

        let result = host.resolve_function("memory");
        assert!(matches!(
            result,
            Err(RuntimeError::ExportKindMismatch {
                expected: ExportKind::Function,
                found: ExportKind::Memory,
                ..
            })
        ));

        let result = host.resolve_function("counter");
        assert!(matches!(
            result,
            Err(RuntimeError::ExportKindMismatch {
                found: ExportKind::Global,
                ..
            })
        ));

        let result = host.resolve_memory("table");
        assert!(matches!(
            result,
            Err(RuntimeError::ExportKindMismatch {
                expected: ExportKind::Memory,
                found: ExportKind::Table,
                ..
            })
        ));

        let result = host.resolve_memory("add");
        assert!(matches!(
            result,
            Err(RuntimeError::ExportKindMismatch {
                found: ExportKind::Function,
                ..
            })
        ));
    }

    #[test]
    fn test_resolve_before_instantiation() {
        let mut host = RuntimeHost::new(&RuntimeConfig::default()).unwrap();
        let result = host.resolve_function("add");
        assert!(matches!(result, Err(RuntimeError::NotInstantiated)));
    }

    #[test]
    fn test_resolve_after_shutdown() {
        let mut host = live_host();
        host.shutdown().unwrap();

        let result = host.resolve_memory("memory");
        assert!(matches!(result, Err(RuntimeError::UseAfterShutdown)));
    }

    #[test]
    fn test_render_signature() {
        let names = |list: &[&str]| list.iter().map(ToString::to_string).collect::<Vec<_>>();

        assert_eq!(
            render_signature(names(&[]).into_iter(), names(&["i32"]).into_iter()),
            "() -> i32"
        );
        assert_eq!(
            render_signature(names(&["i64"]).into_iter(), names(&[]).into_iter()),
            "(i64)"
        );
        assert_eq!(
            render_signature(
                names(&["i32", "f32"]).into_iter(),
                names(&["i32", "i32"]).into_iter()
            ),
            "(i32, f32) -> (i32, i32)"
        );
    }
}
