//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's [`Module`]
//! that handles validation and compilation of guest binaries.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, instrument};
use wasmtime::{Engine, ExternType, Module};

use enigma_common::{ExportKind, RuntimeError};

/// A compiled WebAssembly module.
///
/// This struct wraps a Wasmtime [`Module`] with metadata for logging and
/// debugging. A module is immutable and stateless; it can be instantiated
/// any number of times, though the runtime host instantiates it once.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    inner: Module,

    /// Hash of the original Wasm bytes.
    content_hash: String,

    /// When this module was compiled.
    compiled_at: Instant,
}

impl CompiledModule {
    /// Compile a module from WebAssembly binary bytes.
    ///
    /// # Arguments
    ///
    /// * `engine` - The Wasmtime engine to use for compilation
    /// * `bytes` - The raw WebAssembly bytes
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Compile`] if the bytes are malformed, use an
    /// unsupported feature, or fail validation.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::from_binary(engine, bytes)
            .map_err(|e| RuntimeError::compile(format!("Module compilation failed: {e:#}")))?;

        let content_hash = compute_hash(bytes);

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
            compiled_at: Instant::now(),
        })
    }

    /// Read and compile a module from a file.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Io`] if the file cannot be read, or
    /// [`RuntimeError::Compile`] if its contents are not a valid module.
    #[instrument(skip(engine, path), fields(path = %path.as_ref().display()))]
    pub fn from_file(engine: &Engine, path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let bytes = std::fs::read(path.as_ref())?;
        debug!(bytes_len = bytes.len(), "Module file read");
        Self::from_bytes(engine, &bytes)
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for testing purposes.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Compile`] if the text does not parse or the
    /// resulting module does not validate.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        let module = Module::new(engine, wat)
            .map_err(|e| RuntimeError::compile(format!("WAT compilation failed: {e:#}")))?;

        let content_hash = compute_hash(wat.as_bytes());

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "WAT module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
            compiled_at: Instant::now(),
        })
    }

    /// Look up the kind of an export without instantiating the module.
    ///
    /// Names are compared as exact byte sequences.
    pub fn export_kind(&self, name: &str) -> Option<ExportKind> {
        self.inner.get_export(name).map(|ty| export_kind_of(&ty))
    }

    /// Names of all exports, in declaration order.
    pub fn export_names(&self) -> Vec<String> {
        self.inner
            .exports()
            .map(|export| export.name().to_string())
            .collect()
    }

    /// Number of imports the module requires.
    pub fn import_count(&self) -> usize {
        self.inner.imports().len()
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get when this module was compiled.
    pub fn compiled_at(&self) -> Instant {
        self.compiled_at
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// Validate WebAssembly header (magic number and version).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::compile("Invalid Wasm: file too small"));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::compile("Invalid Wasm: bad magic number"));
        }

        // Core modules are version 1; components use a different layer
        if bytes[4..8] != [0x01, 0x00, 0x00, 0x00] {
            return Err(RuntimeError::compile(
                "Invalid Wasm: not a version 1 core module",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("imports", &self.import_count())
            .finish_non_exhaustive()
    }
}

/// Classify a Wasmtime extern type.
pub(crate) fn export_kind_of(ty: &ExternType) -> ExportKind {
    match ty {
        ExternType::Func(_) => ExportKind::Function,
        ExternType::Memory(_) => ExportKind::Memory,
        ExternType::Global(_) => ExportKind::Global,
        ExternType::Table(_) => ExportKind::Table,
        #[allow(unreachable_patterns)]
        _ => ExportKind::Other,
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
