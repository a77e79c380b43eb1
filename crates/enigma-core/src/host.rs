//! Runtime host lifecycle.
//!
//! [`RuntimeHost`] is the single owner of the engine, the module, and the
//! store/instance pair. Everything that touches guest state goes through it:
//! export resolution ([`crate::exports`]), calls ([`crate::dispatch`]) and
//! memory access ([`crate::memory`]).
//!
//! Resources are acquired in the order engine, module, store, instance and
//! released in reverse, either explicitly through [`RuntimeHost::shutdown`]
//! or implicitly when the host is dropped.

use std::path::Path;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use wasmtime::{Engine, Instance, Linker, Store};

use crate::store::{CallMetrics, HostContext, create_store};
use crate::{CompiledModule, WasmEngine};
use enigma_common::{ExecutionConfig, RuntimeConfig, RuntimeError};

/// The live store/instance pair. Both are created and destroyed together.
pub(crate) struct LiveInstance {
    pub(crate) store: Store<HostContext>,
    pub(crate) instance: Instance,
}

/// Owner of one engine/module/instance triple.
///
/// All operations take the host by reference, so nothing outside it can
/// hold the store. Operations after [`shutdown`](Self::shutdown) fail with
/// [`RuntimeError::UseAfterShutdown`].
///
/// # Example
///
/// ```ignore
/// let mut host = RuntimeHost::new(&RuntimeConfig::default())?;
/// let module = host.load_file("main.wasm")?;
/// host.instantiate(&module)?;
///
/// let get_ptr = host.resolve_function("get_buffer_pointer")?;
/// let offset = host.call_noargs_i32(&get_ptr)?;
/// ```
pub struct RuntimeHost {
    // Field order is drop order: store and instance, then module, then engine.
    live: Option<LiveInstance>,
    module: Option<CompiledModule>,
    engine: Option<WasmEngine>,

    exec_config: ExecutionConfig,
    store_id: Uuid,
    generation: u64,
}

impl RuntimeHost {
    /// Create a host with a freshly configured engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created.
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let engine = WasmEngine::new(&config.engine)?;
        Ok(Self::with_engine(engine, config.execution.clone()))
    }

    /// Create a host around an existing engine.
    pub fn with_engine(engine: WasmEngine, exec_config: ExecutionConfig) -> Self {
        let store_id = Uuid::new_v4();
        debug!(store_id = %store_id, "Runtime host created");

        Self {
            live: None,
            module: None,
            engine: Some(engine),
            exec_config,
            store_id,
            generation: 0,
        }
    }

    /// Compile a module from binary bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Compile`] if the bytes are not a valid module
    /// for this engine.
    pub fn load(&self, bytes: &[u8]) -> Result<CompiledModule, RuntimeError> {
        CompiledModule::from_bytes(self.engine()?.inner(), bytes)
    }

    /// Read and compile a module from a file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<CompiledModule, RuntimeError> {
        CompiledModule::from_file(self.engine()?.inner(), path)
    }

    /// Compile a module from WAT text.
    pub fn load_wat(&self, wat: &str) -> Result<CompiledModule, RuntimeError> {
        CompiledModule::from_wat(self.engine()?.inner(), wat)
    }

    /// Instantiate a module into this host's store.
    ///
    /// No imports are provided. A failed instantiation leaves the host
    /// without an instance, so it may be retried with another module.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Instantiation`] if:
    /// - The host already has a live instance
    /// - The module was compiled by a different engine
    /// - The module requires imports
    /// - The module's start function traps
    #[instrument(skip(self, module), fields(store_id = %self.store_id, content_hash = %module.content_hash()))]
    pub fn instantiate(&mut self, module: &CompiledModule) -> Result<(), RuntimeError> {
        let engine = self.engine()?;

        if self.live.is_some() {
            return Err(RuntimeError::instantiation(
                "host already has a live instance",
            ));
        }

        if !Engine::same(module.inner().engine(), engine.inner()) {
            return Err(RuntimeError::instantiation(
                "module was compiled by a different engine",
            ));
        }

        let mut store = create_store(engine, &self.exec_config, self.store_id)?;

        // No host functions: any import is unresolvable here
        let linker: Linker<HostContext> = Linker::new(engine.inner());
        let instance = linker.instantiate(&mut store, module.inner()).map_err(|e| {
            warn!(error = %e, "Instantiation failed");
            RuntimeError::instantiation(format!("{e:#}"))
        })?;

        self.generation += 1;
        self.live = Some(LiveInstance { store, instance });
        self.module = Some(module.clone());

        info!(
            exports = module.export_names().len(),
            "Module instantiated"
        );

        Ok(())
    }

    /// Release the instance, store, module, and engine, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UseAfterShutdown`] if the host was already
    /// shut down.
    pub fn shutdown(&mut self) -> Result<(), RuntimeError> {
        let Some(engine) = self.engine.take() else {
            return Err(RuntimeError::UseAfterShutdown);
        };

        let calls = self.live.as_ref().map_or(0, |live| live.store.data().metrics.calls);

        drop(self.live.take());
        drop(self.module.take());
        drop(engine);
        self.generation += 1;

        info!(store_id = %self.store_id, calls, "Runtime host shut down");
        Ok(())
    }

    /// Identifier of this host's store.
    pub fn store_id(&self) -> Uuid {
        self.store_id
    }

    /// Current call generation.
    ///
    /// Bumped by every guest call, instantiation and shutdown. Memory spans
    /// issued under an older generation are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` if a module is instantiated.
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.engine.is_none()
    }

    /// The instantiated module, if any.
    pub fn module(&self) -> Option<&CompiledModule> {
        self.module.as_ref()
    }

    /// The execution configuration applied to calls.
    pub fn exec_config(&self) -> &ExecutionConfig {
        &self.exec_config
    }

    /// Call metrics of the live store.
    pub fn metrics(&self) -> Result<&CallMetrics, RuntimeError> {
        Ok(&self.live()?.store.data().metrics)
    }

    pub(crate) fn engine(&self) -> Result<&WasmEngine, RuntimeError> {
        self.engine.as_ref().ok_or(RuntimeError::UseAfterShutdown)
    }

    pub(crate) fn live(&self) -> Result<&LiveInstance, RuntimeError> {
        self.engine()?;
        self.live.as_ref().ok_or(RuntimeError::NotInstantiated)
    }

    pub(crate) fn live_mut(&mut self) -> Result<&mut LiveInstance, RuntimeError> {
        self.engine()?;
        self.live.as_mut().ok_or(RuntimeError::NotInstantiated)
    }

    /// Reject handles issued by another host's store.
    pub(crate) fn check_owner(&self, store_id: Uuid, name: &str) -> Result<(), RuntimeError> {
        if store_id == self.store_id {
            Ok(())
        } else {
            Err(RuntimeError::ForeignHandle {
                name: name.to_string(),
            })
        }
    }

    pub(crate) fn advance_generation(&mut self) {
        self.generation += 1;
    }
}

impl std::fmt::Debug for RuntimeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHost")
            .field("store_id", &self.store_id)
            .field("generation", &self.generation)
            .field("live", &self.is_live())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
