//! Error types for enigma.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RuntimeError`]: Errors from the runtime host and memory bridge
//! - [`HostError`]: Errors from the collaborators fed by the bridge

use std::fmt;
use std::io;

use thiserror::Error;

/// The kind of item an export refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// A callable function.
    Function,
    /// A linear memory.
    Memory,
    /// A global variable.
    Global,
    /// A table.
    Table,
    /// Anything else the engine can export.
    Other,
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportKind::Function => write!(f, "function"),
            ExportKind::Memory => write!(f, "memory"),
            ExportKind::Global => write!(f, "global"),
            ExportKind::Table => write!(f, "table"),
            ExportKind::Other => write!(f, "other"),
        }
    }
}

/// Errors from the runtime host and memory bridge.
///
/// Every host operation reports failure through this type. None of these
/// conditions are transient, so nothing in the core retries them.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The bytes are not a valid module for the configured engine.
    #[error("Compilation failed: {reason}")]
    Compile {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The module could not be instantiated.
    ///
    /// Either it requires imports this host does not provide, or its start
    /// function trapped.
    #[error("Instantiation failed: {reason}")]
    Instantiation {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// An instance operation was attempted before a module was instantiated.
    #[error("No module has been instantiated")]
    NotInstantiated,

    /// No export with this exact name exists.
    #[error("Export not found: {name}")]
    ExportNotFound {
        /// The export name that was looked up.
        name: String,
    },

    /// The export exists but is of a different kind.
    #[error("Export '{name}' is a {found}, expected a {expected}")]
    ExportKindMismatch {
        /// The export name that was looked up.
        name: String,
        /// The kind the caller asked for.
        expected: ExportKind,
        /// The kind the export actually has.
        found: ExportKind,
    },

    /// The number of supplied arguments differs from the declared parameters.
    #[error("Function '{function}' takes {expected} argument(s), {found} supplied")]
    ArityMismatch {
        /// The function export name.
        function: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },

    /// A declared parameter or result type differs from the one supplied.
    #[error("Function '{function}' has type {found}, expected {expected}")]
    TypeMismatch {
        /// The function export name.
        function: String,
        /// The signature the caller assumed.
        expected: String,
        /// The signature the function declares.
        found: String,
    },

    /// A memory access fell outside the current memory length.
    #[error("Access of {len} byte(s) at offset {offset} is out of bounds (memory size: {memory_len})")]
    OutOfBounds {
        /// Guest offset of the access.
        offset: u64,
        /// Length of the access in bytes.
        len: u64,
        /// Memory length at the time of the access.
        memory_len: usize,
    },

    /// Guest execution raised a runtime trap.
    #[error("Guest trap in '{function}': {}", .message.as_deref().unwrap_or("no diagnostic"))]
    GuestTrap {
        /// The function export name.
        function: String,
        /// Diagnostic message from the guest runtime.
        message: Option<String>,
        /// Trap code if available.
        code: Option<String>,
    },

    /// Guest execution ran out of its fuel budget.
    #[error("Execution budget of {budget} fuel exceeded in '{function}'")]
    ExecutionBudgetExceeded {
        /// The function export name.
        function: String,
        /// The fuel budget granted to the call.
        budget: u64,
    },

    /// The host has been shut down.
    #[error("Runtime host used after shutdown")]
    UseAfterShutdown,

    /// Another caller currently owns the host.
    #[error("Runtime host is in use by another caller")]
    ConcurrentAccessDenied,

    /// A memory span was used after a later guest call.
    #[error("Memory span issued at call generation {issued} is stale (current: {current})")]
    StaleView {
        /// Generation the span was issued at.
        issued: u64,
        /// Current generation of the host.
        current: u64,
    },

    /// A handle was used with a host other than the one that issued it.
    #[error("Handle for '{name}' belongs to a different store")]
    ForeignHandle {
        /// The export name the handle was resolved from.
        name: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from the collaborators that consume bridge output.
#[derive(Error, Debug)]
pub enum HostError {
    /// The result journal could not be written.
    #[error("Journal I/O failed for '{path}': {source}")]
    JournalIo {
        /// Path of the journal file.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A journal entry could not be serialized.
    #[error("Journal serialization failed: {0}")]
    JournalSerialization(#[from] serde_json::Error),

    /// Vertex data does not divide into whole vertices.
    #[error("Malformed vertex data: {len} byte(s) is not a multiple of the {stride}-byte stride")]
    MalformedVertexData {
        /// Length of the supplied data in bytes.
        len: usize,
        /// Size of one vertex in bytes.
        stride: usize,
    },
}

impl RuntimeError {
    /// Create a new `Compile` error.
    pub fn compile(reason: impl Into<String>) -> Self {
        Self::Compile {
            reason: reason.into(),
        }
    }

    /// Create a new `Instantiation` error.
    pub fn instantiation(reason: impl Into<String>) -> Self {
        Self::Instantiation {
            reason: reason.into(),
        }
    }

    /// Create a new `ExportNotFound` error.
    pub fn export_not_found(name: impl Into<String>) -> Self {
        Self::ExportNotFound { name: name.into() }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error means the module does not fit this host.
    ///
    /// A caller may retry startup with a different module after one of these.
    pub fn is_fatal_for_module(&self) -> bool {
        matches!(
            self,
            Self::Compile { .. }
                | Self::Instantiation { .. }
                | Self::ExportNotFound { .. }
                | Self::ExportKindMismatch { .. }
        )
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::ExecutionBudgetExceeded { .. })
    }
}
