//! The guest export contract and the staging protocol built on it.
//!
//! A conforming guest exports:
//! - a linear memory
//! - a zero-argument function returning the offset of an input staging buffer
//! - a function taking the staged input length and returning an `i32` result
//! - optionally, a zero-argument function returning the offset of a vertex
//!   buffer made of interleaved `[x, y, z, r, g, b]` `f32` records
//!
//! [`GuestExports::resolve`] looks all of them up once, so a module missing
//! one fails before any guest code runs.

use tracing::{debug, info, instrument};

use crate::exports::{FunctionHandle, MemoryHandle};
use crate::memory::{GuestOffset, MemorySpan};
use crate::RuntimeHost;
use enigma_common::{ContractConfig, RuntimeError};

/// Number of `f32` components in one vertex (position then color).
pub const FLOATS_PER_VERTEX: usize = 6;

/// Size of one vertex in bytes.
pub const VERTEX_STRIDE: usize = FLOATS_PER_VERTEX * std::mem::size_of::<f32>();

/// Handles for every export of the guest contract.
#[derive(Debug, Clone)]
pub struct GuestExports {
    /// The linear memory.
    pub memory: MemoryHandle,

    /// Returns the offset of the input staging buffer.
    pub buffer_pointer: FunctionHandle,

    /// Processes the staged input.
    pub process: FunctionHandle,

    /// Returns the offset of the vertex buffer.
    pub vertex_pointer: Option<FunctionHandle>,
}

impl GuestExports {
    /// Resolve every export named by the contract.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ExportNotFound`] or
    /// [`RuntimeError::ExportKindMismatch`] for the first export that is
    /// missing or has the wrong kind.
    #[instrument(skip(host, contract), fields(store_id = %host.store_id()))]
    pub fn resolve(host: &mut RuntimeHost, contract: &ContractConfig) -> Result<Self, RuntimeError> {
        let memory = host.resolve_memory(&contract.memory)?;
        let buffer_pointer = host.resolve_function(&contract.buffer_pointer)?;
        let process = host.resolve_function(&contract.process)?;
        let vertex_pointer = contract
            .vertex_export()
            .map(|name| host.resolve_function(name))
            .transpose()?;

        info!(
            rendering = vertex_pointer.is_some(),
            "Guest export contract resolved"
        );

        Ok(Self {
            memory,
            buffer_pointer,
            process,
            vertex_pointer,
        })
    }

    /// Stage `input` in guest memory and run the processing export on it.
    ///
    /// The offset returned by the pointer getter is used immediately and
    /// then discarded; the processing call may move or reuse the buffer.
    ///
    /// # Errors
    ///
    /// Any error from the pointer call, the write, or the processing call.
    #[instrument(skip(self, host, input), fields(input_len = input.len()))]
    pub fn process_input(&self, host: &mut RuntimeHost, input: &[u8]) -> Result<i32, RuntimeError> {
        let offset = GuestOffset::from_guest(host.call_noargs_i32(&self.buffer_pointer)?);
        debug!(offset = %offset, "Staging buffer located");

        host.write_bytes(&self.memory, offset, input)?;

        let len = i32::try_from(input.len()).map_err(|_| RuntimeError::OutOfBounds {
            offset: u64::from(offset.get()),
            len: input.len() as u64,
            memory_len: host.memory_size(&self.memory).unwrap_or_default(),
        })?;

        host.call_i32(&self.process, &[len])
    }

    /// Locate the vertex buffer and issue a span over `vertex_count` vertices.
    ///
    /// Returns `None` when the contract has no vertex export. The span is
    /// issued after the pointer call, so it is valid until the next call.
    ///
    /// # Errors
    ///
    /// Any error from the pointer call, or [`RuntimeError::OutOfBounds`] if
    /// the buffer does not fit in the current memory.
    #[instrument(skip(self, host))]
    pub fn vertex_span(
        &self,
        host: &mut RuntimeHost,
        vertex_count: u32,
    ) -> Result<Option<MemorySpan>, RuntimeError> {
        let Some(vertex_pointer) = &self.vertex_pointer else {
            return Ok(None);
        };

        let offset = GuestOffset::from_guest(host.call_noargs_i32(vertex_pointer)?);
        let len = (vertex_count as usize)
            .checked_mul(VERTEX_STRIDE)
            .ok_or_else(|| RuntimeError::OutOfBounds {
                offset: u64::from(offset.get()),
                len: u64::MAX,
                memory_len: host.memory_size(&self.memory).unwrap_or_default(),
            })?;

        let span = host.span(&self.memory, offset, len)?;
        debug!(offset = %offset, len, "Vertex buffer located");
        Ok(Some(span))
    }
}
