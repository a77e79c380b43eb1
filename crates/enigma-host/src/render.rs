//! Rendering collaborator.
//!
//! The renderer receives vertex data as plain bytes. Guest memory is never
//! exposed to it directly: a [`VertexSink`] is handed a borrowed slice that
//! is only valid for the duration of [`VertexSink::upload`], so every sink
//! must copy what it needs before returning.

use tracing::debug;

use enigma_common::HostError;
use enigma_core::{FLOATS_PER_VERTEX, VERTEX_STRIDE};

/// One vertex: a position followed by an RGB color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// `x, y, z`
    pub position: [f32; 3],
    /// `r, g, b`
    pub color: [f32; 3],
}

impl Vertex {
    fn from_record(record: &[u8]) -> Self {
        let mut floats = [0.0f32; FLOATS_PER_VERTEX];
        for (value, chunk) in floats.iter_mut().zip(record.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self {
            position: [floats[0], floats[1], floats[2]],
            color: [floats[3], floats[4], floats[5]],
        }
    }
}

/// Receives vertex data for upload.
pub trait VertexSink {
    /// Upload interleaved little-endian `[x, y, z, r, g, b]` records.
    ///
    /// `bytes` is borrowed from guest memory and must be copied.
    fn upload(&mut self, bytes: &[u8]) -> Result<(), HostError>;
}

/// A host-owned copy of uploaded vertex data.
#[derive(Debug, Clone, Default)]
pub struct VertexBuffer {
    data: Vec<u8>,
    uploads: u64,
}

impl VertexBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy vertex records out of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HostError> {
        let mut buffer = Self::new();
        buffer.upload(bytes)?;
        Ok(buffer)
    }

    /// Decode the stored records.
    pub fn vertices(&self) -> Vec<Vertex> {
        self.data
            .chunks_exact(VERTEX_STRIDE)
            .map(Vertex::from_record)
            .collect()
    }

    /// Number of stored vertices.
    pub fn vertex_count(&self) -> usize {
        self.data.len() / VERTEX_STRIDE
    }

    /// The stored bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// How many uploads this buffer has received.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}

impl VertexSink for VertexBuffer {
    fn upload(&mut self, bytes: &[u8]) -> Result<(), HostError> {
        if bytes.len() % VERTEX_STRIDE != 0 {
            return Err(HostError::MalformedVertexData {
                len: bytes.len(),
                stride: VERTEX_STRIDE,
            });
        }

        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.uploads += 1;

        debug!(
            vertices = self.vertex_count(),
            bytes = bytes.len(),
            "Vertex data uploaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(floats: &[f32]) -> Vec<u8> {
        floats.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn triangle() -> Vec<f32> {
        vec![
            -0.5, -0.5, 0.0, 1.0, 0.0, 0.0, //
            0.5, -0.5, 0.0, 0.0, 1.0, 0.0, //
            0.0, 0.5, 0.0, 0.0, 0.0, 1.0,
        ]
    }

    #[test]
    fn test_from_bytes_decodes_triangle() {
        let buffer = VertexBuffer::from_bytes(&encode(&triangle())).unwrap();

        assert_eq!(buffer.vertex_count(), 3);
        let vertices = buffer.vertices();
        assert_eq!(vertices[0].position, [-0.5, -0.5, 0.0]);
        assert_eq!(vertices[0].color, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[2].position, [0.0, 0.5, 0.0]);
        assert_eq!(vertices[2].color, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_partial_vertex_rejected() {
        let mut bytes = encode(&triangle());
        bytes.pop();

        let result = VertexBuffer::from_bytes(&bytes);
        assert!(matches!(
            result,
            Err(HostError::MalformedVertexData { len: 71, stride: 24 })
        ));
    }

    #[test]
    fn test_upload_replaces_and_copies() {
        let mut source = encode(&triangle());
        let mut buffer = VertexBuffer::new();

        buffer.upload(&source).unwrap();
        source.fill(0);

        // The buffer kept its own copy
        assert_eq!(buffer.vertices()[1].color, [0.0, 1.0, 0.0]);

        buffer.upload(&source[..VERTEX_STRIDE]).unwrap();
        assert_eq!(buffer.vertex_count(), 1);
        assert_eq!(buffer.uploads(), 2);
    }

    #[test]
    fn test_upload_from_guest_span() {
        use enigma_common::{ContractConfig, RuntimeConfig};
        use enigma_core::{GuestExports, GuestOffset, RuntimeHost};

        let mut host = RuntimeHost::new(&RuntimeConfig::default()).unwrap();
        let module = host
            .load_wat(
                r#"(module
                    (memory (export "memory") 1)
                    (func (export "get_buffer_pointer") (result i32) i32.const 0)
                    (func (export "process_string") (param i32) (result i32) i32.const 0)
                    (func (export "get_vertex_ptr") (result i32) i32.const 64))"#,
            )
            .unwrap();
        host.instantiate(&module).unwrap();
        let exports = GuestExports::resolve(&mut host, &ContractConfig::default()).unwrap();

        host.write_bytes(&exports.memory, GuestOffset::new(64), &encode(&triangle()))
            .unwrap();
        let span = exports.vertex_span(&mut host, 3).unwrap().unwrap();

        let mut buffer = VertexBuffer::new();
        host.with_span(&span, |bytes| buffer.upload(bytes))
            .unwrap()
            .unwrap();

        assert_eq!(buffer.vertex_count(), 3);
        assert_eq!(buffer.vertices()[1].position, [0.5, -0.5, 0.0]);
    }

    #[test]
    fn test_empty_upload() {
        let buffer = VertexBuffer::from_bytes(&[]).unwrap();

        assert_eq!(buffer.vertex_count(), 0);
        assert!(buffer.vertices().is_empty());
        assert!(buffer.as_bytes().is_empty());
    }
}
