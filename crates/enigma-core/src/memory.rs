//! Guest memory bridge.
//!
//! Guest memory is addressed by [`GuestOffset`], an index that only means
//! something against the memory's current length. The bridge offers three
//! ways to touch it:
//!
//! - [`MemoryView`]: a borrowed window. It borrows the host, and every guest
//!   call needs the host mutably, so the compiler rejects holding a view
//!   across a call.
//! - [`RuntimeHost::read_bytes`] / [`RuntimeHost::write_bytes`]: bounds-checked
//!   copies in and out.
//! - [`MemorySpan`]: an `(memory, offset, length)` triple for collaborators
//!   such as a renderer. A span is re-resolved on every use and goes stale as
//!   soon as the host calls into the guest again.

use std::fmt;
use std::ops::Range;

use tracing::trace;

use crate::RuntimeHost;
use crate::exports::MemoryHandle;
use enigma_common::RuntimeError;

/// An offset into guest linear memory.
///
/// This is not a pointer: it has to be resolved against a fresh view of the
/// memory every time it is dereferenced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuestOffset(u32);

impl GuestOffset {
    /// Create an offset from a raw value.
    pub const fn new(offset: u32) -> Self {
        Self(offset)
    }

    /// Interpret an `i32` returned by guest code as an offset.
    ///
    /// Wasm has no unsigned types; pointers travel as `i32` bit patterns.
    #[allow(clippy::cast_sign_loss)]
    pub const fn from_guest(value: i32) -> Self {
        Self(value as u32)
    }

    /// The raw offset value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for GuestOffset {
    fn from(offset: u32) -> Self {
        Self(offset)
    }
}

impl fmt::Display for GuestOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A transient window into the current backing storage of a memory.
///
/// Valid only while the host is not borrowed mutably; memory growth inside
/// any guest call may move the backing storage.
#[derive(Clone, Copy)]
pub struct MemoryView<'a> {
    bytes: &'a [u8],
}

impl<'a> MemoryView<'a> {
    /// Base address of the backing storage at this instant.
    pub fn base(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    /// Current length of the memory in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the memory has no pages.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The whole memory as a byte slice.
    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }

    /// A bounds-checked sub-slice.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::OutOfBounds`] if the range exceeds the view.
    pub fn get(&self, offset: GuestOffset, len: usize) -> Result<&'a [u8], RuntimeError> {
        let range = checked_range(offset, len, self.bytes.len())?;
        Ok(&self.bytes[range])
    }
}

impl fmt::Debug for MemoryView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryView")
            .field("base", &self.base())
            .field("len", &self.len())
            .finish()
    }
}

/// A region of guest memory handed to a collaborator.
///
/// Holds no address. Each use goes back through the host, which re-checks
/// bounds against the current memory and rejects the span if any guest call
/// happened since it was issued.
#[derive(Debug, Clone)]
pub struct MemorySpan {
    memory: MemoryHandle,
    offset: GuestOffset,
    len: usize,
    generation: u64,
}

impl MemorySpan {
    /// Offset of the first byte.
    pub fn offset(&self) -> GuestOffset {
        self.offset
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the span covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Host generation the span was issued at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The memory the span points into.
    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }
}

impl RuntimeHost {
    /// Get a view of the memory as it is right now.
    ///
    /// Must be requested again after every guest call.
    pub fn current_view(&self, memory: &MemoryHandle) -> Result<MemoryView<'_>, RuntimeError> {
        let live = self.live()?;
        self.check_owner(memory.store_id(), memory.name())?;

        Ok(MemoryView {
            bytes: memory.memory().data(&live.store),
        })
    }

    /// Current size of the memory in bytes.
    pub fn memory_size(&self, memory: &MemoryHandle) -> Result<usize, RuntimeError> {
        Ok(self.current_view(memory)?.len())
    }

    /// Copy `data` into guest memory at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::OutOfBounds`] if `offset + data.len()` exceeds
    /// the current memory length. Nothing is written in that case.
    pub fn write_bytes(
        &mut self,
        memory: &MemoryHandle,
        offset: GuestOffset,
        data: &[u8],
    ) -> Result<(), RuntimeError> {
        self.live()?;
        self.check_owner(memory.store_id(), memory.name())?;

        let live = self.live_mut()?;
        let bytes = memory.memory().data_mut(&mut live.store);
        let range = checked_range(offset, data.len(), bytes.len())?;
        bytes[range].copy_from_slice(data);

        trace!(offset = %offset, len = data.len(), "Bytes written to guest memory");
        Ok(())
    }

    /// Copy `len` bytes out of guest memory at `offset`.
    ///
    /// The result is owned, so it stays valid however the memory changes
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::OutOfBounds`] if the range exceeds the
    /// current memory length.
    pub fn read_bytes(
        &self,
        memory: &MemoryHandle,
        offset: GuestOffset,
        len: usize,
    ) -> Result<Vec<u8>, RuntimeError> {
        Ok(self.current_view(memory)?.get(offset, len)?.to_vec())
    }

    /// Issue a span over `len` bytes at `offset`, bounds-checked now.
    pub fn span(
        &self,
        memory: &MemoryHandle,
        offset: GuestOffset,
        len: usize,
    ) -> Result<MemorySpan, RuntimeError> {
        self.current_view(memory)?.get(offset, len)?;

        Ok(MemorySpan {
            memory: memory.clone(),
            offset,
            len,
            generation: self.generation(),
        })
    }

    /// Run `f` over the bytes of a span without copying them.
    ///
    /// The slice cannot outlive the closure; a consumer that needs the data
    /// later must copy it inside `f`.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::StaleView`] if a guest call happened since the span
    ///   was issued
    /// - [`RuntimeError::OutOfBounds`] if the span no longer fits the memory
    pub fn with_span<R>(
        &self,
        span: &MemorySpan,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, RuntimeError> {
        let bytes = self.resolve_span(span)?;
        Ok(f(bytes))
    }

    /// Copy the bytes of a span.
    pub fn copy_span(&self, span: &MemorySpan) -> Result<Vec<u8>, RuntimeError> {
        self.with_span(span, <[u8]>::to_vec)
    }

    fn resolve_span(&self, span: &MemorySpan) -> Result<&[u8], RuntimeError> {
        let view = self.current_view(&span.memory)?;

        if span.generation != self.generation() {
            return Err(RuntimeError::StaleView {
                issued: span.generation,
                current: self.generation(),
            });
        }

        view.get(span.offset, span.len)
    }
}

/// Compute `offset..offset + len`, rejecting ranges past `memory_len`.
fn checked_range(
    offset: GuestOffset,
    len: usize,
    memory_len: usize,
) -> Result<Range<usize>, RuntimeError> {
    let start = offset.get() as usize;
    match start.checked_add(len) {
        Some(end) if end <= memory_len => Ok(start..end),
        _ => Err(RuntimeError::OutOfBounds {
            offset: u64::from(offset.get()),
            len: len as u64,
            memory_len,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enigma_common::RuntimeConfig;

    const PAGE: usize = 65_536;

    const MEMORY_WAT: &str = r#"
        (module
            (memory (export "memory") 1)
            (data (i32.const 16) "guest")
            (func (export "grow") (param i32) (result i32)
                (memory.grow (local.get 0)))
            (func (export "noop") (result i32) i32.const 0)
        )
    "#;

    fn live_host() -> (RuntimeHost, MemoryHandle) {
        let mut host = RuntimeHost::new(&RuntimeConfig::default()).unwrap();
        let module = host.load_wat(MEMORY_WAT).unwrap();
        host.instantiate(&module).unwrap();
        let memory = host.resolve_memory("memory").unwrap();
        (host, memory)
    }

    #[test]
    fn test_guest_offset() {
        assert_eq!(GuestOffset::from_guest(1024).get(), 1024);
        assert_eq!(GuestOffset::from_guest(-1).get(), u32::MAX);
        assert_eq!(GuestOffset::from(16).to_string(), "0x10");
    }

    #[test]
    fn test_current_view() {
        let (host, memory) = live_host();
        let view = host.current_view(&memory).unwrap();

        assert_eq!(view.len(), PAGE);
        assert!(!view.is_empty());
        assert!(!view.base().is_null());
        assert_eq!(view.get(GuestOffset::new(16), 5).unwrap(), b"guest");
    }

    #[test]
    fn test_round_trip() {
        let (mut host, memory) = live_host();
        let data = b"WebAssembly is excellent!";

        host.write_bytes(&memory, GuestOffset::new(1024), data).unwrap();
        let read = host
            .read_bytes(&memory, GuestOffset::new(1024), data.len())
            .unwrap();

        assert_eq!(read, data);
    }

    #[test]
    fn test_write_boundary() {
        let (mut host, memory) = live_host();
        let data = [0xAB; 8];

        // Ends exactly at the memory length
        let last = GuestOffset::new(u32::try_from(PAGE - data.len()).unwrap());
        assert!(host.write_bytes(&memory, last, &data).is_ok());

        // One byte past the end
        let past = GuestOffset::new(u32::try_from(PAGE - data.len() + 1).unwrap());
        let result = host.write_bytes(&memory, past, &data);
        assert!(matches!(
            result,
            Err(RuntimeError::OutOfBounds {
                len: 8,
                memory_len: PAGE,
                ..
            })
        ));
    }

    #[test]
    fn test_failed_write_leaves_memory_untouched() {
        let (mut host, memory) = live_host();
        let past = GuestOffset::new(u32::try_from(PAGE - 2).unwrap());

        host.write_bytes(&memory, past, b"abcd").unwrap_err();
        let tail = host.read_bytes(&memory, past, 2).unwrap();
        assert_eq!(tail, [0, 0]);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let (host, memory) = live_host();

        let result = host.read_bytes(&memory, GuestOffset::new(u32::MAX), 1);
        assert!(matches!(result, Err(RuntimeError::OutOfBounds { .. })));

        let result = host.read_bytes(&memory, GuestOffset::new(0), PAGE + 1);
        assert!(matches!(result, Err(RuntimeError::OutOfBounds { .. })));

        // Zero-length read at the very end is in bounds
        let end = GuestOffset::new(u32::try_from(PAGE).unwrap());
        assert!(host.read_bytes(&memory, end, 0).unwrap().is_empty());
    }

    #[test]
    fn test_span_round_trip() {
        let (host, memory) = live_host();
        let span = host.span(&memory, GuestOffset::new(16), 5).unwrap();

        assert_eq!(span.len(), 5);
        assert_eq!(span.offset(), GuestOffset::new(16));
        assert_eq!(span.memory().name(), "memory");
        assert_eq!(host.copy_span(&span).unwrap(), b"guest");

        let first = host.with_span(&span, |bytes| bytes[0]).unwrap();
        assert_eq!(first, b'g');
    }

    #[test]
    fn test_span_bounds_checked_at_issue() {
        let (host, memory) = live_host();
        let result = host.span(&memory, GuestOffset::new(u32::try_from(PAGE).unwrap()), 1);
        assert!(matches!(result, Err(RuntimeError::OutOfBounds { .. })));
    }

    #[test]
    fn test_span_stale_after_call() {
        let (mut host, memory) = live_host();
        let span = host.span(&memory, GuestOffset::new(16), 5).unwrap();

        let noop = host.resolve_function("noop").unwrap();
        host.call_noargs_i32(&noop).unwrap();

        let result = host.copy_span(&span);
        assert!(matches!(result, Err(RuntimeError::StaleView { .. })));

        // Re-issuing after the call works
        let fresh = host.span(&memory, span.offset(), span.len()).unwrap();
        assert_eq!(host.copy_span(&fresh).unwrap(), b"guest");
    }

    #[test]
    fn test_view_reflects_growth() {
        let (mut host, memory) = live_host();
        let grow = host.resolve_function("grow").unwrap();

        let previous_pages = host.call_i32(&grow, &[1]).unwrap();
        assert_eq!(previous_pages, 1);

        let view = host.current_view(&memory).unwrap();
        assert_eq!(view.len(), 2 * PAGE);
        // Data survives growth at the same offset
        assert_eq!(view.get(GuestOffset::new(16), 5).unwrap(), b"guest");

        // The new page is addressable
        let offset = GuestOffset::new(u32::try_from(PAGE + 8).unwrap());
        host.write_bytes(&memory, offset, b"grown").unwrap();
        assert_eq!(host.read_bytes(&memory, offset, 5).unwrap(), b"grown");
    }

    #[test]
    fn test_memory_size() {
        let (host, memory) = live_host();
        assert_eq!(host.memory_size(&memory).unwrap(), PAGE);
    }

    #[test]
    fn test_memory_after_shutdown() {
        let (mut host, memory) = live_host();
        host.shutdown().unwrap();

        assert!(matches!(
            host.current_view(&memory),
            Err(RuntimeError::UseAfterShutdown)
        ));
        assert!(matches!(
            host.write_bytes(&memory, GuestOffset::new(0), b"x"),
            Err(RuntimeError::UseAfterShutdown)
        ));
    }

    #[test]
    fn test_checked_range() {
        assert_eq!(checked_range(GuestOffset::new(4), 4, 8).unwrap(), 4..8);
        assert!(checked_range(GuestOffset::new(5), 4, 8).is_err());
        assert!(checked_range(GuestOffset::new(8), 0, 8).is_ok());
    }
}
