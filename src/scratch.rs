//! Scoped temporary buffers for one compute callback.

use std::cell::RefCell;

/// A byte-buffer arena handed to `compute_with_scratch` callbacks.
///
/// Allocations live exactly as long as the arena, which the worker drops when
/// the callback returns - on every exit path, including panics. Buffers can
/// never escape the callback because their lifetime is tied to the arena
/// borrow.
#[derive(Default)]
pub struct Scratch {
    // Raw pointers from Box::into_raw, not live boxes: moving a Box retags
    // its allocation, which would invalidate slices already handed out.
    buffers: RefCell<Vec<*mut [u8]>>,
}

impl Scratch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed buffer of `len` bytes.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc(&self, len: usize) -> &mut [u8] {
        let raw = Box::into_raw(vec![0u8; len].into_boxed_slice());
        self.buffers.borrow_mut().push(raw);
        // SAFETY: `raw` came from Box::into_raw, so it is valid and uniquely
        // owned until Drop reclaims it, which the returned lifetime outlaws.
        // Only the raw pointer is copied into the vec, never a Box, so the
        // allocation is never retagged. Every call returns a distinct
        // buffer, so no two returned slices alias.
        unsafe { &mut *raw }
    }

    /// Allocate a buffer initialized with a copy of `data`.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_copy(&self, data: &[u8]) -> &mut [u8] {
        let buffer = self.alloc(data.len());
        buffer.copy_from_slice(data);
        buffer
    }

    /// Number of live allocations.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.buffers.borrow().len()
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for raw in self.buffers.get_mut().drain(..) {
            // SAFETY: each pointer was produced by Box::into_raw in `alloc`
            // and is reclaimed exactly once, here.
            drop(unsafe { Box::from_raw(raw) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_zeroed_buffer() {
        let scratch = Scratch::new();
        let buffer = scratch.alloc(16);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn allocations_are_independent() {
        let scratch = Scratch::new();
        let a = scratch.alloc(4);
        let b = scratch.alloc(4);
        a.fill(0xAA);
        b.fill(0xBB);
        assert_eq!(a, &[0xAA; 4]);
        assert_eq!(b, &[0xBB; 4]);
        assert_eq!(scratch.allocation_count(), 2);
    }

    #[test]
    fn alloc_copy_preserves_data() {
        let scratch = Scratch::new();
        let buffer = scratch.alloc_copy(b"hello");
        assert_eq!(buffer, b"hello");
    }
}
