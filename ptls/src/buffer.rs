//! Growable output buffer with a small-size optimization.
//!
//! A [`GrowableBuffer`] starts out backed by a caller-supplied scratch
//! region (typically a stack array) and transparently migrates to owned
//! heap storage the first time it overflows that region. Most handshake
//! flights fit in a few hundred bytes, so the common case never touches
//! the allocator.

use alloc::vec::Vec;
use zeroize::Zeroize;

use crate::error::Error;

enum Storage<'a> {
    Scratch(&'a mut [u8]),
    Heap(Vec<u8>),
}

/// An append-only byte sink that migrates from scratch to heap on growth.
pub struct GrowableBuffer<'a> {
    storage: Storage<'a>,
    used: usize,
}

impl<'a> GrowableBuffer<'a> {
    /// Attach a caller-supplied scratch region. `used` starts at zero.
    pub fn new(scratch: &'a mut [u8]) -> Self {
        Self {
            storage: Storage::Scratch(scratch),
            used: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.used
    }

    /// Whether any bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Whether growth has migrated this buffer to the heap.
    pub fn is_allocated(&self) -> bool {
        matches!(self.storage, Storage::Heap(_))
    }

    /// Current capacity (scratch length, or heap capacity once migrated).
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Scratch(s) => s.len(),
            Storage::Heap(v) => v.capacity(),
        }
    }

    /// Read the bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Scratch(s) => &s[..self.used],
            Storage::Heap(v) => &v[..self.used],
        }
    }

    /// Ensure capacity for at least `used + delta` bytes, migrating
    /// scratch to heap on first overflow and doubling thereafter.
    ///
    /// On allocation failure the buffer is left with its previous
    /// contents untouched.
    pub fn reserve(&mut self, delta: usize) -> Result<(), Error> {
        let needed = self.used + delta;
        if needed <= self.capacity() {
            return Ok(());
        }

        match &mut self.storage {
            Storage::Scratch(scratch) => {
                let target = core::cmp::max(needed, 2 * scratch.len().max(1));
                let mut heap = Vec::new();
                heap.try_reserve_exact(target)
                    .map_err(|_| Error::OUT_OF_MEMORY)?;
                heap.extend_from_slice(&scratch[..self.used]);
                self.storage = Storage::Heap(heap);
                Ok(())
            }
            Storage::Heap(heap) => {
                let target = core::cmp::max(needed, 2 * heap.capacity().max(1));
                let additional = target.saturating_sub(heap.capacity());
                heap.try_reserve_exact(additional)
                    .map_err(|_| Error::OUT_OF_MEMORY)
            }
        }
    }

    /// Append bytes, reserving space first.
    pub fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        self.reserve(data.len())?;
        match &mut self.storage {
            Storage::Scratch(scratch) => {
                scratch[self.used..self.used + data.len()].copy_from_slice(data);
            }
            Storage::Heap(heap) => {
                if heap.len() < self.used + data.len() {
                    heap.resize(self.used + data.len(), 0);
                }
                heap[self.used..self.used + data.len()].copy_from_slice(data);
            }
        }
        self.used += data.len();
        Ok(())
    }

    /// Truncate to `len` bytes. No-op if `len >= self.len()`.
    pub fn truncate(&mut self, len: usize) {
        if len < self.used {
            self.used = len;
        }
    }

    /// Zero every written byte and reset length to zero, without
    /// releasing heap storage (idempotent).
    pub fn wipe(&mut self) {
        match &mut self.storage {
            Storage::Scratch(s) => s[..self.used].zeroize(),
            Storage::Heap(v) => v[..self.used].zeroize(),
        }
        self.used = 0;
    }
}

impl<'a> Drop for GrowableBuffer<'a> {
    fn drop(&mut self) {
        self.wipe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_in_scratch_while_it_fits() {
        let mut scratch = [0u8; 16];
        let mut buf = GrowableBuffer::new(&mut scratch);
        buf.append(&[1, 2, 3]).unwrap();
        assert!(!buf.is_allocated());
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn migrates_to_heap_on_overflow() {
        let mut scratch = [0u8; 4];
        let mut buf = GrowableBuffer::new(&mut scratch);
        buf.append(&[1, 2, 3, 4]).unwrap();
        assert!(!buf.is_allocated());
        buf.append(&[5]).unwrap();
        assert!(buf.is_allocated());
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn doubles_on_heap_growth() {
        let mut scratch = [0u8; 2];
        let mut buf = GrowableBuffer::new(&mut scratch);
        buf.append(&[1, 2, 3]).unwrap();
        let cap_after_migration = buf.capacity();
        buf.append(&[0u8; 64]).unwrap();
        assert!(buf.capacity() >= cap_after_migration);
        assert_eq!(buf.len(), 67);
    }

    #[test]
    fn truncate_shrinks_len_only() {
        let mut scratch = [0u8; 16];
        let mut buf = GrowableBuffer::new(&mut scratch);
        buf.append(&[1, 2, 3, 4]).unwrap();
        buf.truncate(2);
        assert_eq!(buf.as_slice(), &[1, 2]);
    }
}
