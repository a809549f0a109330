//! Fixed-capacity ring buffers used by merge/combine nodes.

use crate::buffer::typed::Sample;

/// A fixed-capacity byte ring with a take-index and stored-byte count.
/// All operations are total except `put` (fails if `src` exceeds free
/// space) and `take`/`drop_n` (fail if fewer bytes are stored than
/// requested) — on failure the ring is left unchanged.
pub struct RawRingBuffer {
    data: Vec<u8>,
    take_idx: usize,
    stored: usize,
}

impl RawRingBuffer {
    pub fn new(capacity: usize) -> Self {
        RawRingBuffer {
            data: vec![0u8; capacity],
            take_idx: 0,
            stored: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn bytes_len(&self) -> usize {
        self.stored
    }

    pub fn bytes_free(&self) -> usize {
        self.capacity() - self.stored
    }

    pub fn clear(&mut self) {
        self.take_idx = 0;
        self.stored = 0;
    }

    pub fn resize(&mut self, capacity: usize) {
        self.data = vec![0u8; capacity];
        self.clear();
    }

    /// Appends `src`; fails (returns `false`, no state change) if it does
    /// not fit in the free space.
    pub fn put(&mut self, src: &[u8]) -> bool {
        if src.len() > self.bytes_free() {
            return false;
        }
        let cap = self.capacity();
        let write_idx = (self.take_idx + self.stored) % cap;
        let first_len = (cap - write_idx).min(src.len());
        self.data[write_idx..write_idx + first_len].copy_from_slice(&src[..first_len]);
        if first_len < src.len() {
            let rest = src.len() - first_len;
            self.data[..rest].copy_from_slice(&src[first_len..]);
        }
        self.stored += src.len();
        true
    }

    /// Copies the next `dst.len()` bytes out without removing them from
    /// the caller's perspective being separate from `drop_n` — matches
    /// the source's `take` semantics of read-then-advance.
    pub fn take(&mut self, dst: &mut [u8]) -> bool {
        if dst.len() > self.stored {
            return false;
        }
        let cap = self.capacity();
        let first_len = (cap - self.take_idx).min(dst.len());
        dst[..first_len].copy_from_slice(&self.data[self.take_idx..self.take_idx + first_len]);
        if first_len < dst.len() {
            let rest = dst.len() - first_len;
            dst[first_len..].copy_from_slice(&self.data[..rest]);
        }
        self.take_idx = (self.take_idx + dst.len()) % cap;
        self.stored -= dst.len();
        true
    }

    /// Discards `n` bytes without copying them out.
    pub fn drop_n(&mut self, n: usize) -> bool {
        if n > self.stored {
            return false;
        }
        self.take_idx = (self.take_idx + n) % self.capacity();
        self.stored -= n;
        true
    }
}

/// Element-counted wrapper over `RawRingBuffer`.
pub struct RingBuffer<T> {
    raw: RawRingBuffer,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Sample> RingBuffer<T> {
    pub fn new(capacity_elements: usize) -> Self {
        RingBuffer {
            raw: RawRingBuffer::new(capacity_elements * T::SIZE),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.raw.capacity() / T::SIZE
    }

    pub fn len(&self) -> usize {
        self.raw.bytes_len() / T::SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free(&self) -> usize {
        self.raw.bytes_free() / T::SIZE
    }

    pub fn clear(&mut self) {
        self.raw.clear();
    }

    pub fn resize(&mut self, capacity_elements: usize) {
        self.raw.resize(capacity_elements * T::SIZE);
    }

    pub fn put(&mut self, values: &[T]) -> bool {
        let mut bytes = vec![0u8; values.len() * T::SIZE];
        for (chunk, v) in bytes.chunks_exact_mut(T::SIZE).zip(values) {
            v.to_bytes(chunk);
        }
        self.raw.put(&bytes)
    }

    pub fn take(&mut self, n: usize) -> Option<Vec<T>> {
        let mut bytes = vec![0u8; n * T::SIZE];
        if !self.raw.take(&mut bytes) {
            return None;
        }
        Some(bytes.chunks_exact(T::SIZE).map(T::from_bytes).collect())
    }

    pub fn drop_n(&mut self, n: usize) -> bool {
        self.raw.drop_n(n * T::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_three_scenario() {
        // Scenario S3.
        let mut rb = RawRingBuffer::new(3);
        assert!(rb.put(b"a"));
        assert!(rb.put(b"bc"));
        assert!(!rb.put(b"x")); // third put must fail, state unchanged
        assert_eq!(rb.bytes_len(), 3);

        let mut out = [0u8; 1];
        assert!(rb.take(&mut out));
        assert_eq!(&out, b"a");

        let mut out2 = [0u8; 2];
        assert!(rb.take(&mut out2));
        assert_eq!(&out2, b"bc");

        assert!(rb.put(b"cab"));
        let mut out3 = [0u8; 3];
        assert!(rb.take(&mut out3));
        assert_eq!(&out3, b"cab");
    }

    #[test]
    fn len_plus_free_equals_capacity() {
        // Invariant 4, across a sequence of accepted operations.
        let mut rb = RawRingBuffer::new(8);
        for op in [b"ab".as_slice(), b"cde".as_slice()] {
            rb.put(op);
            assert_eq!(rb.bytes_len() + rb.bytes_free(), rb.capacity());
        }
        let mut scratch = [0u8; 2];
        rb.take(&mut scratch);
        assert_eq!(rb.bytes_len() + rb.bytes_free(), rb.capacity());
        rb.drop_n(1);
        assert_eq!(rb.bytes_len() + rb.bytes_free(), rb.capacity());
    }

    #[test]
    fn typed_ring_roundtrip() {
        let mut rb = RingBuffer::<i16>::new(4);
        assert!(rb.put(&[1, 2, 3]));
        assert_eq!(rb.take(2), Some(vec![1, 2]));
        assert_eq!(rb.len(), 1);
    }
}
