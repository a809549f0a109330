//! `BufferSet<T>` — a pre-allocated rotating buffer supply.
//!
//! The free list is an `rtrb` single-producer/single-consumer ring, the
//! same lock-free structure the teacher's own audio buffer pool
//! (`audio/buffer_pool.rs`) uses for its producer/consumer channels,
//! repurposed here as the recycle queue the spec's `BufferOwner` callback
//! feeds back into.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Weak};

use crate::buffer::raw::{BufferOwner, RawBuffer};
use crate::buffer::typed::{Buffer, Sample};

type Storage = Arc<Mutex<Vec<u8>>>;

struct Inner {
    size_bytes: usize,
    free_producer: Mutex<rtrb::Producer<Storage>>,
    free_consumer: Mutex<rtrb::Consumer<Storage>>,
}

impl BufferOwner for Inner {
    fn buffer_unused(&self, buf: &RawBuffer) {
        if let Some(storage) = buf.storage_arc() {
            // A full free list means num_buffers was undersized for the
            // workload; drop the allocation rather than block or panic.
            let _ = self.free_producer.lock().unwrap().push(storage);
        }
    }
}

/// Owns `count` pre-allocated `Buffer<T>` of equal size. `get_buffer`
/// returns `None` when the pool is exhausted rather than allocating or
/// blocking — callers follow the drop-on-busy discipline from spec §5.
pub struct BufferSet<T: Sample> {
    inner: Arc<Inner>,
    count: usize,
    elements: usize,
    _marker: PhantomData<T>,
}

impl<T: Sample> BufferSet<T> {
    pub fn new(count: usize, elements: usize) -> Self {
        let size_bytes = elements * T::SIZE;
        let (mut producer, consumer) = rtrb::RingBuffer::new(count.max(1));
        for _ in 0..count {
            let _ = producer.push(Arc::new(Mutex::new(vec![0u8; size_bytes])));
        }
        BufferSet {
            inner: Arc::new(Inner {
                size_bytes,
                free_producer: Mutex::new(producer),
                free_consumer: Mutex::new(consumer),
            }),
            count,
            elements,
            _marker: PhantomData,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn buffer_size(&self) -> usize {
        self.elements
    }

    pub fn has_buffer(&self) -> bool {
        !self.inner.free_consumer.lock().unwrap().is_empty()
    }

    /// Pulls a free buffer and tags it with this pool as owner, so it is
    /// automatically returned to the free list once its external refcount
    /// decays to 1.
    pub fn get_buffer(&self) -> Option<Buffer<T>> {
        let storage = self.inner.free_consumer.lock().unwrap().pop().ok()?;
        let owner: Weak<dyn BufferOwner> = Arc::downgrade(&self.inner);
        let raw = RawBuffer::from_storage(storage, self.inner.size_bytes).with_owner(owner);
        Some(Buffer::from_raw(raw))
    }

    /// Reallocates the pool with a new count/size, discarding prior state.
    pub fn resize(&mut self, count: usize, elements: usize) {
        *self = BufferSet::new(count, elements);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_up_to_count_buffers() {
        let pool = BufferSet::<i16>::new(2, 4);
        assert!(pool.has_buffer());
        let a = pool.get_buffer().unwrap();
        let b = pool.get_buffer().unwrap();
        assert!(pool.get_buffer().is_none());
        drop(a);
        drop(b);
    }

    #[test]
    fn recycles_on_unused_notification() {
        let pool = BufferSet::<i16>::new(1, 4);
        let buf = pool.get_buffer().unwrap();
        assert!(pool.get_buffer().is_none());

        let handle = buf.raw().clone();
        assert_eq!(handle.refcount(), 2);
        handle.unref(); // decays 2 -> 1, fires buffer_unused
        assert!(pool.has_buffer());

        let reissued = pool.get_buffer();
        assert!(reissued.is_some());
    }

    #[test]
    #[should_panic]
    fn zero_count_and_size_are_rejected_by_callers() {
        // BufferSet itself tolerates 0 (empty pool); callers that need a
        // non-empty pool should validate before constructing one.
        let pool = BufferSet::<i16>::new(0, 4);
        pool.get_buffer().expect("pool must not be empty");
    }
}
