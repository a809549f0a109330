//! Untyped, reference-counted contiguous storage with owner notification.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Notified when a buffer it owns becomes unused (refcount decays to 1).
/// Implemented by `BufferSet` to recycle buffers into its free list.
pub trait BufferOwner: Send + Sync {
    fn buffer_unused(&self, buf: &RawBuffer);
}

/// The untyped storage primitive. Cheap to clone: cloning shares the
/// underlying bytes and bumps the shared refcount, mirroring the source
/// project's copy-constructor-calls-ref() behaviour rather than Rust's
/// usual move/clone-is-independent convention.
///
/// Buffer lifetime is managed explicitly via `ref()`/`unref()`, not via
/// `Drop` — this is a deliberate departure from RAII to stay faithful to
/// the spec's "owner is notified when refcount decays from 2 to 1" protocol,
/// which callers (the Queue, BufferSet) invoke at precise points rather than
/// relying on scope exit.
#[derive(Clone)]
pub struct RawBuffer {
    storage: Option<Arc<Mutex<Vec<u8>>>>,
    storage_size: usize,
    offset: usize,
    length: usize,
    refcount: Option<Arc<AtomicUsize>>,
    owner: Option<Weak<dyn BufferOwner>>,
}

impl RawBuffer {
    /// Allocates `size` zeroed bytes with refcount 1 and no owner.
    pub fn new(size: usize) -> Self {
        RawBuffer {
            storage: Some(Arc::new(Mutex::new(vec![0u8; size]))),
            storage_size: size,
            offset: 0,
            length: size,
            refcount: Some(Arc::new(AtomicUsize::new(1))),
            owner: None,
        }
    }

    /// An empty buffer: no storage, no refcount, never triggers ownership
    /// callbacks. Returned by out-of-range subviews and failed allocations.
    pub fn empty() -> Self {
        RawBuffer {
            storage: None,
            storage_size: 0,
            offset: 0,
            length: 0,
            refcount: None,
            owner: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_none()
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn storage_size(&self) -> usize {
        self.storage_size
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Constructs a fresh buffer (refcount 1, no owner) reusing an existing
    /// storage allocation. Used by `BufferSet` to reissue a recycled
    /// buffer without reallocating.
    pub(crate) fn from_storage(storage: Arc<Mutex<Vec<u8>>>, size: usize) -> Self {
        RawBuffer {
            storage: Some(storage),
            storage_size: size,
            offset: 0,
            length: size,
            refcount: Some(Arc::new(AtomicUsize::new(1))),
            owner: None,
        }
    }

    /// Exposes the shared storage handle, used by `BufferSet` to recycle
    /// the allocation once the buffer becomes unused.
    pub(crate) fn storage_arc(&self) -> Option<Arc<Mutex<Vec<u8>>>> {
        self.storage.clone()
    }

    /// Attaches an owner; the owner must outlive any outstanding buffer
    /// (enforced by convention: pools hold a strong `Arc` to themselves
    /// for as long as any buffer they issued may still be alive).
    pub fn with_owner(mut self, owner: Weak<dyn BufferOwner>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Current refcount; 0 for an empty buffer.
    pub fn refcount(&self) -> usize {
        self.refcount
            .as_ref()
            .map(|rc| rc.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// A buffer is "in use" iff more than one holder shares its refcount.
    pub fn is_unused(&self) -> bool {
        self.refcount() <= 1
    }

    /// Increments the shared refcount without creating a new view.
    pub fn reference(&self) {
        if let Some(rc) = &self.refcount {
            rc.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Decrements the shared refcount. Fires the owner's `buffer_unused`
    /// callback exactly when the count decays from 2 to 1.
    pub fn unref(&self) {
        let Some(rc) = &self.refcount else { return };
        let prev = rc.fetch_sub(1, Ordering::SeqCst);
        if prev == 2 {
            if let Some(owner) = self.owner.as_ref().and_then(Weak::upgrade) {
                owner.buffer_unused(self);
            }
        }
    }

    /// Runs `f` with read access to this view's bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match &self.storage {
            Some(storage) => {
                let guard = storage.lock().expect("buffer storage lock poisoned");
                f(&guard[self.offset..self.offset + self.length])
            }
            None => f(&[]),
        }
    }

    /// Runs `f` with mutable access to this view's bytes.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        match &self.storage {
            Some(storage) => {
                let mut guard = storage.lock().expect("buffer storage lock poisoned");
                f(&mut guard[self.offset..self.offset + self.length])
            }
            None => f(&mut []),
        }
    }

    /// A subview `[offset, offset+len)` sharing storage and refcount. Out of
    /// range returns an empty buffer rather than panicking.
    pub fn sub(&self, offset: usize, len: usize) -> RawBuffer {
        if self.storage.is_none() || offset + len > self.length {
            return RawBuffer::empty();
        }
        self.reference();
        RawBuffer {
            storage: self.storage.clone(),
            storage_size: self.storage_size,
            offset: self.offset + offset,
            length: len,
            refcount: self.refcount.clone(),
            owner: self.owner.clone(),
        }
    }

    pub fn head(&self, n: usize) -> RawBuffer {
        self.sub(0, n.min(self.length))
    }

    pub fn tail(&self, n: usize) -> RawBuffer {
        let n = n.min(self.length);
        self.sub(self.length - n, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_unref_round_trips() {
        // Invariant 1: ref() followed by unref() restores the prior refcount.
        let a = RawBuffer::new(3);
        let b = a.clone();
        let before = b.refcount();
        b.reference();
        b.unref();
        assert_eq!(b.refcount(), before);
    }

    #[test]
    fn sub_of_sub_equals_direct_sub() {
        // Invariant 2.
        let a = RawBuffer::new(16);
        let n = 10;
        let m = 4;
        let lhs = a.sub(0, n).sub(0, m);
        let rhs = a.sub(0, m);
        assert_eq!(lhs.len(), rhs.len());
        assert_eq!(lhs.offset(), rhs.offset());
    }

    #[test]
    fn out_of_range_sub_is_empty() {
        let a = RawBuffer::new(4);
        let s = a.sub(2, 10);
        assert!(s.is_empty());
    }

    #[test]
    fn owner_notified_on_decay_to_one() {
        struct Flag(std::sync::atomic::AtomicBool);
        impl BufferOwner for Flag {
            fn buffer_unused(&self, _buf: &RawBuffer) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let owner = Arc::new(Flag(std::sync::atomic::AtomicBool::new(false)));
        let owner_weak: Weak<dyn BufferOwner> = Arc::downgrade(&owner);
        let buf = RawBuffer::new(4).with_owner(owner_weak);
        let handle = buf.clone();
        assert!(!owner.0.load(Ordering::SeqCst));
        handle.unref();
        assert!(owner.0.load(Ordering::SeqCst));
    }

    #[test]
    fn empty_buffer_never_notifies() {
        let empty = RawBuffer::empty();
        assert_eq!(empty.refcount(), 0);
        empty.unref(); // must not panic
        assert!(empty.is_empty());
    }
}
