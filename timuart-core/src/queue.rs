//! Single-producer single-consumer byte ring
//!
//! The queue is shared by reference between exactly two execution
//! contexts. One of them only ever calls the producer operations
//! ([`ByteQueue::push`]), the other only the consumer operations
//! ([`ByteQueue::pop`], [`ByteQueue::peek`], [`ByteQueue::clear`]). Each
//! index therefore has a single writer and no lock is needed.
//!
//! One slot is always left empty so that `head == tail` means empty and
//! `head + 1 == tail` means full.

use portable_atomic::{AtomicU8, AtomicUsize, Ordering};

/// Fixed-capacity lock-free byte ring with `N - 1` usable slots
pub struct ByteQueue<const N: usize> {
    buf: [AtomicU8; N],
    /// Last slot written by the producer
    head: AtomicUsize,
    /// Last slot read by the consumer
    tail: AtomicUsize,
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ByteQueue<N> {
    const CAPACITY_OK: () = assert!(N >= 2, "ByteQueue needs at least two slots");

    /// Create an empty queue
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_OK;
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: AtomicU8 = AtomicU8::new(0);
        Self {
            buf: [EMPTY; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Number of bytes the queue can hold
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Append a byte (producer side)
    ///
    /// Returns `false` and leaves the queue unchanged when it is full.
    pub fn push(&self, byte: u8) -> bool {
        let head = advance::<N>(self.head.load(Ordering::Relaxed));
        if head == self.tail.load(Ordering::Acquire) {
            return false;
        }
        self.buf[head].store(byte, Ordering::Relaxed);
        self.head.store(head, Ordering::Release);
        true
    }

    /// Remove the oldest byte (consumer side)
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if self.head.load(Ordering::Acquire) == tail {
            return None;
        }
        let tail = advance::<N>(tail);
        let byte = self.buf[tail].load(Ordering::Relaxed);
        self.tail.store(tail, Ordering::Release);
        Some(byte)
    }

    /// Look at the oldest byte without removing it (consumer side)
    pub fn peek(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if self.head.load(Ordering::Acquire) == tail {
            return None;
        }
        Some(self.buf[advance::<N>(tail)].load(Ordering::Relaxed))
    }

    /// Number of queued bytes
    ///
    /// May be called from either side. A concurrent push or pop can make
    /// the result stale by one, but it is always in `0..N`.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if head >= tail {
            head - tail
        } else {
            N + head - tail
        }
    }

    /// Check if the queue holds no bytes
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Check if a push would fail
    pub fn is_full(&self) -> bool {
        advance::<N>(self.head.load(Ordering::Acquire)) == self.tail.load(Ordering::Acquire)
    }

    /// Discard everything queued (consumer side)
    pub fn clear(&self) {
        self.tail
            .store(self.head.load(Ordering::Acquire), Ordering::Release);
    }

    /// Rewind both indices to zero
    ///
    /// Neither side may be running concurrently.
    pub fn reset(&self) {
        self.head.store(0, Ordering::Relaxed);
        self.tail.store(0, Ordering::Release);
    }
}

const fn advance<const N: usize>(index: usize) -> usize {
    if index + 1 >= N {
        0
    } else {
        index + 1
    }
}
