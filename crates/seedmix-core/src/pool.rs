//! Bounded FIFO of not-yet-consumed entropy bytes.
//!
//! The pool is a fixed ring allocated once at construction, so collected
//! bytes never spread into temporary copies. Every byte handed out is
//! overwritten with [`SENTINEL`] before the read returns, and every slot is
//! checked to hold the sentinel before it is written again. A slot that is
//! not scrubbed when the writer reaches it means the cursors are corrupt,
//! and the pool panics rather than overwrite unread entropy.
//!
//! One lock guards each instance. The usual arrangement is one refill thread
//! pushing and any number of caller threads pulling, but every combination of
//! threads is safe.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use zeroize::Zeroize;

/// Value every consumed slot is scrubbed to.
pub const SENTINEL: u8 = 0x00;

/// Thread-safe ring buffer with destructive reads.
pub struct EntropyPool {
    ring: Mutex<Ring>,
}

struct Ring {
    slots: Box<[u8]>,
    read: usize,
    write: usize,
    full: bool,
    empty: bool,
    available: usize,
    closed: bool,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Recompute `available` from the cursors. The flags disambiguate
    /// `read == write`, which is both the full and the empty position.
    fn recount(&mut self) {
        self.available = if self.full {
            self.capacity()
        } else if self.empty {
            0
        } else if self.read < self.write {
            self.write - self.read
        } else {
            self.capacity() - (self.read - self.write)
        };
    }
}

impl EntropyPool {
    /// Create an empty pool holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                slots: vec![SENTINEL; capacity].into_boxed_slice(),
                read: 0,
                write: 0,
                full: false,
                empty: true,
                available: 0,
                closed: false,
            }),
        }
    }

    // Every mutation keeps the ring consistent byte by byte, so a guard
    // recovered from a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Number of unread bytes, always within `0..=capacity`.
    pub fn available(&self) -> usize {
        self.lock().available
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Push all of `src`. See [`push`](Self::push).
    pub fn push_all(&self, src: &[u8]) -> usize {
        self.push(src, 0, src.len())
    }

    /// Append `src[offset..offset + count]` to the pool.
    ///
    /// If the bytes do not fit, `count` is clamped to the free space and the
    /// excess is dropped. Returns the number of bytes stored, which is zero
    /// once the pool is closed.
    ///
    /// # Panics
    ///
    /// Panics if `offset` or `count` reach outside `src`, or if a slot about to
    /// be written does not hold the sentinel.
    pub fn push(&self, src: &[u8], offset: usize, count: usize) -> usize {
        assert!(
            offset <= src.len() && count <= src.len() - offset,
            "push bounds out of range: len {} offset {} count {}",
            src.len(),
            offset,
            count
        );

        let mut ring = self.lock();
        if ring.closed {
            return 0;
        }
        let count = count.min(ring.capacity() - ring.available);

        for (i, &byte) in src[offset..offset + count].iter().enumerate() {
            let w = ring.write;
            assert!(
                ring.slots[w] == SENTINEL,
                "pool slot {w} was not scrubbed before write {i} of {count} \
                 (read {}, available {})",
                ring.read,
                ring.available
            );
            ring.slots[w] = byte;
            ring.write = if w + 1 >= ring.capacity() { 0 } else { w + 1 };
            if ring.write == ring.read {
                ring.full = true;
            }
            ring.empty = false;
            ring.recount();
        }
        count
    }

    /// Move up to `buf.len()` bytes out of the pool into `buf`, starting at
    /// index 0. Bytes of `buf` past the returned count are left untouched.
    /// Returns 0 immediately when the pool is empty; never blocks.
    pub fn next_bytes(&self, buf: &mut [u8]) -> usize {
        let mut ring = self.lock();
        if ring.empty {
            return 0;
        }
        let len = buf.len().min(ring.available);

        for out in &mut buf[..len] {
            let r = ring.read;
            *out = ring.slots[r];
            ring.slots[r].zeroize();
            ring.read = if r + 1 >= ring.capacity() { 0 } else { r + 1 };
            ring.full = false;
            if ring.read == ring.write {
                ring.empty = true;
            }
            ring.recount();
        }
        len
    }

    /// Scrub every slot and refuse further pushes. Idempotent.
    pub fn close(&self) {
        let mut ring = self.lock();
        ring.slots.zeroize();
        ring.read = 0;
        ring.write = 0;
        ring.full = false;
        ring.empty = true;
        ring.available = 0;
        ring.closed = true;
    }

    #[cfg(test)]
    fn raw_slots(&self) -> Vec<u8> {
        self.lock().slots.to_vec()
    }

    #[cfg(test)]
    fn corrupt_next_write_slot(&self, value: u8) {
        let mut ring = self.lock();
        let w = ring.write;
        ring.slots[w] = value;
    }
}

impl Drop for EntropyPool {
    fn drop(&mut self) {
        let ring = self.ring.get_mut().unwrap_or_else(PoisonError::into_inner);
        ring.slots.zeroize();
    }
}

// No Debug or equality: either would leak pool contents.
impl fmt::Display for EntropyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.lock();
        write!(f, "EntropyPool {}/{}", ring.available, ring.capacity())?;
        if ring.closed {
            write!(f, " closed")?;
        }
        Ok(())
    }
}
