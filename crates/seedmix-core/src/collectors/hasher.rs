//! HashAccumulator: absorbs variable-quality input, extracts SHA-512 digests.
//!
//! Useful when incoming bytes carry an unknown amount of entropy and arrive at
//! an unpredictable rate. Everything handed to [`HashAccumulator::collect`]
//! is absorbed into a running SHA-512 state. Each extraction finalizes that
//! state, feeds the digest straight back in so later outputs depend on every
//! earlier input, and returns the digest folded to the requested length.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::digest::Output;
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

use crate::collector::{Blocking, Buffering, Collector, CollectorInfo};
use crate::error::Result;
use crate::whitening::scrub_sha512;

/// Size of one extraction in bytes.
pub const DIGEST_LEN: usize = 64;

struct Accumulator {
    hasher: Sha512,
    pending: u64,
}

/// Buffered, never-blocking collector over a SHA-512 accumulator.
pub struct HashAccumulator {
    info: CollectorInfo,
    state: Mutex<Accumulator>,
    closed: AtomicBool,
}

impl HashAccumulator {
    pub fn new() -> Self {
        Self::with_name("hash_accumulator")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            info: CollectorInfo {
                name: name.into(),
                description: "SHA-512 accumulator over collected input".to_string(),
                buffering: Buffering::Buffered,
                blocking: Blocking::NeverBlocks,
                short_reads_expected: true,
            },
            state: Mutex::new(Accumulator {
                hasher: Sha512::new(),
                pending: 0,
            }),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Accumulator> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Absorb `data`. Ignored once closed.
    pub fn collect(&self, data: &[u8]) {
        if self.is_closed() {
            return;
        }
        let mut acc = self.lock();
        acc.hasher.update(data);
        acc.pending += data.len() as u64;
    }

    /// Bytes absorbed since the last extraction.
    pub fn pending(&self) -> u64 {
        self.lock().pending
    }
}

impl Default for HashAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for HashAccumulator {
    fn info(&self) -> &CollectorInfo {
        &self.info
    }

    /// Returns exactly `min(64, buf.len())` bytes. A buffer shorter than one
    /// digest is cleared and receives the digest XOR-folded over its length.
    fn next_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.is_closed() {
            return Ok(0);
        }
        let mut acc = self.lock();
        let mut digest = Zeroizing::new([0u8; DIGEST_LEN]);
        acc.hasher
            .finalize_into_reset(Output::<Sha512>::from_mut_slice(&mut digest[..]));
        acc.hasher.update(&digest[..]);
        acc.pending = 0;

        let len = buf.len();
        if len >= DIGEST_LEN {
            buf[..DIGEST_LEN].copy_from_slice(&digest[..]);
            return Ok(DIGEST_LEN);
        }
        buf.fill(0);
        for (i, d) in digest.iter().enumerate() {
            buf[i % len] ^= d;
        }
        Ok(len)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut acc = self.lock();
        scrub_sha512(&mut acc.hasher);
        acc.pending = 0;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for HashAccumulator {
    fn drop(&mut self) {
        let acc = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        scrub_sha512(&mut acc.hasher);
    }
}

impl std::fmt::Display for HashAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_closed() {
            write!(f, "HashAccumulator closed")
        } else {
            write!(f, "HashAccumulator {} pending", self.pending())
        }
    }
}
