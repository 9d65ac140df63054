//! Pull-based entropy collector trait and runtime state.
//!
//! Every entropy source implements the [`Collector`] trait, which provides
//! metadata via [`CollectorInfo`], a non-blocking-ish pull of raw bytes, and
//! an idempotent close.
//!
//! Returning fewer bytes than requested is part of the contract, not an
//! error. No collector may block indefinitely.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// Whether a collector keeps a stock of bytes between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Buffering {
    /// Backed by an internal pool or accumulator.
    Buffered,
    /// Reads straight from its source on every call.
    Unbuffered,
}

impl std::fmt::Display for Buffering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered => f.pad("buffered"),
            Self::Unbuffered => f.pad("unbuffered"),
        }
    }
}

/// How long a call to [`Collector::next_bytes`] may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blocking {
    /// Waits a small, bounded number of short sleeps at most.
    MayBlockBriefly,
    /// Returns without waiting.
    NeverBlocks,
}

impl std::fmt::Display for Blocking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MayBlockBriefly => f.pad("may_block_briefly"),
            Self::NeverBlocks => f.pad("never_blocks"),
        }
    }
}

/// Metadata about a collector.
#[derive(Debug, Clone)]
pub struct CollectorInfo {
    /// Short identifier (e.g. `"dev_urandom"`).
    pub name: String,
    /// One-line human-readable description.
    pub description: String,
    /// Buffering class.
    pub buffering: Buffering,
    /// Blocking class.
    pub blocking: Blocking,
    /// Whether a read is expected to return the full request under normal operation.
    pub short_reads_expected: bool,
}

/// Trait that every entropy collector must implement.
///
/// Collectors are shared between threads as `Arc<dyn Collector>` and identified
/// by pointer, so every method takes `&self`.
pub trait Collector: Send + Sync {
    /// Collector metadata.
    fn info(&self) -> &CollectorInfo;

    /// Fill up to `buf.len()` bytes starting at index 0 and return the count.
    ///
    /// A short count is normal. An error means the underlying source failed
    /// while the collector was still open.
    fn next_bytes(&self, buf: &mut [u8]) -> Result<usize>;

    /// Release the underlying resource and stop any worker. Safe to call more
    /// than once and concurrently with [`next_bytes`](Self::next_bytes).
    fn close(&self);

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;

    /// Convenience: name from info.
    fn name(&self) -> &str {
        &self.info().name
    }
}

/// Runtime state for a collector registered with a mixer.
pub struct CollectorState {
    pub collector: Arc<dyn Collector>,
    pub total_bytes: AtomicU64,
    pub short_reads: AtomicU64,
    pub failures: AtomicU64,
}

impl CollectorState {
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self {
            collector,
            total_bytes: AtomicU64::new(0),
            short_reads: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Pull one chunk into `buf`, keeping the counters current.
    pub fn pull(&self, buf: &mut [u8]) -> Result<usize> {
        match self.collector.next_bytes(buf) {
            Ok(n) => {
                self.total_bytes.fetch_add(n as u64, Ordering::Relaxed);
                if n < buf.len() {
                    self.short_reads.fetch_add(1, Ordering::Relaxed);
                }
                Ok(n)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Whether this state wraps exactly `other` (pointer identity).
    pub fn wraps(&self, other: &Arc<dyn Collector>) -> bool {
        Arc::ptr_eq(&self.collector, other)
    }
}
