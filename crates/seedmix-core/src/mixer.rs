//! Multi-collector mixer with SHA-512 whitening.
//!
//! Architecture:
//! 1. Collectors are registered once, unique by identity
//! 2. Each draw snapshots the registered set under the lock
//! 3. For every 64-byte output block, each collector is pulled exactly once
//!    into a shared scratch block and the chunk is fed to the whitener
//! 4. The finalized block is written to the output; a short final block is
//!    XOR-folded in from its offset, wrapping back to index 0
//! 5. The scratch block is scrubbed when the pass ends
//!
//! The mixer keeps no entropy between draws. Its only state is the collector
//! set and the counters used for health reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use zeroize::Zeroizing;

use crate::collector::{Blocking, Buffering, Collector, CollectorInfo, CollectorState};
use crate::error::{Error, Result};
use crate::whitening::{BLOCK_LEN, WhitenerKind};

/// Thread-safe set of collectors that produces whitened output on demand.
pub struct Mixer {
    collectors: Mutex<Vec<Arc<CollectorState>>>,
    output_bytes: AtomicU64,
}

impl Mixer {
    /// Create a mixer with no collectors.
    pub fn new() -> Self {
        Self {
            collectors: Mutex::new(Vec::new()),
            output_bytes: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<CollectorState>>> {
        self.collectors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a collector. Returns `false` if this exact collector is
    /// already registered.
    pub fn add_collector(&self, collector: Arc<dyn Collector>) -> bool {
        let mut set = self.lock();
        if set.iter().any(|s| s.wraps(&collector)) {
            debug!("mixer: {} already registered", collector.name());
            return false;
        }
        info!("mixer: registered {}", collector.name());
        set.push(Arc::new(CollectorState::new(collector)));
        true
    }

    /// Number of registered collectors.
    pub fn collector_count(&self) -> usize {
        self.lock().len()
    }

    fn snapshot(&self) -> Vec<Arc<CollectorState>> {
        self.lock().clone()
    }

    /// Fill `buf` completely with whitened bytes.
    ///
    /// Fails with [`Error::NoCollectors`] when nothing is registered or every
    /// registered collector has been closed, and with the collector's error
    /// if any collector fails mid-pass. Short reads from collectors are
    /// absorbed as-is.
    pub fn next_bytes(&self, buf: &mut [u8]) -> Result<()> {
        self.next_bytes_with(buf, WhitenerKind::Sha512)
    }

    /// Same as [`next_bytes`](Self::next_bytes) with an explicit whitener.
    ///
    /// [`WhitenerKind::Xor`] does no hashing; its output is only fit for
    /// checking the mixer's block layout.
    pub fn next_bytes_with(&self, buf: &mut [u8], kind: WhitenerKind) -> Result<()> {
        let collectors = self.snapshot();
        // Closed collectors deliver nothing, which would leave only the hash of
        // empty input.
        if collectors.iter().all(|s| s.collector.is_closed()) {
            return Err(Error::NoCollectors);
        }

        let mut whitener = kind.build();
        let mut scratch = Zeroizing::new([0u8; BLOCK_LEN]);

        let mut q = 0;
        while q < buf.len() {
            for state in &collectors {
                match state.pull(&mut scratch[..]) {
                    Ok(n) => whitener.update(&scratch[..n]),
                    Err(e) => {
                        // Flush the partial block so no hash state outlives the pass.
                        whitener.finalize_reset_into(&mut scratch);
                        return Err(e);
                    }
                }
            }

            match buf[q..].first_chunk_mut::<BLOCK_LEN>() {
                Some(block) => whitener.finalize_reset_into(block),
                None => {
                    whitener.finalize_reset_into(&mut scratch);
                    let mut p = q;
                    for &b in scratch.iter() {
                        if p >= buf.len() {
                            p = 0;
                        }
                        buf[p] ^= b;
                        p += 1;
                    }
                }
            }
            q += BLOCK_LEN;
        }

        self.output_bytes
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Close every registered collector.
    pub fn close(&self) {
        for state in self.snapshot() {
            state.collector.close();
        }
    }

    /// Health report as structured data.
    pub fn health_report(&self) -> HealthReport {
        let mut collectors = Vec::new();
        let mut healthy = 0;
        let mut raw_bytes = 0u64;

        for state in self.snapshot() {
            let closed = state.collector.is_closed();
            let failures = state.failures.load(Ordering::Relaxed);
            let ok = !closed && failures == 0;
            if ok {
                healthy += 1;
            }
            let bytes = state.total_bytes.load(Ordering::Relaxed);
            raw_bytes += bytes;
            collectors.push(CollectorHealth {
                name: state.collector.name().to_string(),
                healthy: ok,
                closed,
                bytes,
                short_reads: state.short_reads.load(Ordering::Relaxed),
                failures,
            });
        }

        HealthReport {
            healthy,
            total: collectors.len(),
            raw_bytes,
            output_bytes: self.output_bytes.load(Ordering::Relaxed),
            collectors,
        }
    }

    /// Metadata for each registered collector.
    pub fn collector_infos(&self) -> Vec<CollectorInfoSnapshot> {
        self.snapshot()
            .iter()
            .map(|state| {
                let info: &CollectorInfo = state.collector.info();
                CollectorInfoSnapshot {
                    name: info.name.clone(),
                    description: info.description.clone(),
                    buffering: info.buffering,
                    blocking: info.blocking,
                    short_reads_expected: info.short_reads_expected,
                }
            })
            .collect()
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mixer: {} collectors", self.collector_count())
    }
}

/// Overall health report for a mixer.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Collectors that are open and have never failed.
    pub healthy: usize,
    /// Total number of registered collectors.
    pub total: usize,
    /// Raw bytes pulled from all collectors.
    pub raw_bytes: u64,
    /// Whitened bytes handed out.
    pub output_bytes: u64,
    pub collectors: Vec<CollectorHealth>,
}

/// Health status of a single collector.
#[derive(Debug, Clone)]
pub struct CollectorHealth {
    pub name: String,
    pub healthy: bool,
    pub closed: bool,
    /// Total bytes delivered by this collector.
    pub bytes: u64,
    /// Pulls that returned less than a full block.
    pub short_reads: u64,
    pub failures: u64,
}

/// Snapshot of collector metadata for external consumption.
#[derive(Debug, Clone)]
pub struct CollectorInfoSnapshot {
    pub name: String,
    pub description: String,
    pub buffering: Buffering,
    pub blocking: Blocking,
    pub short_reads_expected: bool,
}
