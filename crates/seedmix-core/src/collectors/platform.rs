//! PlatformRandom: the platform CSPRNG as a collector.
//!
//! One generator is shared by the whole process. It is seeded from the OS on
//! first use, which may take a moment on a freshly booted machine, so the
//! initialisation is timed and logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

use log::info;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::collector::{Blocking, Buffering, Collector, CollectorInfo};
use crate::error::{Error, Result};

static PLATFORM_RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();

/// Process-wide generator, initialised at most once.
fn platform_rng() -> Result<&'static Mutex<StdRng>> {
    if let Some(rng) = PLATFORM_RNG.get() {
        return Ok(rng);
    }
    let t0 = Instant::now();
    info!("initialising platform CSPRNG, this could take some time");
    let rng = StdRng::try_from_os_rng().map_err(|e| Error::Platform(e.to_string()))?;
    // A racing thread may have won; its generator is kept and ours dropped.
    let shared = PLATFORM_RNG.get_or_init(|| Mutex::new(rng));
    info!("platform CSPRNG ready in {:?}", t0.elapsed());
    Ok(shared)
}

/// Unbuffered collector over the shared platform CSPRNG. Never short.
pub struct PlatformRandom {
    info: CollectorInfo,
    closed: AtomicBool,
}

impl PlatformRandom {
    /// Create a handle, initialising the shared generator if needed.
    pub fn new() -> Result<Self> {
        platform_rng()?;
        Ok(Self {
            info: CollectorInfo {
                name: "platform_random".to_string(),
                description: "process-wide OS-seeded CSPRNG".to_string(),
                buffering: Buffering::Unbuffered,
                blocking: Blocking::NeverBlocks,
                short_reads_expected: false,
            },
            closed: AtomicBool::new(false),
        })
    }
}

impl Collector for PlatformRandom {
    fn info(&self) -> &CollectorInfo {
        &self.info
    }

    fn next_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        if self.is_closed() {
            return Ok(0);
        }
        platform_rng()?
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(buf);
        Ok(buf.len())
    }

    // The generator is shared by every handle, so closing one handle only
    // stops that handle.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
