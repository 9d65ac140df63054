//! Shared generator built lazily from a mixer draw.
//!
//! An [`Orchestrator`] owns a [`Mixer`] and one expansion function seeded
//! from it. The first [`get`](Orchestrator::get) gathers the default
//! collectors and builds the generator. Later calls rebuild it whenever more
//! collectors have been registered since the last build, closing the old
//! generator first.
//!
//! [`Orchestrator::global`] is the process-wide instance; independent
//! instances can be made with [`Orchestrator::new`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, OnceLock, PoisonError};

use log::info;
use zeroize::Zeroizing;

use crate::collector::Collector;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::expansion::{BIG_SEED_LEN, ExpansionFunction, StatefulChaCha};
use crate::mixer::Mixer;
use crate::sources::default_collectors;

static GLOBAL: OnceLock<Orchestrator> = OnceLock::new();

/// Owner of the mixer and the shared expansion function.
pub struct Orchestrator {
    config: Config,
    mixer: Mixer,
    defaults: Once,
    slot: Mutex<Option<Box<dyn ExpansionFunction>>>,
    /// Collector count the current generator was seeded with.
    built_for: AtomicUsize,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            mixer: Mixer::new(),
            defaults: Once::new(),
            slot: Mutex::new(None),
            built_for: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// The process-wide instance, created with the default configuration.
    pub fn global() -> &'static Orchestrator {
        GLOBAL.get_or_init(|| Orchestrator::new(Config::default()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Register another collector. The next [`get`](Self::get) reseeds.
    pub fn add_collector(&self, collector: Arc<dyn Collector>) -> bool {
        self.mixer.add_collector(collector)
    }

    /// Number of generators built so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn ExpansionFunction>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the configured default collectors. Runs at most once; also
    /// called by the first [`get`](Self::get).
    pub fn gather_defaults(&self) {
        self.defaults.call_once(|| {
            if !self.config.gather_defaults {
                return;
            }
            for c in default_collectors(&self.config) {
                self.mixer.add_collector(c);
            }
        });
    }

    fn is_stale(&self) -> bool {
        self.generation() == 0
            || self.mixer.collector_count() > self.built_for.load(Ordering::SeqCst)
    }

    /// Handle to the shared generator, building or rebuilding it first if
    /// needed.
    pub fn get(&self) -> Result<Prng<'_>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        self.gather_defaults();
        if self.is_stale() {
            let mut slot = self.lock();
            self.refresh(&mut slot)?;
        }
        Ok(Prng { orchestrator: self })
    }

    /// Second half of the double-checked build, run with the slot locked.
    fn refresh(&self, slot: &mut Option<Box<dyn ExpansionFunction>>) -> Result<()> {
        // close() may have landed after the unlocked check in get().
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        if self.is_stale() {
            self.rebuild(slot)?;
        }
        Ok(())
    }

    // A generator that reports KeyExhausted is not rebuilt here: the counter
    // is 64-bit and starts from a ratchet block, so it stays exhausted until
    // a new collector arrives or the orchestrator is replaced.
    fn rebuild(&self, slot: &mut Option<Box<dyn ExpansionFunction>>) -> Result<()> {
        let count = self.mixer.collector_count();
        let mut seed = Zeroizing::new([0u8; BIG_SEED_LEN]);
        self.mixer.next_bytes(&mut seed[..])?;

        let mut generator: Box<dyn ExpansionFunction> =
            Box::new(StatefulChaCha::new(self.config.profile, &seed[..])?);
        // Overwrite the seed with keystream so it never exists in the clear again.
        generator.next_bytes(&mut seed[..])?;

        if let Some(mut old) = slot.replace(generator) {
            old.close();
        }
        self.built_for.store(count, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "built shared generator #{generation} ({}, {count} collectors)",
            self.config.profile
        );
        Ok(())
    }

    /// Close the generator and every collector. Later calls to
    /// [`get`](Self::get) fail with [`Error::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut generator) = self.lock().take() {
            generator.close();
        }
        self.mixer.close();
        info!("orchestrator closed");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to an orchestrator's shared generator.
///
/// Every draw is serialized through the orchestrator's lock.
#[derive(Clone, Copy)]
pub struct Prng<'a> {
    orchestrator: &'a Orchestrator,
}

impl Prng<'_> {
    /// Fill `buf` with keystream.
    pub fn next_bytes(&self, buf: &mut [u8]) -> Result<()> {
        match self.orchestrator.lock().as_mut() {
            Some(generator) => generator.next_bytes(buf),
            None => Err(Error::Closed),
        }
    }

    /// Four bytes assembled big-endian.
    pub fn random_int(&self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.next_bytes(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    /// Eight bytes assembled big-endian.
    pub fn random_long(&self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.next_bytes(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    /// Uniform-ish integer in `min..=max`. Reversed bounds are swapped.
    ///
    /// A 64-bit draw is reduced modulo the width of the range. When the width
    /// does not divide 2^64 the low results are very slightly favoured; the
    /// bias is below 2^-32 for every `i32` range.
    pub fn random_int_range(&self, min: i32, max: i32) -> Result<i32> {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        if lo == hi {
            return Ok(lo);
        }
        let width = (i64::from(hi) - i64::from(lo) + 1) as u64;
        let mut buf = [0u8; 8];
        self.next_bytes(&mut buf)?;
        let offset = u64::from_be_bytes(buf) % width;
        // lo + offset <= hi, so the narrowing cast is exact.
        Ok((i64::from(lo) + offset as i64) as i32)
    }

    /// Generation of the generator this handle draws from.
    pub fn generation(&self) -> u64 {
        self.orchestrator.generation()
    }
}
