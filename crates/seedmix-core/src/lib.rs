//! # seedmix-core
//!
//! Cryptographically strong random bytes from several unreliable entropy
//! sources, without trusting any single one of them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use seedmix_core::Orchestrator;
//!
//! // Gathers /dev/urandom (or the OS CSPRNG) on first use.
//! let prng = Orchestrator::global().get()?;
//!
//! let mut key = [0u8; 32];
//! prng.next_bytes(&mut key)?;
//! let die = prng.random_int_range(1, 6)?;
//! # Ok::<(), seedmix_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Collectors → Mixer (SHA-512 whitening) → StatefulChaCha (ratcheting keystream)
//!
//! - [`EntropyPool`]: bounded ring buffer whose bytes are scrubbed as they
//!   are read. Backs the [`BlockingDevice`] collector.
//! - [`Collector`]: pull-based source trait. Short reads are normal.
//! - [`Mixer`]: pulls one block from every collector per output block and
//!   hashes them together. Keeps no entropy between draws.
//! - [`StatefulChaCha`]: expands a mixer seed into keystream and re-keys
//!   itself after every call.
//! - [`Orchestrator`]: lazily built shared generator that reseeds when new
//!   collectors arrive.

pub mod collector;
pub mod collectors;
pub mod config;
pub mod error;
pub mod expansion;
pub mod mixer;
pub mod orchestrator;
pub mod pool;
pub mod sources;
pub mod whitening;

pub use collector::{Blocking, Buffering, Collector, CollectorInfo, CollectorState};
pub use collectors::{
    BlockingDevice, DIGEST_LEN, HashAccumulator, NonBlockingDevice, PlatformRandom,
    RefillOptions,
};
pub use config::Config;
pub use error::{Error, Result};
pub use expansion::{BIG_SEED_LEN, ExpansionFunction, Profile, SEED_LEN, StatefulChaCha};
pub use mixer::{CollectorHealth, CollectorInfoSnapshot, HealthReport, Mixer};
pub use orchestrator::{Orchestrator, Prng};
pub use pool::{EntropyPool, SENTINEL};
pub use sources::{DEV_RANDOM, DEV_URANDOM, OsReader, default_collectors, open_device};
pub use whitening::{BLOCK_LEN, Sha512Whitener, Whitener, WhitenerKind, XorWhitener};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
