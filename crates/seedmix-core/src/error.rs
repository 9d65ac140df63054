//! Error type shared by every seedmix component.
//!
//! Short reads are not errors: a collector that delivers fewer bytes than
//! requested reports the count through `Ok(n)`. Broken invariants (a pool
//! slot that was not scrubbed, out-of-range push bounds) are programming
//! errors and panic instead of surfacing here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by pools, collectors, the mixer and the expansion function.
#[derive(Debug, Error)]
pub enum Error {
    /// An entropy device could not be opened while constructing a collector.
    #[error("entropy device {} is unavailable: {source}", path.display())]
    ResourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A read failed after the collector was successfully opened.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A collector that promises full reads ran out of input.
    #[error("{context}: wanted {wanted} bytes, device delivered {got}")]
    UnexpectedEof {
        context: String,
        wanted: usize,
        got: usize,
    },

    /// A draw was attempted with nothing registered to draw from.
    #[error("no entropy collectors are registered")]
    NoCollectors,

    /// Expansion seeds must be exactly 32 or 64 bytes.
    #[error("seed must be 32 or 64 bytes, not {0}")]
    InvalidSeedLength(usize),

    /// The 64-bit block counter would wrap. The generator refuses further output.
    #[error("block counter exhausted, the generator needs a new key")]
    KeyExhausted,

    /// The generator was closed and has no key left.
    #[error("generator has been closed")]
    Closed,

    /// The platform CSPRNG could not be initialised.
    #[error("platform CSPRNG unavailable: {0}")]
    Platform(String),

    /// A configuration value was rejected or the config file was unreadable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an I/O error with a short description of what was being attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
