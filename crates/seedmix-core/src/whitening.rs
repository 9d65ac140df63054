//! Whitening primitives used by the [`Mixer`](crate::mixer::Mixer).
//!
//! A whitener absorbs collector output and produces one [`BLOCK_LEN`] block
//! per finalization, resetting itself for the next block.
//!
//! # Whiteners
//!
//! - **Sha512**: SHA-512 over every collector chunk of the block. This is the
//!   only whitener production draws use.
//! - **Xor**: XORs input into a rotating 64-byte block. It does no hashing at
//!   all, so mixer output can be checked against exact patterns.

use sha2::digest::Output;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

/// Whitening block length in bytes, the SHA-512 digest size.
pub const BLOCK_LEN: usize = 64;

/// Which whitener a mixing pass uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhitenerKind {
    #[default]
    Sha512,
    Xor,
}

impl WhitenerKind {
    pub(crate) fn build(self) -> Box<dyn Whitener> {
        match self {
            Self::Sha512 => Box::new(Sha512Whitener::new()),
            Self::Xor => Box::new(XorWhitener::new()),
        }
    }
}

impl std::fmt::Display for WhitenerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha512 => write!(f, "sha512"),
            Self::Xor => write!(f, "xor"),
        }
    }
}

/// Running accumulator that turns arbitrary input into fixed blocks.
pub trait Whitener: Send {
    /// Absorb `data`.
    fn update(&mut self, data: &[u8]);

    /// Write one whitened block into `out` and reset for the next block.
    fn finalize_reset_into(&mut self, out: &mut [u8; BLOCK_LEN]);
}

// ---------------------------------------------------------------------------
// SHA-512
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Sha512Whitener {
    hasher: Sha512,
}

impl Sha512Whitener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Whitener for Sha512Whitener {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize_reset_into(&mut self, out: &mut [u8; BLOCK_LEN]) {
        self.hasher
            .finalize_into_reset(Output::<Sha512>::from_mut_slice(&mut out[..]));
    }
}

impl Drop for Sha512Whitener {
    fn drop(&mut self) {
        scrub_sha512(&mut self.hasher);
    }
}

/// SHA-512 input block length.
const SHA512_BLOCK_LEN: usize = 128;

/// Overwrite the input still buffered inside `hasher` and reset it.
///
/// Finalizing or resetting a `Sha512` only rewinds its block buffer; the
/// absorbed bytes stay in memory. Padding always occupies the last slot of a
/// finalized block, so one byte short of a block of zeros covers everything
/// that could have been input, without completing a block.
pub(crate) fn scrub_sha512(hasher: &mut Sha512) {
    Digest::reset(hasher);
    hasher.update([0u8; SHA512_BLOCK_LEN - 1]);
    Digest::reset(hasher);
}

// ---------------------------------------------------------------------------
// XOR
// ---------------------------------------------------------------------------

/// Pattern-preserving whitener for deterministic checks.
pub struct XorWhitener {
    block: [u8; BLOCK_LEN],
    pos: usize,
}

impl XorWhitener {
    pub fn new() -> Self {
        Self {
            block: [0u8; BLOCK_LEN],
            pos: 0,
        }
    }
}

impl Default for XorWhitener {
    fn default() -> Self {
        Self::new()
    }
}

impl Whitener for XorWhitener {
    fn update(&mut self, data: &[u8]) {
        for &b in data {
            self.block[self.pos] ^= b;
            self.pos = (self.pos + 1) % BLOCK_LEN;
        }
    }

    fn finalize_reset_into(&mut self, out: &mut [u8; BLOCK_LEN]) {
        out.copy_from_slice(&self.block);
        self.block.zeroize();
        self.pos = 0;
    }
}

impl Drop for XorWhitener {
    fn drop(&mut self) {
        self.block.zeroize();
    }
}
