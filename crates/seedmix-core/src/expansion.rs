//! Ratcheting ChaCha keystream generator.
//!
//! [`StatefulChaCha`] expands a seed into an arbitrarily long keystream using
//! the ChaCha block function (64-bit block counter in words 12 and 13, nonce
//! in words 14 and 15). After every call that produces output it runs one
//! more block and re-keys itself from that block, so the state left behind
//! cannot be run backwards to recover earlier output.
//!
//! # Seed layouts
//!
//! | Seed | Words 0..4 | Words 4..12 | Words 12..16 |
//! |---|---|---|---|
//! | 32 bytes | `"expand 32-byte k"` | seed | zero |
//! | 64 bytes | seed\[48..64\] | seed\[0..32\] | seed\[32..48\] |
//!
//! The 32-byte layout is standard ChaCha with counter and nonce zero. The
//! 64-byte layout replaces the constants with key material. It is what the
//! ratchet uses internally, but as a caller-facing seed format it is
//! experimental: ChaCha's published analysis assumes the constants.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};

/// Standard seed length.
pub const SEED_LEN: usize = 32;
/// Seed length that also fills the constant, counter and nonce words.
pub const BIG_SEED_LEN: usize = 64;
/// Bytes produced per block.
pub const BLOCK_LEN: usize = 64;

const SIGMA: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

/// Round count of the block function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// ChaCha8: four double rounds.
    #[default]
    Fast,
    /// ChaCha20: ten double rounds.
    Conservative,
}

impl Profile {
    pub fn double_rounds(self) -> usize {
        match self {
            Self::Fast => 4,
            Self::Conservative => 10,
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Conservative => write!(f, "conservative"),
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fast" | "chacha8" => Ok(Self::Fast),
            "conservative" | "chacha20" => Ok(Self::Conservative),
            other => Err(Error::Config(format!("unknown profile {other:?}"))),
        }
    }
}

/// A keyed generator that stretches a seed into keystream.
///
/// Instances are not synchronized; share one behind a lock.
pub trait ExpansionFunction: Send {
    /// Preferred seed length in bytes.
    fn seed_len(&self) -> usize;

    /// Replace the key with `seed`.
    fn init(&mut self, seed: &[u8]) -> Result<()>;

    /// Fill `buf` with keystream, then ratchet.
    fn next_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Ratchet once more and destroy the state. Idempotent.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Keyed,
    Exhausted,
    Closed,
}

/// ChaCha generator with a forward-secrecy ratchet.
pub struct StatefulChaCha {
    state: [u32; 16],
    profile: Profile,
    status: Status,
}

impl StatefulChaCha {
    /// Build a generator keyed with `seed` (32 or 64 bytes).
    pub fn new(profile: Profile, seed: &[u8]) -> Result<Self> {
        let mut chacha = Self {
            state: [0u32; 16],
            profile,
            status: Status::Closed,
        };
        chacha.init(seed)?;
        Ok(chacha)
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Current 64-bit block counter.
    fn counter(&self) -> u64 {
        u64::from(self.state[12]) | (u64::from(self.state[13]) << 32)
    }

    fn increment(&mut self) -> Result<()> {
        let next = self.counter().checked_add(1).ok_or(Error::KeyExhausted)?;
        self.state[12] = next as u32;
        self.state[13] = (next >> 32) as u32;
        Ok(())
    }

    fn load(&mut self, seed: &[u8]) {
        let word = |i: usize| u32::from_le_bytes([seed[i], seed[i + 1], seed[i + 2], seed[i + 3]]);
        for k in 0..8 {
            self.state[4 + k] = word(4 * k);
        }
        if seed.len() == BIG_SEED_LEN {
            for k in 0..4 {
                self.state[12 + k] = word(SEED_LEN + 4 * k);
                self.state[k] = word(SEED_LEN + 16 + 4 * k);
            }
        } else {
            self.state[..4].copy_from_slice(&SIGMA);
            self.state[12..].fill(0);
        }
    }

    /// One keystream block for the current state. Does not advance the counter.
    fn block(&self) -> Zeroizing<[u8; BLOCK_LEN]> {
        let mut x = Zeroizing::new(self.state);
        for _ in 0..self.profile.double_rounds() {
            quarter_round(&mut x, 0, 4, 8, 12);
            quarter_round(&mut x, 1, 5, 9, 13);
            quarter_round(&mut x, 2, 6, 10, 14);
            quarter_round(&mut x, 3, 7, 11, 15);
            quarter_round(&mut x, 0, 5, 10, 15);
            quarter_round(&mut x, 1, 6, 11, 12);
            quarter_round(&mut x, 2, 7, 8, 13);
            quarter_round(&mut x, 3, 4, 9, 14);
        }
        let mut out = Zeroizing::new([0u8; BLOCK_LEN]);
        for (i, bytes) in out.chunks_exact_mut(4).enumerate() {
            bytes.copy_from_slice(&x[i].wrapping_add(self.state[i]).to_le_bytes());
        }
        out
    }

    fn generate(&mut self, buf: &mut [u8]) -> Result<()> {
        for chunk in buf.chunks_mut(BLOCK_LEN) {
            let block = self.block();
            chunk.copy_from_slice(&block[..chunk.len()]);
            self.increment()?;
        }
        Ok(())
    }

    /// Re-key from the next block so the current state is unrecoverable.
    fn ratchet(&mut self) -> Result<()> {
        self.increment()?;
        let seed = self.block();
        self.load(&seed[..]);
        Ok(())
    }

    #[cfg(test)]
    fn state(&self) -> [u32; 16] {
        self.state
    }
}

fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[a] = x[a].wrapping_add(x[b]);
    x[d] = (x[d] ^ x[a]).rotate_left(16);
    x[c] = x[c].wrapping_add(x[d]);
    x[b] = (x[b] ^ x[c]).rotate_left(12);
    x[a] = x[a].wrapping_add(x[b]);
    x[d] = (x[d] ^ x[a]).rotate_left(8);
    x[c] = x[c].wrapping_add(x[d]);
    x[b] = (x[b] ^ x[c]).rotate_left(7);
}

impl ExpansionFunction for StatefulChaCha {
    fn seed_len(&self) -> usize {
        BIG_SEED_LEN
    }

    fn init(&mut self, seed: &[u8]) -> Result<()> {
        if seed.len() != SEED_LEN && seed.len() != BIG_SEED_LEN {
            return Err(Error::InvalidSeedLength(seed.len()));
        }
        self.load(seed);
        self.status = Status::Keyed;
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::KeyExhausted`] if the block counter would wrap. `buf` is
    /// cleared and the generator refuses all output until re-seeded.
    fn next_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.status {
            Status::Keyed => {}
            Status::Exhausted => return Err(Error::KeyExhausted),
            Status::Closed => return Err(Error::Closed),
        }
        if let Err(e) = self.generate(buf).and_then(|()| self.ratchet()) {
            buf.zeroize();
            self.state.zeroize();
            self.status = Status::Exhausted;
            return Err(e);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.status == Status::Keyed {
            let _ = self.ratchet();
        }
        self.state.zeroize();
        self.status = Status::Closed;
    }
}

impl Drop for StatefulChaCha {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Display for StatefulChaCha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self.status {
            Status::Keyed => "keyed",
            Status::Exhausted => "exhausted",
            Status::Closed => "closed",
        };
        write!(f, "StatefulChaCha({}) {status}", self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::{RngCore, SeedableRng};
    use rand_chacha::{ChaCha8Rng, ChaCha20Rng};

    fn seed(tag: u8) -> [u8; SEED_LEN] {
        std::array::from_fn(|i| (i as u8).wrapping_mul(31).wrapping_add(tag))
    }

    fn oracle(profile: Profile, seed: [u8; SEED_LEN], n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        match profile {
            Profile::Fast => ChaCha8Rng::from_seed(seed).fill_bytes(&mut out),
            Profile::Conservative => ChaCha20Rng::from_seed(seed).fill_bytes(&mut out),
        }
        out
    }

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Keystream
    // -----------------------------------------------------------------------

    #[test]
    fn test_matches_one_shot_chacha() {
        for profile in [Profile::Fast, Profile::Conservative] {
            for n in 0..1000 {
                let s = seed(n as u8);
                let mut g = StatefulChaCha::new(profile, &s).unwrap();
                let mut out = vec![0u8; n];
                g.next_bytes(&mut out).unwrap();
                assert_eq!(out, oracle(profile, s, n), "{profile} n={n}");
            }
        }
    }

    #[test]
    fn test_chacha20_zero_key_vector() {
        let mut g = StatefulChaCha::new(Profile::Conservative, &[0u8; SEED_LEN]).unwrap();
        let mut out = [0u8; 64];
        g.next_bytes(&mut out).unwrap();
        let expected = hex(
            "76b8e0ada0f13d90405d6ae55386bd28bdd219b8a08ded1aa836efcc8b770dc7\
             da41597c5157488d7724e03fb8d84a376a43b8f41518a11cc387b669b2ee6586",
        );
        assert_eq!(&out[..], &expected[..]);
    }

    #[test]
    fn test_big_seed_with_constants_matches_standard() {
        let s = seed(3);
        let mut big = [0u8; BIG_SEED_LEN];
        big[..SEED_LEN].copy_from_slice(&s);
        big[48..].copy_from_slice(b"expand 32-byte k");

        let mut g = StatefulChaCha::new(Profile::Fast, &big).unwrap();
        let mut out = vec![0u8; 300];
        g.next_bytes(&mut out).unwrap();
        assert_eq!(out, oracle(Profile::Fast, s, 300));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = StatefulChaCha::new(Profile::Fast, &seed(9)).unwrap();
        let mut b = StatefulChaCha::new(Profile::Fast, &seed(9)).unwrap();
        for len in [1usize, 64, 65, 200] {
            let mut x = vec![0u8; len];
            let mut y = vec![0u8; len];
            a.next_bytes(&mut x).unwrap();
            b.next_bytes(&mut y).unwrap();
            assert_eq!(x, y);
        }
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    #[test]
    fn test_seed_lengths() {
        for len in [0usize, 1, 31, 33, 48, 63, 65, 128] {
            assert!(matches!(
                StatefulChaCha::new(Profile::Fast, &vec![0u8; len]),
                Err(Error::InvalidSeedLength(l)) if l == len
            ));
        }
        assert!(StatefulChaCha::new(Profile::Fast, &[0u8; 32]).is_ok());
        assert!(StatefulChaCha::new(Profile::Fast, &[0u8; 64]).is_ok());
    }

    #[test]
    fn test_standard_layout() {
        let s = seed(1);
        let g = StatefulChaCha::new(Profile::Fast, &s).unwrap();
        let st = g.state();
        assert_eq!(&st[..4], &SIGMA);
        assert_eq!(st[4], u32::from_le_bytes([s[0], s[1], s[2], s[3]]));
        assert_eq!(st[11], u32::from_le_bytes([s[28], s[29], s[30], s[31]]));
        assert_eq!(&st[12..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_big_seed_layout() {
        let big: [u8; BIG_SEED_LEN] = std::array::from_fn(|i| i as u8);
        let g = StatefulChaCha::new(Profile::Fast, &big).unwrap();
        let st = g.state();
        let word = |i: usize| u32::from_le_bytes([big[i], big[i + 1], big[i + 2], big[i + 3]]);
        assert_eq!(st[0], word(48));
        assert_eq!(st[3], word(60));
        assert_eq!(st[4], word(0));
        assert_eq!(st[12], word(32));
        assert_eq!(st[15], word(44));
    }

    #[test]
    fn test_reinit_replaces_key() {
        let mut g = StatefulChaCha::new(Profile::Fast, &seed(1)).unwrap();
        let mut out = [0u8; 64];
        g.next_bytes(&mut out).unwrap();
        g.init(&seed(2)).unwrap();
        g.next_bytes(&mut out).unwrap();
        assert_eq!(&out[..], &oracle(Profile::Fast, seed(2), 64)[..]);
    }

    // -----------------------------------------------------------------------
    // Ratchet
    // -----------------------------------------------------------------------

    #[test]
    fn test_successive_outputs_differ() {
        for t in 0..200u32 {
            let s = seed(t as u8);
            let mut g = StatefulChaCha::new(Profile::Fast, &s).unwrap();
            let len = 1 + (t as usize % 100);
            let mut a = vec![0u8; len];
            let mut b = vec![0u8; len];
            g.next_bytes(&mut a).unwrap();
            g.next_bytes(&mut b).unwrap();
            assert_ne!(a, b, "trial {t}");
        }
    }

    #[test]
    fn test_second_call_is_not_continued_keystream() {
        let s = seed(5);
        let mut g = StatefulChaCha::new(Profile::Fast, &s).unwrap();
        let mut first = [0u8; 64];
        let mut second = [0u8; 64];
        g.next_bytes(&mut first).unwrap();
        g.next_bytes(&mut second).unwrap();
        let stream = oracle(Profile::Fast, s, 192);
        assert_eq!(&first[..], &stream[..64]);
        assert_ne!(&second[..], &stream[64..128]);
        assert_ne!(&second[..], &stream[128..]);
    }

    #[test]
    fn test_empty_request_still_ratchets() {
        let mut g = StatefulChaCha::new(Profile::Fast, &seed(4)).unwrap();
        let before = g.state();
        g.next_bytes(&mut []).unwrap();
        assert_ne!(g.state(), before);
    }

    #[test]
    fn test_ratchet_uses_big_seed_layout() {
        let mut g = StatefulChaCha::new(Profile::Fast, &seed(6)).unwrap();
        g.next_bytes(&mut []).unwrap();
        // Constants are replaced by key material after the first ratchet.
        assert_ne!(&g.state()[..4], &SIGMA);
    }

    // -----------------------------------------------------------------------
    // Exhaustion and close
    // -----------------------------------------------------------------------

    fn nearly_exhausted(remaining_blocks: u64) -> StatefulChaCha {
        let mut big = [0x17u8; BIG_SEED_LEN];
        let counter = u64::MAX - remaining_blocks;
        big[32..40].copy_from_slice(&counter.to_le_bytes());
        StatefulChaCha::new(Profile::Fast, &big).unwrap()
    }

    #[test]
    fn test_counter_overflow_is_fatal() {
        let mut g = nearly_exhausted(0);
        let mut buf = [0xAAu8; 64];
        assert!(matches!(g.next_bytes(&mut buf), Err(Error::KeyExhausted)));
        assert!(buf.iter().all(|&b| b == 0));

        // Sticky until re-seeded.
        assert!(matches!(g.next_bytes(&mut buf), Err(Error::KeyExhausted)));
        assert_eq!(g.to_string(), "StatefulChaCha(fast) exhausted");
        g.init(&seed(1)).unwrap();
        assert!(g.next_bytes(&mut buf).is_ok());
    }

    #[test]
    fn test_counter_carries_into_high_word() {
        let mut big = [0u8; BIG_SEED_LEN];
        big[32..36].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut g = StatefulChaCha::new(Profile::Fast, &big).unwrap();
        g.generate(&mut [0u8; 64]).unwrap();
        assert_eq!(g.state()[12], 0);
        assert_eq!(g.state()[13], 1);
    }

    #[test]
    fn test_last_blocks_before_overflow() {
        // Two blocks of output plus the ratchet increment need three steps.
        let mut g = nearly_exhausted(3);
        let mut buf = [0u8; 128];
        assert!(g.next_bytes(&mut buf).is_ok());

        let mut g = nearly_exhausted(2);
        assert!(matches!(g.next_bytes(&mut buf), Err(Error::KeyExhausted)));
    }

    #[test]
    fn test_close_destroys_state() {
        let mut g = StatefulChaCha::new(Profile::Conservative, &seed(8)).unwrap();
        g.close();
        assert_eq!(g.state(), [0u32; 16]);
        let mut buf = [0u8; 8];
        assert!(matches!(g.next_bytes(&mut buf), Err(Error::Closed)));
        g.close();
        assert_eq!(g.to_string(), "StatefulChaCha(conservative) closed");
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("fast".parse::<Profile>().unwrap(), Profile::Fast);
        assert_eq!("chacha20".parse::<Profile>().unwrap(), Profile::Conservative);
        assert!("chacha12".parse::<Profile>().is_err());
        assert_eq!(Profile::default().double_rounds(), 4);
        assert_eq!(Profile::Conservative.double_rounds(), 10);
    }
}
