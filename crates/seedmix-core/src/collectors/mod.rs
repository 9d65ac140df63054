//! Collector variants.
//!
//! | Variant | Buffering | Blocking | Short reads |
//! |---|---|---|---|
//! | [`BlockingDevice`] | pool refilled by a worker thread | bounded waits | expected under load |
//! | [`NonBlockingDevice`] | none | never | fatal if they happen |
//! | [`PlatformRandom`] | none | never | never |
//! | [`HashAccumulator`] | SHA-512 state | never | exactly `min(64, len)` |
//!
//! The device variants are generic over any [`std::io::Read`], so they never
//! name a path themselves; [`crate::sources`] wires them to real devices.

pub mod blocking;
pub mod hasher;
pub mod nonblocking;
pub mod platform;

pub use blocking::{BlockingDevice, RefillOptions};
pub use hasher::{DIGEST_LEN, HashAccumulator};
pub use nonblocking::NonBlockingDevice;
pub use platform::PlatformRandom;
