//! Statistical sanity checks for whitened entropy and keystream output.
//!
//! Two layers:
//! - [`PopulationStats`]: mean and deviation of set-bit counts across many
//!   equal-length samples, the quick check applied to mixer output.
//! - A small NIST SP 800-22 inspired battery ([`run_all_tests`]) over one
//!   byte slice. Each test returns a [`TestResult`] with a p-value and a
//!   pass/fail determination.
//!
//! None of this proves anything about unpredictability. It only catches
//! output that is obviously broken.

use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::erf::erfc;

/// Significance level used for pass/fail.
pub const ALPHA: f64 = 0.01;

// ═══════════════════════════════════════════════════════════════════════════════
// Population count
// ═══════════════════════════════════════════════════════════════════════════════

/// Number of set bits in `data`.
pub fn popcount(data: &[u8]) -> u64 {
    data.iter().map(|b| u64::from(b.count_ones())).sum()
}

/// Expected set bits for `len` uniformly random bytes.
pub fn expected_popcount(len: usize) -> f64 {
    len as f64 * 4.0
}

/// Set-bit statistics over a series of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationStats {
    pub trials: usize,
    /// Mean set bits per sample.
    pub mean: f64,
    /// Population standard deviation of set bits per sample.
    pub deviation: f64,
}

impl PopulationStats {
    pub fn from_counts(counts: &[u64]) -> Self {
        let trials = counts.len();
        if trials == 0 {
            return Self {
                trials,
                mean: 0.0,
                deviation: 0.0,
            };
        }
        let n = trials as f64;
        let mean = counts.iter().map(|&c| c as f64).sum::<f64>() / n;
        let variance = counts
            .iter()
            .map(|&c| {
                let d = c as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        Self {
            trials,
            mean,
            deviation: variance.sqrt(),
        }
    }

    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let counts: Vec<u64> = samples.into_iter().map(popcount).collect();
        Self::from_counts(&counts)
    }

    /// Mean within `mean_tolerance` of `expected` and deviation at most
    /// `max_deviation`.
    pub fn is_within(&self, expected: f64, mean_tolerance: f64, max_deviation: f64) -> bool {
        self.trials > 0
            && (self.mean - expected).abs() <= mean_tolerance
            && self.deviation <= max_deviation
    }
}

impl std::fmt::Display for PopulationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} trials, mean {:.2} bits, deviation {:.2}",
            self.trials, self.mean, self.deviation
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a single randomness test.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub p_value: Option<f64>,
    pub statistic: f64,
    pub details: String,
}

impl TestResult {
    fn from_p(name: &str, p: f64, statistic: f64, details: String) -> Self {
        Self {
            name: name.to_string(),
            passed: p >= ALPHA,
            p_value: Some(p),
            statistic,
            details,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Unpack a byte slice into individual bits (MSB first per byte).
fn to_bits(data: &[u8]) -> Vec<u8> {
    data.iter()
        .flat_map(|&byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
        .collect()
}

fn insufficient(name: &str, needed: usize, got: usize) -> TestResult {
    TestResult {
        name: name.to_string(),
        passed: false,
        p_value: None,
        statistic: 0.0,
        details: format!("Insufficient data: need {needed}, got {got}"),
    }
}

fn chi_square_sf(freedom: f64, chi2: f64) -> f64 {
    ChiSquared::new(freedom).map_or(0.0, |dist| dist.sf(chi2))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

/// Monobit frequency: proportion of 1s should be close to one half.
pub fn monobit_frequency(data: &[u8]) -> TestResult {
    let name = "Monobit Frequency";
    let n = data.len() * 8;
    if n < 100 {
        return insufficient(name, 100, n);
    }
    let ones = popcount(data) as i64;
    let s = 2 * ones - n as i64;
    let s_obs = (s as f64).abs() / (n as f64).sqrt();
    let p = erfc(s_obs / 2.0_f64.sqrt());
    TestResult::from_p(name, p, s_obs, format!("S={s}, n={n}"))
}

/// Block frequency: proportion of 1s within 128-bit blocks, chi-squared.
pub fn block_frequency(data: &[u8]) -> TestResult {
    let name = "Block Frequency";
    let block_bytes = 16;
    let num_blocks = data.len() / block_bytes;
    if num_blocks < 10 {
        return insufficient(name, block_bytes * 10, data.len());
    }
    let chi2 = 4.0
        * 128.0
        * data
            .chunks_exact(block_bytes)
            .map(|block| {
                let proportion = popcount(block) as f64 / 128.0;
                (proportion - 0.5) * (proportion - 0.5)
            })
            .sum::<f64>();
    let p = chi_square_sf(num_blocks as f64, chi2);
    TestResult::from_p(name, p, chi2, format!("blocks={num_blocks}, M=128"))
}

/// Byte frequency: chi-squared on the byte value distribution (256 bins).
pub fn byte_frequency(data: &[u8]) -> TestResult {
    let name = "Byte Frequency";
    let n = data.len();
    if n < 256 {
        return insufficient(name, 256, n);
    }
    let mut hist = [0u64; 256];
    for &b in data {
        hist[b as usize] += 1;
    }
    let expected = n as f64 / 256.0;
    let chi2: f64 = hist
        .iter()
        .map(|&c| {
            let diff = c as f64 - expected;
            diff * diff / expected
        })
        .sum();
    let p = chi_square_sf(255.0, chi2);
    TestResult::from_p(name, p, chi2, format!("n={n}, expected_per_bin={expected:.1}"))
}

/// Runs: number of uninterrupted runs of identical bits.
pub fn runs_test(data: &[u8]) -> TestResult {
    let name = "Runs Test";
    let bits = to_bits(data);
    let n = bits.len();
    if n < 100 {
        return insufficient(name, 100, n);
    }
    let prop = popcount(data) as f64 / n as f64;
    if (prop - 0.5).abs() >= 2.0 / (n as f64).sqrt() {
        return TestResult {
            name: name.to_string(),
            passed: false,
            p_value: Some(0.0),
            statistic: 0.0,
            details: format!("Pre-test failed: proportion={prop:.4}"),
        };
    }
    let runs = 1 + bits.windows(2).filter(|w| w[0] != w[1]).count();
    let expected = 2.0 * n as f64 * prop * (1.0 - prop) + 1.0;
    let std = 2.0 * (2.0 * n as f64).sqrt() * prop * (1.0 - prop);
    let z = (runs as f64 - expected).abs() / std;
    let p = erfc(z / 2.0_f64.sqrt());
    TestResult::from_p(name, p, z, format!("runs={runs}, expected={expected:.0}"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Test battery
// ═══════════════════════════════════════════════════════════════════════════════

/// Run every test on a byte slice.
pub fn run_all_tests(data: &[u8]) -> Vec<TestResult> {
    let tests: [fn(&[u8]) -> TestResult; 4] =
        [monobit_frequency, block_frequency, byte_frequency, runs_test];
    tests.iter().map(|test_fn| test_fn(data)).collect()
}

/// Percentage of tests that passed.
pub fn pass_rate(results: &[TestResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    100.0 * results.iter().filter(|r| r.passed).count() as f64 / results.len() as f64
}
