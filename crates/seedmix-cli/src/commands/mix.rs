use seedmix_core::{Orchestrator, Result};
use seedmix_stats::{PopulationStats, expected_popcount};

/// Returns whether the observed population counts stayed within tolerance.
pub fn run(orchestrator: &Orchestrator, trials: usize, len: usize) -> Result<bool> {
    orchestrator.gather_defaults();
    let mixer = orchestrator.mixer();
    println!("{mixer}, {trials} samples of {len} bytes\n");

    let mut counts = Vec::with_capacity(trials);
    let mut buf = vec![0u8; len];
    for _ in 0..trials {
        mixer.next_bytes(&mut buf)?;
        counts.push(seedmix_stats::popcount(&buf));
    }

    let stats = PopulationStats::from_counts(&counts);
    let expected = expected_popcount(len);
    // Binomial over 8 * len fair bits.
    let sigma = (len as f64 * 2.0).sqrt();
    let mean_tolerance = 5.0 * sigma / (trials.max(1) as f64).sqrt();
    let max_deviation = 1.5 * sigma;
    let passed = stats.is_within(expected, mean_tolerance, max_deviation);

    println!("  expected mean   {expected:.1} bits (\u{00b1}{mean_tolerance:.1})");
    println!("  max deviation   {max_deviation:.1}");
    println!("  observed        {stats}");
    println!("  verdict         {}", if passed { "PASS" } else { "FAIL" });
    Ok(passed)
}
