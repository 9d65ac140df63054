use seedmix_core::{Orchestrator, Result};
use seedmix_stats::{TestResult, pass_rate, run_all_tests};

/// Returns whether every test passed.
pub fn run(orchestrator: &Orchestrator, n_bytes: usize, json: bool) -> Result<bool> {
    let prng = orchestrator.get()?;
    let mut data = vec![0u8; n_bytes];
    prng.next_bytes(&mut data)?;

    let results = run_all_tests(&data);
    let passed = results.iter().all(|r| r.passed);

    if json {
        let report = serde_json::json!({
            "bytes": n_bytes,
            "generation": prng.generation(),
            "profile": orchestrator.config().profile.to_string(),
            "pass_rate": pass_rate(&results),
            "tests": results.iter().map(result_json).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| report.to_string())
        );
    } else {
        println!("{n_bytes} bytes from generator #{}\n", prng.generation());
        for r in &results {
            let p = r
                .p_value
                .map(|p| format!("{p:.4}"))
                .unwrap_or_else(|| "-".into());
            let mark = if r.passed { "\u{2705}" } else { "\u{274c}" };
            println!("  {mark} {:<18} p={p:<8} {}", r.name, r.details);
        }
        println!("\n  pass rate: {:.0}%", pass_rate(&results));
    }
    Ok(passed)
}

fn result_json(r: &TestResult) -> serde_json::Value {
    serde_json::json!({
        "name": r.name,
        "passed": r.passed,
        "p_value": r.p_value,
        "statistic": r.statistic,
        "details": r.details,
    })
}
