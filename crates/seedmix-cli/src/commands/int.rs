use seedmix_core::{Orchestrator, Result};

pub fn run(orchestrator: &Orchestrator, min: i32, max: i32, count: usize) -> Result<()> {
    let prng = orchestrator.get()?;
    for _ in 0..count {
        println!("{}", prng.random_int_range(min, max)?);
    }
    Ok(())
}
