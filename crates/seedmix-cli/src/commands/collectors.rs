use seedmix_core::{Orchestrator, Result};

pub fn run(orchestrator: &Orchestrator, probe: usize) -> Result<()> {
    orchestrator.gather_defaults();
    let mixer = orchestrator.mixer();

    let infos = mixer.collector_infos();
    println!("Found {} default collector(s):\n", infos.len());
    for info in &infos {
        println!(
            "  {:<20} {:<10} {:<17} {}",
            info.name, info.buffering, info.blocking, info.description
        );
    }
    if infos.is_empty() {
        println!("  (none found)");
        return Ok(());
    }

    if probe > 0 {
        let mut buf = vec![0u8; probe];
        if let Err(e) = mixer.next_bytes(&mut buf) {
            log::warn!("probe draw failed: {e}");
        }
    }

    let report = mixer.health_report();
    println!(
        "\nHealth: {}/{} healthy, {} raw bytes in, {} bytes out\n",
        report.healthy, report.total, report.raw_bytes, report.output_bytes
    );
    for c in &report.collectors {
        let mark = if c.healthy { "\u{2705}" } else { "\u{274c}" };
        println!(
            "  {mark} {:<20} bytes={:<8} short_reads={:<4} failures={}{}",
            c.name,
            c.bytes,
            c.short_reads,
            c.failures,
            if c.closed { " (closed)" } else { "" }
        );
    }
    Ok(())
}
