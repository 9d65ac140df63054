use std::io::Write;

use seedmix_core::{Error, Orchestrator, Result};

const CHUNK: usize = 4096;

pub fn run(orchestrator: &Orchestrator, count: usize, format: &str) -> Result<()> {
    let prng = orchestrator.get()?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut buf = vec![0u8; CHUNK.min(count)];
    let mut remaining = count;

    while remaining > 0 {
        let want = remaining.min(CHUNK);
        prng.next_bytes(&mut buf[..want])?;
        let written = match format {
            "raw" => out.write_all(&buf[..want]),
            _ => out.write_all(super::hex(&buf[..want]).as_bytes()),
        };
        if written.is_err() {
            // Broken pipe
            return Ok(());
        }
        remaining -= want;
    }
    if format != "raw" {
        writeln!(out).map_err(|e| Error::io("writing to stdout", e))?;
    }
    out.flush().map_err(|e| Error::io("writing to stdout", e))
}
