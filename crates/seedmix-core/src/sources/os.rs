//! OS CSPRNG exposed as a reader.

use std::io::{self, Read};

/// [`Read`] adapter over `getrandom`. Every read fills the whole buffer.
///
/// Stands in for `/dev/urandom` on platforms that have no such device.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsReader;

impl Read for OsReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        getrandom::fill(buf).map_err(|e| io::Error::other(e.to_string()))?;
        Ok(buf.len())
    }
}
