//! NonBlockingDevice: direct synchronous reads from a fast device.
//!
//! Suited to `/dev/urandom`-style devices that never block and deliver as
//! much as asked. There is no buffering: every call reads exactly the
//! requested length, looping over partial reads. Running out of input is a
//! fatal I/O error because this device promised full reads.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::collector::{Blocking, Buffering, Collector, CollectorInfo};
use crate::error::{Error, Result};

/// Unbuffered collector over any reader that never blocks.
pub struct NonBlockingDevice<R> {
    info: CollectorInfo,
    reader: Mutex<Option<R>>,
    closed: AtomicBool,
}

impl<R: Read + Send> NonBlockingDevice<R> {
    /// Wrap an already-open reader.
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        let name = name.into();
        Self {
            info: CollectorInfo {
                description: format!("direct reads from {name}"),
                name,
                buffering: Buffering::Unbuffered,
                blocking: Blocking::NeverBlocks,
                short_reads_expected: false,
            },
            reader: Mutex::new(Some(reader)),
            closed: AtomicBool::new(false),
        }
    }
}

impl<R: Read + Send> Collector for NonBlockingDevice<R> {
    fn info(&self) -> &CollectorInfo {
        &self.info
    }

    fn next_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(reader) = guard.as_mut() else {
            return Ok(0);
        };

        let wanted = buf.len();
        let mut off = 0;
        while off < wanted {
            match reader.read(&mut buf[off..]) {
                Ok(0) => {
                    return Err(Error::UnexpectedEof {
                        context: format!("reading {}", self.info.name),
                        wanted,
                        got: off,
                    });
                }
                Ok(n) => off += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(Error::io(format!("reading {}", self.info.name), e));
                }
            }
        }
        Ok(wanted)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the reader releases the device handle.
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<R> std::fmt::Display for NonBlockingDevice<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NonBlockingDevice({})", self.info.name)?;
        if self.closed.load(Ordering::SeqCst) {
            write!(f, " closed")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Reader that hands out at most `step` bytes per call.
    struct Dribble {
        step: usize,
        byte: u8,
    }

    impl Read for Dribble {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len());
            buf[..n].fill(self.byte);
            Ok(n)
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    #[test]
    fn test_loops_over_partial_reads() {
        let dev = NonBlockingDevice::new("dribble", Dribble { step: 3, byte: 0x5C });
        let mut buf = [0u8; 100];
        assert_eq!(dev.next_bytes(&mut buf).unwrap(), 100);
        assert!(buf.iter().all(|&b| b == 0x5C));
    }

    #[test]
    fn test_eof_is_fatal() {
        let dev = NonBlockingDevice::new("short", io::repeat(1).take(10));
        let mut buf = [0u8; 64];
        match dev.next_bytes(&mut buf) {
            Err(Error::UnexpectedEof { wanted, got, .. }) => {
                assert_eq!(wanted, 64);
                assert_eq!(got, 10);
            }
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }
    }

    #[test]
    fn test_read_error_carries_context() {
        let dev = NonBlockingDevice::new("broken", Broken);
        let mut buf = [0u8; 8];
        let err = dev.next_bytes(&mut buf).unwrap_err();
        assert!(err.to_string().contains("reading broken"), "{err}");
    }

    #[test]
    fn test_empty_request_reads_nothing() {
        let dev = NonBlockingDevice::new("broken", Broken);
        assert_eq!(dev.next_bytes(&mut []).unwrap(), 0);
    }

    #[test]
    fn test_close_is_idempotent_and_stops_reads() {
        let dev = NonBlockingDevice::new("repeat", io::repeat(9));
        dev.close();
        dev.close();
        assert!(dev.is_closed());
        let mut buf = [0u8; 8];
        assert_eq!(dev.next_bytes(&mut buf).unwrap(), 0);
        assert_eq!(dev.to_string(), "NonBlockingDevice(repeat) closed");
    }

    #[test]
    fn test_info_classes() {
        let dev = NonBlockingDevice::new("repeat", io::repeat(9));
        assert_eq!(dev.info().buffering, Buffering::Unbuffered);
        assert_eq!(dev.info().blocking, Blocking::NeverBlocks);
        assert!(!dev.info().short_reads_expected);
    }
}
