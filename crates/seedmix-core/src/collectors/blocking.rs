//! BlockingDevice: a pool-backed collector for slow devices.
//!
//! A dedicated worker thread keeps an [`EntropyPool`] topped up from the
//! device. Callers never touch the device: they wait a bounded number of
//! short sleeps for the pool to hold what they asked for, then take whatever
//! is there.
//!
//! The worker is woken through a one-slot channel. It re-checks the closed
//! flag after every device read and after every wake, so [`close`] never has
//! to interrupt a read in progress; a worker stuck in a read simply exits
//! once the read returns.
//!
//! [`close`]: Collector::close

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::collector::{Blocking, Buffering, Collector, CollectorInfo};
use crate::error::{Error, Result};
use crate::pool::EntropyPool;

/// Default pool size in bytes.
pub const DEFAULT_POOL_CAPACITY: usize = 640;
/// Default number of waits before a read settles for what is available.
pub const DEFAULT_EXHAUST_ATTEMPTS: u32 = 13;
/// Default length of one wait.
pub const DEFAULT_EXHAUST_SLEEP: Duration = Duration::from_millis(1);

/// Pool sizing and wait policy for a [`BlockingDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillOptions {
    pub capacity: usize,
    pub exhaust_attempts: u32,
    pub exhaust_sleep: Duration,
}

impl Default for RefillOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            exhaust_attempts: DEFAULT_EXHAUST_ATTEMPTS,
            exhaust_sleep: DEFAULT_EXHAUST_SLEEP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    TopUp,
    Shutdown,
}

/// State shared between the collector and its worker.
struct Shared {
    pool: EntropyPool,
    closed: AtomicBool,
    /// Set once the worker has exited because of a device failure.
    stopped: AtomicBool,
    /// Failure waiting to be reported by the next read.
    failure: Mutex<Option<Error>>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<Error> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn park(&self, name: &str, err: Error) {
        if self.is_closed() {
            debug!("{name}: ignoring failure after close: {err}");
            return;
        }
        warn!("{name}: refill worker stopped: {err}");
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Buffered collector over a reader that may block for long periods.
pub struct BlockingDevice {
    info: CollectorInfo,
    options: RefillOptions,
    shared: Arc<Shared>,
    signal: Mutex<Option<SyncSender<Signal>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BlockingDevice {
    /// Start a refill worker over `reader` and return the collector.
    ///
    /// The reader moves to the worker thread and is dropped when the worker
    /// exits.
    pub fn spawn<R>(name: impl Into<String>, reader: R, options: RefillOptions) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(Shared {
            pool: EntropyPool::new(options.capacity),
            closed: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            failure: Mutex::new(None),
        });
        let (tx, rx) = mpsc::sync_channel(1);

        let worker = {
            let shared = Arc::clone(&shared);
            let worker_name = name.clone();
            thread::Builder::new()
                .name(format!("refill-{name}"))
                .spawn(move || refill(&worker_name, reader, &shared, &rx))
                .map_err(|e| Error::io(format!("spawning refill worker for {name}"), e))?
        };

        Ok(Self {
            info: CollectorInfo {
                description: format!("pool-backed reads from {name}"),
                name,
                buffering: Buffering::Buffered,
                blocking: Blocking::MayBlockBriefly,
                short_reads_expected: true,
            },
            options,
            shared,
            signal: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Bytes currently buffered.
    pub fn available(&self) -> usize {
        self.shared.pool.available()
    }

    pub fn options(&self) -> RefillOptions {
        self.options
    }

    fn nudge(&self) {
        if let Some(tx) = self
            .signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            // A full slot already holds a wake-up.
            let _ = tx.try_send(Signal::TopUp);
        }
    }
}

fn refill<R: Read>(name: &str, mut reader: R, shared: &Shared, rx: &Receiver<Signal>) {
    debug!("{name}: refill worker started");
    let mut chunk = Zeroizing::new(vec![0u8; shared.pool.capacity()]);

    while !shared.is_closed() {
        let free = shared.pool.capacity() - shared.pool.available();
        if free == 0 {
            match rx.recv() {
                Ok(Signal::TopUp) => continue,
                Ok(Signal::Shutdown) | Err(_) => break,
            }
        }

        match reader.read(&mut chunk[..free]) {
            Ok(0) => {
                shared.park(
                    name,
                    Error::UnexpectedEof {
                        context: format!("refilling {name}"),
                        wanted: free,
                        got: 0,
                    },
                );
                break;
            }
            Ok(n) => {
                shared.pool.push(&chunk, 0, n);
                chunk[..n].zeroize();
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                shared.park(name, Error::io(format!("refilling {name}"), e));
                break;
            }
        }
    }
    debug!("{name}: refill worker exiting");
}

impl Collector for BlockingDevice {
    fn info(&self) -> &CollectorInfo {
        &self.info
    }

    fn next_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        if self.shared.is_closed() {
            return Ok(0);
        }
        if let Some(err) = self.shared.take_failure() {
            return Err(err);
        }

        let mut attempts = 0;
        while self.shared.pool.available() < buf.len()
            && attempts < self.options.exhaust_attempts
            && !self.shared.stopped.load(Ordering::SeqCst)
            && !self.shared.is_closed()
        {
            self.nudge();
            thread::sleep(self.options.exhaust_sleep);
            attempts += 1;
        }

        let n = self.shared.pool.next_bytes(buf);
        self.nudge();

        if n == 0
            && !buf.is_empty()
            && self.shared.stopped.load(Ordering::SeqCst)
            && !self.shared.is_closed()
        {
            // The failure may have been parked while this call was waiting.
            return Err(self.shared.take_failure().unwrap_or_else(|| {
                Error::io(
                    format!("reading {}", self.info.name),
                    std::io::Error::other("refill worker stopped after an earlier failure"),
                )
            }));
        }
        Ok(n)
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self
            .signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.try_send(Signal::Shutdown);
        }
        self.shared.pool.close();

        // A worker blocked in a device read is left to finish on its own.
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        match worker.take() {
            Some(handle) if handle.is_finished() => {
                let _ = handle.join();
                debug!("{}: closed", self.info.name);
            }
            Some(_) => debug!(
                "{}: closed, refill worker detached and holds the device until its read returns",
                self.info.name
            ),
            None => debug!("{}: closed", self.info.name),
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl Drop for BlockingDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Display for BlockingDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockingDevice({}) {}", self.info.name, self.shared.pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Instant;

    fn patient() -> RefillOptions {
        RefillOptions {
            capacity: 256,
            exhaust_attempts: 2_000,
            exhaust_sleep: Duration::from_millis(1),
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    /// Poll until the collector reports an error, or give up after a while.
    fn wait_for_error(dev: &BlockingDevice) -> Error {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut buf = [0u8; 32];
        loop {
            match dev.next_bytes(&mut buf) {
                Err(e) => return e,
                Ok(_) if Instant::now() > deadline => panic!("no error surfaced"),
                Ok(_) => thread::sleep(Duration::from_millis(1)),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[test]
    fn test_serves_device_bytes() {
        let dev = BlockingDevice::spawn("repeat", io::repeat(7), patient()).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(dev.next_bytes(&mut buf).unwrap(), 64);
        assert!(buf.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_request_larger_than_pool_is_short() {
        let opts = RefillOptions {
            capacity: 16,
            exhaust_attempts: 5,
            exhaust_sleep: Duration::from_millis(1),
        };
        let dev = BlockingDevice::spawn("small", io::repeat(1), opts).unwrap();
        let mut buf = [0u8; 64];
        let n = dev.next_bytes(&mut buf).unwrap();
        assert!(n <= 16);
        assert!(buf[n..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_request() {
        let dev = BlockingDevice::spawn("repeat", io::repeat(7), patient()).unwrap();
        assert_eq!(dev.next_bytes(&mut []).unwrap(), 0);
    }

    #[test]
    fn test_pool_refills_after_draining() {
        let dev = BlockingDevice::spawn("repeat", io::repeat(3), patient()).unwrap();
        let mut total = 0;
        for _ in 0..10 {
            let mut buf = [0u8; 200];
            total += dev.next_bytes(&mut buf).unwrap();
        }
        assert_eq!(total, 2_000);
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    #[test]
    fn test_read_error_is_surfaced_with_context() {
        let dev = BlockingDevice::spawn("broken", Broken, patient()).unwrap();
        let err = wait_for_error(&dev);
        assert!(err.to_string().contains("refilling broken"), "{err}");

        // The worker is gone, so later reads keep failing.
        let err = wait_for_error(&dev);
        assert!(err.to_string().contains("earlier failure"), "{err}");
    }

    #[test]
    fn test_end_of_input_is_fatal() {
        let dev = BlockingDevice::spawn("empty", io::empty(), patient()).unwrap();
        match wait_for_error(&dev) {
            Error::UnexpectedEof { got, .. } => assert_eq!(got, 0),
            other => panic!("expected UnexpectedEof, got {other}"),
        }
    }

    #[test]
    fn test_buffered_bytes_outlive_failure() {
        let dev = BlockingDevice::spawn("short", io::repeat(4).take(50), patient()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !dev.shared.stopped.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "worker never stopped");
            thread::sleep(Duration::from_millis(1));
        }
        let mut buf = [0u8; 64];
        assert!(matches!(
            dev.next_bytes(&mut buf),
            Err(Error::UnexpectedEof { .. })
        ));
        assert_eq!(dev.next_bytes(&mut buf).unwrap(), 50);
        assert!(buf[..50].iter().all(|&b| b == 4));
    }

    // -----------------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------------

    #[test]
    fn test_close_is_idempotent() {
        let dev = BlockingDevice::spawn("repeat", io::repeat(7), patient()).unwrap();
        dev.close();
        dev.close();
        assert!(dev.is_closed());
        assert_eq!(dev.available(), 0);
        let mut buf = [0u8; 16];
        assert_eq!(dev.next_bytes(&mut buf).unwrap(), 0);
        assert!(dev.to_string().contains("closed"));
    }

    /// Reader that blocks until the test lets one read through.
    struct Gate(mpsc::Receiver<()>);

    impl Read for Gate {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(()) => {
                    buf.fill(1);
                    Ok(buf.len())
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn test_close_detaches_worker_stuck_in_read() {
        let (release, gate) = mpsc::channel();
        let dev = BlockingDevice::spawn("gate", Gate(gate), patient()).unwrap();
        thread::sleep(Duration::from_millis(5));

        dev.close();
        assert!(dev.is_closed());
        assert!(dev.worker.lock().unwrap().is_none());

        // The detached worker finishes its read and exits quietly.
        let _ = release.send(());
        let mut buf = [0u8; 8];
        assert_eq!(dev.next_bytes(&mut buf).unwrap(), 0);
        assert_eq!(dev.available(), 0);
    }

    #[test]
    fn test_close_suppresses_failure() {
        let dev = BlockingDevice::spawn("broken", Broken, patient()).unwrap();
        dev.close();
        let mut buf = [0u8; 16];
        for _ in 0..20 {
            assert_eq!(dev.next_bytes(&mut buf).unwrap(), 0);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_close_concurrent_with_readers() {
        let dev = Arc::new(BlockingDevice::spawn("repeat", io::repeat(9), patient()).unwrap());
        thread::scope(|s| {
            for _ in 0..8 {
                let dev = Arc::clone(&dev);
                s.spawn(move || {
                    let mut buf = [0u8; 48];
                    for _ in 0..200 {
                        let n = dev.next_bytes(&mut buf).unwrap();
                        assert!(buf[..n].iter().all(|&b| b == 9));
                    }
                });
            }
            s.spawn(|| {
                thread::sleep(Duration::from_millis(5));
                dev.close();
            });
        });
        assert!(dev.is_closed());
        let mut buf = [0u8; 8];
        assert_eq!(dev.next_bytes(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_info_classes() {
        let dev = BlockingDevice::spawn("repeat", io::repeat(9), RefillOptions::default()).unwrap();
        assert_eq!(dev.info().buffering, Buffering::Buffered);
        assert_eq!(dev.info().blocking, Blocking::MayBlockBriefly);
        assert!(dev.info().short_reads_expected);
        assert_eq!(dev.options().capacity, DEFAULT_POOL_CAPACITY);
    }
}
