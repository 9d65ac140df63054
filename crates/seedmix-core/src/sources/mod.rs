//! Concrete entropy sources wired to the collector variants.
//!
//! Collectors never name a path themselves. This module opens real devices
//! and assembles the default collector set used by the shared generator.

pub mod os;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::collector::Collector;
use crate::collectors::{BlockingDevice, NonBlockingDevice, PlatformRandom, RefillOptions};
use crate::config::Config;
use crate::error::{Error, Result};

pub use os::OsReader;

/// Fast device that never blocks.
pub const DEV_URANDOM: &str = "/dev/urandom";
/// Slow device that may block until the kernel has gathered entropy.
pub const DEV_RANDOM: &str = "/dev/random";

/// Open an entropy device for reading.
pub fn open_device(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    File::open(path).map_err(|source| Error::ResourceUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

/// Direct-read collector over the device at `path`.
pub fn nonblocking_device(path: impl AsRef<Path>) -> Result<NonBlockingDevice<File>> {
    let path = path.as_ref();
    let file = open_device(path)?;
    Ok(NonBlockingDevice::new(path.display().to_string(), file))
}

/// Pool-backed collector over the device at `path`.
pub fn blocking_device(path: impl AsRef<Path>, options: RefillOptions) -> Result<BlockingDevice> {
    let path = path.as_ref();
    let file = open_device(path)?;
    BlockingDevice::spawn(path.display().to_string(), file, options)
}

/// Direct-read collector over the OS CSPRNG.
pub fn os_collector() -> NonBlockingDevice<OsReader> {
    NonBlockingDevice::new("os_getrandom", OsReader)
}

/// Build every default collector that can be opened on this machine.
///
/// Failures are logged and skipped. The result is empty only when every
/// configured source failed.
pub fn default_collectors(config: &Config) -> Vec<Arc<dyn Collector>> {
    let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();

    match nonblocking_device(&config.nonblocking_device) {
        Ok(dev) => collectors.push(Arc::new(dev)),
        Err(e) if config.os_fallback => {
            warn!("{e}; using the OS CSPRNG instead");
            collectors.push(Arc::new(os_collector()));
        }
        Err(e) => warn!("skipping collector: {e}"),
    }

    if let Some(path) = &config.blocking_device {
        match blocking_device(path, config.refill_options()) {
            Ok(dev) => collectors.push(Arc::new(dev)),
            Err(e) => warn!("skipping collector: {e}"),
        }
    }

    if config.platform_random {
        match PlatformRandom::new() {
            Ok(c) => collectors.push(Arc::new(c)),
            Err(e) => warn!("skipping collector: {e}"),
        }
    }

    if collectors.is_empty() {
        warn!("no default collectors could be opened");
    } else {
        info!("gathered {} default collectors", collectors.len());
    }
    collectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn missing() -> PathBuf {
        PathBuf::from("/nonexistent/seedmix/device")
    }

    #[test]
    fn test_open_missing_device() {
        match open_device(missing()) {
            Err(Error::ResourceUnavailable { path, .. }) => assert_eq!(path, missing()),
            other => panic!("expected ResourceUnavailable, got {other:?}"),
        }
        assert!(nonblocking_device(missing()).is_err());
        assert!(blocking_device(missing(), RefillOptions::default()).is_err());
    }

    #[test]
    fn test_file_backed_nonblocking_device() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0x42; 100]).unwrap();
        let dev = nonblocking_device(f.path()).unwrap();
        let mut buf = [0u8; 60];
        assert_eq!(dev.next_bytes(&mut buf).unwrap(), 60);
        assert!(buf.iter().all(|&b| b == 0x42));
        // Only 40 bytes remain.
        assert!(matches!(
            dev.next_bytes(&mut buf),
            Err(Error::UnexpectedEof { got: 40, .. })
        ));
    }

    #[test]
    fn test_os_collector() {
        let c = os_collector();
        let mut buf = [0u8; 100];
        assert_eq!(c.next_bytes(&mut buf).unwrap(), 100);
        assert_eq!(c.name(), "os_getrandom");
    }

    #[test]
    fn test_missing_device_falls_back() {
        let config = Config {
            nonblocking_device: missing(),
            ..Config::default()
        };
        let collectors = default_collectors(&config);
        assert_eq!(collectors.len(), 1);
        assert_eq!(collectors[0].name(), "os_getrandom");
    }

    #[test]
    fn test_failures_do_not_abort() {
        let config = Config {
            nonblocking_device: missing(),
            blocking_device: Some(missing()),
            os_fallback: false,
            platform_random: true,
            ..Config::default()
        };
        let collectors = default_collectors(&config);
        assert_eq!(collectors.len(), 1);
        assert_eq!(collectors[0].name(), "platform_random");
    }

    #[test]
    fn test_nothing_available() {
        let config = Config {
            nonblocking_device: missing(),
            os_fallback: false,
            ..Config::default()
        };
        assert!(default_collectors(&config).is_empty());
    }
}
