//! Runtime configuration for collectors and the shared generator.
//!
//! Every field has a default, so a JSON file only needs the keys it changes:
//!
//! ```json
//! { "profile": "conservative", "blocking_device": "/dev/random" }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collectors::blocking::{
    DEFAULT_EXHAUST_ATTEMPTS, DEFAULT_POOL_CAPACITY, RefillOptions,
};
use crate::error::{Error, Result};
use crate::expansion::Profile;
use crate::sources::DEV_URANDOM;

/// Configuration for default collectors and the expansion function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub profile: Profile,
    /// Pool size of each blocking device collector.
    pub pool_capacity: usize,
    /// Waits a blocking device read makes before settling for what it has.
    pub exhaust_attempts: u32,
    pub exhaust_sleep_ms: u64,
    pub nonblocking_device: PathBuf,
    /// Slow device read through a refill worker. Off unless set.
    pub blocking_device: Option<PathBuf>,
    pub platform_random: bool,
    /// Fall back to the OS CSPRNG when the non-blocking device cannot be opened.
    pub os_fallback: bool,
    /// Install the default collectors on first use of the shared generator.
    pub gather_defaults: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: Profile::Fast,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            exhaust_attempts: DEFAULT_EXHAUST_ATTEMPTS,
            exhaust_sleep_ms: 1,
            nonblocking_device: PathBuf::from(DEV_URANDOM),
            blocking_device: None,
            platform_random: false,
            os_fallback: true,
            gather_defaults: true,
        }
    }
}

impl Config {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == 0 {
            return Err(Error::Config("pool_capacity must be at least 1".into()));
        }
        if self.exhaust_attempts == 0 {
            return Err(Error::Config("exhaust_attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Pool options for blocking device collectors.
    pub fn refill_options(&self) -> RefillOptions {
        RefillOptions {
            capacity: self.pool_capacity,
            exhaust_attempts: self.exhaust_attempts,
            exhaust_sleep: Duration::from_millis(self.exhaust_sleep_ms),
        }
    }
}
