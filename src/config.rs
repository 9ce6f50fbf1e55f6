//! Store configuration.
//!
//! The defaults reproduce the on-disk behavior of the JSON store: a `data`
//! directory next to the process, three read attempts 50ms apart, and
//! indented output so the collection files stay readable by hand.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const DATA_DIR_ENV: &str = "COURSIFY_DATA_DIR";
pub const READ_ATTEMPTS_ENV: &str = "COURSIFY_READ_ATTEMPTS";
pub const READ_RETRY_MS_ENV: &str = "COURSIFY_READ_RETRY_MS";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_READ_ATTEMPTS: u32 = 3;
const DEFAULT_READ_RETRY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one `<collection>.json` file per collection.
    pub data_dir: PathBuf,

    /// How many times a collection read is attempted before the error surfaces.
    pub read_attempts: u32,

    /// Fixed pause between read attempts.
    pub read_retry_delay: Duration,

    /// Write indented JSON.
    pub pretty: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            read_attempts: DEFAULT_READ_ATTEMPTS,
            read_retry_delay: DEFAULT_READ_RETRY,
            pretty: true,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Builds a config from `COURSIFY_*` environment variables, keeping the
    /// default for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if dir.trim().is_empty() {
                warn!("{DATA_DIR_ENV} is empty, using default data directory");
            } else {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(attempts) = parse_env::<u32>(READ_ATTEMPTS_ENV) {
            config.read_attempts = attempts;
        }

        if let Some(ms) = parse_env::<u64>(READ_RETRY_MS_ENV) {
            config.read_retry_delay = Duration::from_millis(ms);
        }

        config
    }

    pub fn with_read_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.read_attempts = attempts;
        self.read_retry_delay = delay;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.read_attempts, self.read_retry_delay)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable {key}={raw:?}, using default");
            None
        }
    }
}
