use std::fmt::Display;
use std::thread;
use std::time::Duration;

use log::debug;

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Runs `op` once, never retrying.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Runs `op` until it succeeds or `policy.attempts` is exhausted, returning
/// the last error. At least one attempt is always made.
pub fn retry<T, E, F>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                debug!("{label}: attempt {attempt}/{attempts} failed: {e}");
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
                attempt += 1;
            }
            Err(e) => {
                debug!("{label}: giving up after {attempts} attempts: {e}");
                return Err(e);
            }
        }
    }
}
