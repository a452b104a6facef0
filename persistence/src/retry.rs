use logger::Logger;
use std::thread;
use std::time::Duration;

use crate::errors::StoreError;

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        RetryPolicy {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempts run out. Each transient failure is logged as a warning.
    pub fn run<T, F>(&self, logger: &Logger, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    logger.warn(
                        "retry",
                        &format!(
                            "{} failed (attempt {}/{}): {}",
                            what, attempt, self.attempts, e
                        ),
                    );
                    attempt += 1;
                    thread::sleep(self.backoff);
                }
                Err(e) => {
                    if e.is_transient() {
                        logger.error(
                            "retry",
                            &format!("{} gave up after {} attempts: {}", what, attempt, e),
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
