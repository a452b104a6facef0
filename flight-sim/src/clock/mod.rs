use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use persistence::RetryPolicy;

use crate::types::config::SimConfig;

pub mod registry;
pub mod world_clock;

/// Source of real (wall-clock) time.
pub trait RealClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl RealClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A real clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl RealClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Tick cadence shared by every world clock of a process.
#[derive(Debug, Clone, Copy)]
pub struct ClockSettings {
    pub tick_interval: StdDuration,
    pub persist_every: u64,
    pub retry: RetryPolicy,
}

impl ClockSettings {
    pub fn from_config(config: &SimConfig) -> Self {
        ClockSettings {
            tick_interval: config.tick_interval,
            persist_every: config.persist_every.max(1),
            retry: RetryPolicy::new(config.retry_attempts, config.retry_backoff),
        }
    }
}

impl Default for ClockSettings {
    fn default() -> Self {
        ClockSettings::from_config(&SimConfig::default())
    }
}
