//! Time source used by the engine.
//!
//! Expiration math runs off a monotonic clock so a wall-clock jump backwards
//! can never un-expire a lease; `startTime` is still recorded with a wall
//! string purely for display (lock file `time:` field, `chronosctl list`).

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Capability for reading the current time, injected so tests can control it.
pub trait Clock: Send + Sync {
    /// Monotonically increasing elapsed time since some arbitrary epoch.
    fn monotonic(&self) -> Duration;

    /// Current local time formatted `YYYY-MM-DD HH:MM:SS`, for display and
    /// for the lock file's `time:` field.
    fn wall_clock_string(&self) -> String;
}

/// Real clock: `Instant` for elapsed time, `chrono::Local` for display.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn wall_clock_string(&self) -> String {
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Fake clock for tests: elapsed time only moves when [`FakeClock::advance`]
/// is called.
pub struct FakeClock {
    elapsed: Mutex<Duration>,
    wall: Mutex<String>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            elapsed: Mutex::new(Duration::ZERO),
            wall: Mutex::new("2026-01-01 00:00:00".to_string()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap();
        *elapsed += by;
    }

    pub fn set_wall_clock_string(&self, s: impl Into<String>) {
        *self.wall.lock().unwrap() = s.into();
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn monotonic(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    fn wall_clock_string(&self) -> String {
        self.wall.lock().unwrap().clone()
    }
}
