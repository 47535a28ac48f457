//! The partition record: a single admitted time-bounded reservation.

use crate::device::DeviceHandle;
use std::time::Duration;

/// A single admitted reservation. Immutable except for `active`, which the
/// monitor thread and `release` flip to `false` exactly once.
#[derive(Debug, Clone)]
pub struct Partition {
    pub id: String,
    pub device_idx: usize,
    pub device_handle: DeviceHandle,
    pub memory_fraction: f32,
    pub duration: Duration,
    pub start_wall: String,
    pub start_monotonic: Duration,
    pub active: bool,
    pub owner: String,
    pub pid: u32,
}

impl Partition {
    /// Whether `now` (monotonic) is at or past this partition's expiry.
    pub fn is_expired(&self, now: Duration) -> bool {
        now.saturating_duration_since_or_zero(self.start_monotonic) >= self.duration
    }

    pub fn requested_bytes(&self, total_memory: u64) -> u64 {
        (total_memory as f64 * self.memory_fraction as f64).floor() as u64
    }
}

/// Extension so expiry math reads naturally; `Duration::saturating_sub` is
/// unstable, std only has checked/plain sub.
trait SaturatingSince {
    fn saturating_duration_since_or_zero(self, earlier: Duration) -> Duration;
}

impl SaturatingSince for Duration {
    fn saturating_duration_since_or_zero(self, earlier: Duration) -> Duration {
        self.checked_sub(earlier).unwrap_or(Duration::ZERO)
    }
}

/// Formats a 1-based sequence number as `partition_NNNN`, as used for ids.
pub fn format_partition_id(seq: u64) -> String {
    format!("partition_{seq:04}")
}
