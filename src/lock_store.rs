//! Per-`(device, fraction)` cross-process rendezvous, backed by files named
//! deterministically so independent processes derive the same path.

use crate::platform::Platform;
use std::path::PathBuf;
use std::sync::Arc;

/// Exact content of a fresh lock file, in the order the wire format requires.
pub struct LockContent<'a> {
    pub pid: u32,
    pub user: &'a str,
    pub host: &'a str,
    pub time: &'a str,
    pub device_idx: usize,
    pub fraction: f32,
    pub partition_id: &'a str,
}

impl<'a> LockContent<'a> {
    fn render(&self) -> String {
        format!(
            "pid: {}\nuser: {}\nhost: {}\ntime: {}\ndevice: {}\nfraction: {}\npartition: {}\n",
            self.pid,
            self.user,
            self.host,
            self.time,
            self.device_idx,
            self.fraction,
            self.partition_id,
        )
    }
}

/// Rounds a memory fraction to the thousandths-of-a-percent slot used for
/// both lock-file naming and fraction-collision semantics.
pub fn percent_mil(memory_fraction: f64) -> u32 {
    (memory_fraction * 1000.0).round() as u32
}

pub struct LockStore {
    base_dir: PathBuf,
    platform: Arc<dyn Platform>,
}

impl LockStore {
    /// Creates `base_dir` idempotently. Failure to create it is logged by
    /// the caller but never prevents the store from functioning — every
    /// subsequent operation simply fails as if the lock were absent or the
    /// create lost a race.
    pub fn new(base_dir: PathBuf, platform: Arc<dyn Platform>) -> Self {
        Self { base_dir, platform }
    }

    pub fn ensure_base_dir(&self) -> std::io::Result<()> {
        self.platform.create_dir_all(&self.base_dir)
    }

    pub fn lock_path(&self, device_idx: usize, memory_fraction: f64) -> PathBuf {
        let pm = percent_mil(memory_fraction);
        self.base_dir
            .join(format!("gpu_{device_idx}_{pm:04}.lock"))
    }

    pub fn exists(&self, device_idx: usize, memory_fraction: f64) -> bool {
        self.platform
            .file_exists(&self.lock_path(device_idx, memory_fraction))
    }

    /// Scans for a `user: ` prefixed line and returns the remainder,
    /// unmodified. Empty string if the file is absent or has no such line.
    pub fn read_owner(&self, device_idx: usize, memory_fraction: f64) -> String {
        let path = self.lock_path(device_idx, memory_fraction);
        let Ok(contents) = self.platform.read_to_string(&path) else {
            return String::new();
        };
        for line in contents.lines() {
            if let Some(rest) = line.strip_prefix("user: ") {
                return rest.to_string();
            }
        }
        String::new()
    }

    /// Atomic-exclusive create. `Err` means the file already existed (a
    /// contended slot) or the write failed (partial file is removed by the
    /// platform adapter).
    pub fn create(
        &self,
        device_idx: usize,
        memory_fraction: f64,
        content: &LockContent<'_>,
    ) -> std::io::Result<()> {
        let path = self.lock_path(device_idx, memory_fraction);
        self.platform.create_exclusive(&path, &content.render())
    }

    /// Best-effort delete; absence is not an error to the caller.
    pub fn delete(&self, device_idx: usize, memory_fraction: f64) {
        let path = self.lock_path(device_idx, memory_fraction);
        self.platform.delete_file(&path);
    }
}
