//! The partition lifecycle engine: admission, listing, release, and the
//! background expiration monitor.

use crate::clock::Clock;
use crate::device::DeviceRegistry;
use crate::error::{ChronosError, Result};
use crate::gpu::GpuSource;
use crate::lock_store::{LockContent, LockStore};
use crate::partition::{format_partition_id, Partition};
use crate::platform::Platform;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

const MONITOR_PERIOD: Duration = Duration::from_secs(1);

/// A point-in-time view of one active partition, as returned by `list`.
#[derive(Debug, Clone)]
pub struct PartitionSnapshot {
    pub id: String,
    pub device_idx: usize,
    pub device_name: String,
    pub memory_fraction: f32,
    pub duration: Duration,
    pub remaining: Duration,
    pub owner: String,
    pub pid: u32,
}

/// Per-device usage figures, as returned by `device_stats`.
#[derive(Debug, Clone)]
pub struct DeviceStats {
    pub idx: usize,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub type_tokens: Vec<&'static str>,
    pub total_memory: u64,
    pub available_memory: u64,
    pub active_partition_count: usize,
}

/// Everything the admission path and the monitor mutate under one guard.
struct State {
    registry: DeviceRegistry,
    partitions: Vec<Partition>,
    next_id: u64,
}

struct Inner {
    state: Mutex<State>,
    lock_store: LockStore,
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    /// Woken on shutdown so the monitor doesn't wait out a full period.
    wake: Condvar,
    wake_lock: Mutex<()>,
    monitor_period: Duration,
}

/// The engine. The monitor thread is joined when this is dropped, and every
/// still-active partition is reclaimed first.
pub struct PartitionManager {
    inner: Arc<Inner>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl PartitionManager {
    /// Builds a manager with the spec's nominal one-second sweep period.
    pub fn new(
        gpu: &dyn GpuSource,
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
        lock_dir: PathBuf,
    ) -> Self {
        Self::with_monitor_period(gpu, platform, clock, lock_dir, MONITOR_PERIOD)
    }

    /// Builds a manager with an overridden sweep period — the knob
    /// `ChronosConfig::daemon.monitor_period_secs` feeds at startup. The spec
    /// treats 1s as nominal (§4.4); this exists for operators who need a
    /// coarser or finer sweep without touching the source.
    pub fn with_monitor_period(
        gpu: &dyn GpuSource,
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
        lock_dir: PathBuf,
        monitor_period: Duration,
    ) -> Self {
        let registry = DeviceRegistry::build(gpu);
        if registry.is_empty() {
            warn!("device registry is empty; every operation will fail InvalidArgument");
        }

        let lock_store = LockStore::new(lock_dir, platform.clone());
        if let Err(e) = lock_store.ensure_base_dir() {
            warn!(error = %e, "failed to create lock store base directory");
        }

        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                registry,
                partitions: Vec::new(),
                next_id: 1,
            }),
            lock_store,
            platform,
            clock,
            running: AtomicBool::new(true),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
            monitor_period,
        });

        let monitor_inner = inner.clone();
        let handle = std::thread::spawn(move || monitor_loop(monitor_inner));

        Self {
            inner,
            monitor: Mutex::new(Some(handle)),
        }
    }

    /// `caller` is the username attributed to this request — resolved by
    /// the IPC layer per-connection so one long-lived daemon can correctly
    /// enforce ownership across many different calling users, rather than
    /// collapsing every caller to the daemon process's own identity.
    pub fn create(
        &self,
        device_idx: usize,
        memory_fraction: f32,
        duration_secs: u64,
        caller: &str,
    ) -> Result<String> {
        if !(memory_fraction > 0.0 && memory_fraction <= 1.0) {
            warn!(memory_fraction, "rejected create: fraction out of (0, 1]");
            return Err(ChronosError::InvalidArgument(format!(
                "memory_fraction {memory_fraction} not in (0, 1]"
            )));
        }
        if duration_secs == 0 {
            warn!("rejected create: duration must be positive");
            return Err(ChronosError::InvalidArgument(
                "duration must be > 0 seconds".to_string(),
            ));
        }

        let mut state = self.inner.state.lock().unwrap();

        if state.registry.get(device_idx).is_none() {
            warn!(device_idx, "rejected create: device index out of range");
            return Err(ChronosError::InvalidArgument(format!(
                "device index {device_idx} out of range"
            )));
        }

        let total_memory = state.registry.get(device_idx).unwrap().total_memory;
        let requested = (total_memory as f64 * memory_fraction as f64).floor() as u64;
        let available = state.registry.get(device_idx).unwrap().available_memory;

        if requested > available {
            warn!(device_idx, requested, available, "insufficient memory");
            return Err(ChronosError::InsufficientMemory {
                device_idx,
                requested,
                available,
            });
        }

        let username = caller.to_string();

        if self.inner.lock_store.exists(device_idx, memory_fraction as f64) {
            let owner = self.inner.lock_store.read_owner(device_idx, memory_fraction as f64);
            if owner != username {
                warn!(device_idx, %owner, "rejected create: fraction slot contended");
                return Err(ChronosError::Contended {
                    device_idx,
                    percent_mil: crate::lock_store::percent_mil(memory_fraction as f64),
                    owner,
                });
            }
        }

        let seq = state.next_id;
        let partition_id = format_partition_id(seq);

        let content = LockContent {
            pid: self.inner.platform.process_id(),
            user: &username,
            host: &self.inner.platform.hostname(),
            time: &self.inner.clock.wall_clock_string(),
            device_idx,
            fraction: memory_fraction,
            partition_id: &partition_id,
        };

        if let Err(e) = self
            .inner
            .lock_store
            .create(device_idx, memory_fraction as f64, &content)
        {
            warn!(device_idx, error = %e, "lock creation lost a race");
            let owner = self.inner.lock_store.read_owner(device_idx, memory_fraction as f64);
            return Err(ChronosError::Contended {
                device_idx,
                percent_mil: crate::lock_store::percent_mil(memory_fraction as f64),
                owner,
            });
        }

        state.next_id += 1;
        let device = state.registry.get_mut(device_idx).unwrap();
        device.available_memory -= requested;
        let device_handle = device.handle;

        let partition = Partition {
            id: partition_id.clone(),
            device_idx,
            device_handle,
            memory_fraction,
            duration: Duration::from_secs(duration_secs),
            start_wall: self.inner.clock.wall_clock_string(),
            start_monotonic: self.inner.clock.monotonic(),
            active: true,
            owner: username,
            pid: self.inner.platform.process_id(),
        };
        state.partitions.push(partition);

        info!(partition_id = %partition_id, device_idx, memory_fraction, "partition admitted");
        Ok(partition_id)
    }

    pub fn list(&self, verbose: bool) -> Vec<PartitionSnapshot> {
        let state = self.inner.state.lock().unwrap();
        let now = self.inner.clock.monotonic();

        let snapshots: Vec<PartitionSnapshot> = state
            .partitions
            .iter()
            .filter(|p| p.active)
            .map(|p| {
                let elapsed = now.checked_sub(p.start_monotonic).unwrap_or(Duration::ZERO);
                let remaining = p.duration.checked_sub(elapsed).unwrap_or(Duration::ZERO);
                let device_name = state
                    .registry
                    .get(p.device_idx)
                    .map(|d| d.name.clone())
                    .unwrap_or_else(|| "Unknown".to_string());
                PartitionSnapshot {
                    id: p.id.clone(),
                    device_idx: p.device_idx,
                    device_name,
                    memory_fraction: p.memory_fraction,
                    duration: p.duration,
                    remaining,
                    owner: p.owner.clone(),
                    pid: p.pid,
                }
            })
            .collect();

        if verbose {
            info!(listing = %crate::format::format_listing(&snapshots), "partition listing");
        }

        snapshots
    }

    pub fn release(&self, partition_id: &str, caller: &str) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();

        let idx = state
            .partitions
            .iter()
            .position(|p| p.id == partition_id && p.active);

        let Some(idx) = idx else {
            warn!(partition_id, "release failed: partition not found");
            return Err(ChronosError::NotFound(partition_id.to_string()));
        };

        if state.partitions[idx].owner != caller {
            warn!(partition_id, "release failed: caller is not the owner");
            return Err(ChronosError::PermissionDenied {
                partition_id: partition_id.to_string(),
            });
        }

        release_locked(&mut state, idx, &self.inner.lock_store);
        state.partitions.retain(|p| p.active);

        info!(partition_id, "partition released");
        Ok(())
    }

    pub fn device_stats(&self) -> Vec<DeviceStats> {
        let state = self.inner.state.lock().unwrap();
        state
            .registry
            .iter()
            .map(|(idx, d)| {
                let active_partition_count = state
                    .partitions
                    .iter()
                    .filter(|p| p.active && p.device_idx == idx)
                    .count();
                DeviceStats {
                    idx,
                    name: d.name.clone(),
                    vendor: d.vendor.clone(),
                    version: d.version.clone(),
                    type_tokens: d.device_type.tokens(),
                    total_memory: d.total_memory,
                    available_memory: d.available_memory,
                    active_partition_count,
                }
            })
            .collect()
    }

    pub fn available_fraction(&self, device_idx: usize) -> Result<f64> {
        let state = self.inner.state.lock().unwrap();
        let Some(device) = state.registry.get(device_idx) else {
            warn!(device_idx, "available_fraction failed: device index out of range");
            return Err(ChronosError::InvalidArgument(format!(
                "device index {device_idx} out of range"
            )));
        };
        if device.total_memory == 0 {
            return Ok(0.0);
        }
        Ok(100.0 * device.available_memory as f64 / device.total_memory as f64)
    }
}

/// Shared release procedure: credit memory, delete lock, mark inactive.
/// Caller holds the state guard and removes inactive records afterward.
fn release_locked(state: &mut State, idx: usize, lock_store: &LockStore) {
    let partition = state.partitions[idx].clone();
    if let Some(device) = state
        .registry
        .iter()
        .find(|(_, d)| d.handle == partition.device_handle)
        .map(|(i, _)| i)
        .and_then(|i| state.registry.get_mut(i))
    {
        let credited = (device.total_memory as f64 * partition.memory_fraction as f64).floor() as u64;
        device.available_memory = (device.available_memory + credited).min(device.total_memory);
    }
    lock_store.delete(partition.device_idx, partition.memory_fraction as f64);
    state.partitions[idx].active = false;
}

fn monitor_loop(inner: Arc<Inner>) {
    while inner.running.load(Ordering::SeqCst) {
        {
            let guard = inner.wake_lock.lock().unwrap();
            let (_guard, _timeout) = inner
                .wake
                .wait_timeout(guard, inner.monitor_period)
                .unwrap();
        }
        if !inner.running.load(Ordering::SeqCst) {
            break;
        }
        sweep(&inner);
    }
}

fn sweep(inner: &Inner) {
    let mut state = inner.state.lock().unwrap();
    let now = inner.clock.monotonic();

    let due: Vec<usize> = state
        .partitions
        .iter()
        .enumerate()
        .filter(|(_, p)| p.active && p.is_expired(now))
        .map(|(i, _)| i)
        .collect();

    for idx in due {
        let id = state.partitions[idx].id.clone();
        release_locked(&mut state, idx, &inner.lock_store);
        info!(partition_id = %id, "partition expired");
    }

    state.partitions.retain(|p| p.active);
}

impl Drop for PartitionManager {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::SeqCst);
        inner_notify(&self.inner);

        if let Some(handle) = self.monitor.lock().unwrap().take() {
            let _ = handle.join();
        }

        let mut state = self.inner.state.lock().unwrap();
        let active: Vec<usize> = state
            .partitions
            .iter()
            .enumerate()
            .filter(|(_, p)| p.active)
            .map(|(i, _)| i)
            .collect();
        for idx in active {
            release_locked(&mut state, idx, &self.inner.lock_store);
        }
        state.partitions.clear();
    }
}

fn inner_notify(inner: &Inner) {
    let _guard = inner.wake_lock.lock().unwrap();
    inner.wake.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::gpu::FakeGpuSource;
    use crate::platform::FakePlatform;

    fn manager_with(total_memory: u64) -> (PartitionManager, Arc<FakeClock>) {
        let gpu = FakeGpuSource::single(total_memory);
        let platform = Arc::new(FakePlatform::new("daemon"));
        let clock = Arc::new(FakeClock::new());
        let manager = PartitionManager::new(&gpu, platform, clock.clone(), PathBuf::from("/locks"));
        (manager, clock)
    }

    #[test]
    fn create_then_list_reports_one_partition() {
        let (manager, _clock) = manager_with(1000);
        let id = manager.create(0, 0.10, 5, "alice").unwrap();
        assert_eq!(id, "partition_0001");
        let snapshots = manager.list(false);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].memory_fraction, 0.10);
    }

    #[test]
    fn create_rejects_fraction_out_of_range() {
        let (manager, _clock) = manager_with(1000);
        assert!(matches!(
            manager.create(0, 0.0, 5, "alice"),
            Err(ChronosError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.create(0, 1.1, 5, "alice"),
            Err(ChronosError::InvalidArgument(_))
        ));
    }

    #[test]
    fn create_rejects_zero_duration() {
        let (manager, _clock) = manager_with(1000);
        assert!(matches!(
            manager.create(0, 0.5, 0, "alice"),
            Err(ChronosError::InvalidArgument(_))
        ));
    }

    #[test]
    fn create_rejects_device_out_of_range() {
        let (manager, _clock) = manager_with(1000);
        assert!(matches!(
            manager.create(7, 0.5, 5, "alice"),
            Err(ChronosError::InvalidArgument(_))
        ));
    }

    #[test]
    fn memory_exhaustion_is_rejected_and_state_unchanged() {
        let (manager, _clock) = manager_with(1000);
        manager.create(0, 0.60, 60, "alice").unwrap();
        let err = manager.create(0, 0.60, 60, "alice").unwrap_err();
        assert!(matches!(err, ChronosError::InsufficientMemory { .. }));
        assert_eq!(manager.available_fraction(0).unwrap(), 40.0);
    }

    #[test]
    fn release_by_owner_credits_memory_back() {
        let (manager, _clock) = manager_with(1000);
        let id = manager.create(0, 0.5, 60, "alice").unwrap();
        manager.release(&id, "alice").unwrap();
        assert_eq!(manager.available_fraction(0).unwrap(), 100.0);
        assert!(manager.list(false).is_empty());
    }

    #[test]
    fn release_by_wrong_owner_is_denied_and_partition_survives() {
        let (manager, _clock) = manager_with(1000);
        let id = manager.create(0, 0.5, 60, "alice").unwrap();
        assert!(matches!(
            manager.release(&id, "bob"),
            Err(ChronosError::PermissionDenied { .. })
        ));
        assert_eq!(manager.list(false).len(), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let (manager, _clock) = manager_with(1000);
        let id = manager.create(0, 0.5, 60, "alice").unwrap();
        manager.release(&id, "alice").unwrap();
        assert!(matches!(
            manager.release(&id, "alice"),
            Err(ChronosError::NotFound(_))
        ));
    }

    #[test]
    fn cross_owner_lock_contention_blocks_the_second_creator() {
        let (manager, _clock) = manager_with(1000);
        let id = manager.create(0, 0.25, 60, "alice").unwrap();

        let err = manager.create(0, 0.25, 60, "bob").unwrap_err();
        match err {
            ChronosError::Contended { owner, .. } => assert_eq!(owner, "alice"),
            other => panic!("expected Contended, got {other:?}"),
        }

        assert_eq!(manager.list(false)[0].id, id);
    }

    #[test]
    fn same_owner_retrying_same_slot_also_collides_with_itself() {
        // A single manager instance never issues the same (device, fraction)
        // id twice to one owner since the counter is unique per call, but a
        // second concurrent create on the identical slot by the same owner
        // still observes the existing lock and is let through to attempt an
        // atomic create, which then fails because the slot is occupied.
        let (manager, _clock) = manager_with(1000);
        manager.create(0, 0.25, 60, "alice").unwrap();
        let err = manager.create(0, 0.25, 60, "alice").unwrap_err();
        assert!(matches!(err, ChronosError::Contended { .. }));
    }

    #[test]
    fn available_fraction_out_of_range_device_fails() {
        let (manager, _clock) = manager_with(1000);
        assert!(manager.available_fraction(9).is_err());
    }

    #[test]
    fn with_monitor_period_overrides_the_default_sweep_interval() {
        let gpu = FakeGpuSource::single(1000);
        let platform = Arc::new(FakePlatform::new("daemon"));
        let clock = Arc::new(FakeClock::new());
        let manager = PartitionManager::with_monitor_period(
            &gpu,
            platform,
            clock,
            PathBuf::from("/locks"),
            Duration::from_millis(50),
        );
        let id = manager.create(0, 0.5, 60, "alice").unwrap();
        assert_eq!(manager.list(false)[0].id, id);
    }
}
