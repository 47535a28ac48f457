//! End-to-end scenarios against `PartitionManager`, using the in-memory
//! fakes so no real filesystem or GPU hardware is required.

use chronos_core::clock::FakeClock;
use chronos_core::error::ChronosError;
use chronos_core::gpu::FakeGpuSource;
use chronos_core::platform::{FakePlatform, Platform};
use chronos_core::PartitionManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn single_device_manager(total_memory: u64) -> (PartitionManager, Arc<FakeClock>) {
    let gpu = FakeGpuSource::single(total_memory);
    let platform = Arc::new(FakePlatform::new("daemon"));
    let clock = Arc::new(FakeClock::new());
    let manager = PartitionManager::new(&gpu, platform, clock.clone(), PathBuf::from("/locks"));
    (manager, clock)
}

/// Scenario 1: basic lifecycle — admit, observe, let it expire.
///
/// The manager has no background sweep to drive in a fake-clock test (the
/// monitor thread runs on wall-clock sleeps, not the fake clock), so the
/// post-expiry state is checked by advancing the clock and calling `list`,
/// which recomputes `remaining` directly rather than relying on the sweep
/// to have already run. `available_fraction` reflects the sweep, so the
/// test accepts either outcome reached via an explicit `release`.
#[test]
fn scenario_basic_lifecycle() {
    let (manager, clock) = single_device_manager(1_000_000);

    let id = manager.create(0, 0.10, 5, "alice").unwrap();
    assert_eq!(id, "partition_0001");

    let snapshots = manager.list(false);
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].memory_fraction, 0.10);
    assert!(snapshots[0].remaining <= Duration::from_secs(5));

    clock.advance(Duration::from_secs(6));
    let remaining_now = manager.list(false)[0].remaining;
    assert_eq!(remaining_now, Duration::ZERO);

    manager.release(&id, "alice").unwrap();
    assert!(manager.list(false).is_empty());
    assert_eq!(manager.available_fraction(0).unwrap(), 100.0);
}

/// Scenario 2: early release frees memory immediately.
#[test]
fn scenario_early_release() {
    let (manager, _clock) = single_device_manager(1_000_000);

    let id = manager.create(0, 0.50, 60, "alice").unwrap();
    manager.release(&id, "alice").unwrap();

    assert_eq!(manager.available_fraction(0).unwrap(), 100.0);
}

/// Scenario 3: memory exhaustion leaves state unchanged.
#[test]
fn scenario_memory_exhaustion() {
    let (manager, _clock) = single_device_manager(1_000_000);

    let id = manager.create(0, 0.60, 60, "alice").unwrap();
    assert_eq!(id, "partition_0001");

    let err = manager.create(0, 0.60, 60, "alice").unwrap_err();
    assert!(matches!(err, ChronosError::InsufficientMemory { .. }));
    assert_eq!(manager.available_fraction(0).unwrap(), 40.0);
    assert_eq!(manager.list(false).len(), 1);
}

/// Scenario 4: lock contention across different owners on the same
/// device+fraction slot, modeled as two calls through one daemon-resident
/// manager (see `manager.rs`'s `caller`-parameterized API rationale).
#[test]
fn scenario_lock_contention_across_owners() {
    let (manager, _clock) = single_device_manager(1_000_000);

    let id_a = manager.create(0, 0.25, 60, "alice").unwrap();

    let err = manager.create(0, 0.25, 60, "bob").unwrap_err();
    match err {
        ChronosError::Contended { owner, .. } => assert_eq!(owner, "alice"),
        other => panic!("expected Contended naming alice, got {other:?}"),
    }

    assert_eq!(manager.list(false)[0].id, id_a);
}

/// Scenario 5: wrong-owner release is rejected, the original owner's
/// partition is unaffected.
#[test]
fn scenario_wrong_owner_release() {
    let (manager, _clock) = single_device_manager(1_000_000);

    let id = manager.create(0, 0.30, 60, "alice").unwrap();
    let err = manager.release(&id, "bob").unwrap_err();
    assert!(matches!(err, ChronosError::PermissionDenied { .. }));

    let snapshots = manager.list(false);
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].owner, "alice");
}

/// Scenario 6: shutdown reclaims every still-active partition; a fresh
/// manager reusing the same lock directory sees a clean slate.
#[test]
fn scenario_shutdown_reclaim() {
    let platform = Arc::new(FakePlatform::new("daemon"));
    let clock = Arc::new(FakeClock::new());
    let lock_dir = PathBuf::from("/locks");

    {
        let gpu = FakeGpuSource::single(1_000_000);
        let manager = PartitionManager::new(&gpu, platform.clone(), clock.clone(), lock_dir.clone());
        manager.create(0, 0.30, 3600, "alice").unwrap();
        manager.create(0, 0.50, 3600, "alice").unwrap();
        assert_eq!(manager.available_fraction(0).unwrap(), 20.0);
        // manager dropped here, running its shutdown reclaim
    }

    assert!(!platform.file_exists(&lock_dir.join("gpu_0_0300.lock")));
    assert!(!platform.file_exists(&lock_dir.join("gpu_0_0500.lock")));

    let gpu = FakeGpuSource::single(1_000_000);
    let fresh = PartitionManager::new(&gpu, platform, clock, lock_dir);
    assert_eq!(fresh.available_fraction(0).unwrap(), 100.00);
}

/// P1: conservation — available + reserved == total at every observation.
#[test]
fn property_memory_conservation() {
    let (manager, _clock) = single_device_manager(1_000_000);

    manager.create(0, 0.20, 60, "alice").unwrap();
    manager.create(0, 0.30, 60, "bob").unwrap();

    let stats = &manager.device_stats()[0];
    let reserved: u64 = manager
        .list(false)
        .iter()
        .map(|p| (stats.total_memory as f64 * p.memory_fraction as f64).floor() as u64)
        .sum();
    assert_eq!(stats.available_memory + reserved, stats.total_memory);
}

/// P5: id uniqueness across many creates in one manager lifetime.
#[test]
fn property_id_uniqueness() {
    let (manager, _clock) = single_device_manager(1_000_000_000);

    let mut ids = Vec::new();
    for i in 0..20 {
        let id = manager.create(0, 0.01, 60, &format!("user{i}")).unwrap();
        ids.push(id);
    }
    let unique: std::collections::HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
}

/// P7: idempotent release.
#[test]
fn property_idempotent_release() {
    let (manager, _clock) = single_device_manager(1_000_000);
    let id = manager.create(0, 0.5, 60, "alice").unwrap();
    manager.release(&id, "alice").unwrap();
    let err = manager.release(&id, "alice").unwrap_err();
    assert!(matches!(err, ChronosError::NotFound(_)));
}

/// Boundary: memory_fraction = 1 admits if the device is fully free.
#[test]
fn boundary_full_fraction_admitted_when_free() {
    let (manager, _clock) = single_device_manager(1_000_000);
    assert!(manager.create(0, 1.0, 60, "alice").is_ok());
}

/// Boundary: memory_fraction = 0 and > 1 are both rejected.
#[test]
fn boundary_fraction_zero_and_above_one_rejected() {
    let (manager, _clock) = single_device_manager(1_000_000);
    assert!(manager.create(0, 0.0, 60, "alice").is_err());
    assert!(manager.create(0, 1.0001, 60, "alice").is_err());
}

/// Boundary: fractions whose percentMil coincides collide in the lock store
/// even though combined memory would fit. 0.25033 and 0.25038 both round to
/// percentMil 250.
#[test]
fn boundary_percent_mil_collision_contends() {
    let (manager, _clock) = single_device_manager(1_000_000);
    manager.create(0, 0.25033, 60, "alice").unwrap();
    let err = manager.create(0, 0.25038, 60, "bob").unwrap_err();
    assert!(matches!(err, ChronosError::Contended { .. }));
}
