//! Wire-serializable mirrors of the manager's snapshot types, used only at
//! the IPC boundary so `manager.rs` stays free of serde concerns.

use crate::manager::{DeviceStats, PartitionSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionWire {
    pub id: String,
    pub device_idx: usize,
    pub device_name: String,
    pub memory_fraction: f32,
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub owner: String,
    pub pid: u32,
}

impl From<&PartitionSnapshot> for PartitionWire {
    fn from(s: &PartitionSnapshot) -> Self {
        Self {
            id: s.id.clone(),
            device_idx: s.device_idx,
            device_name: s.device_name.clone(),
            memory_fraction: s.memory_fraction,
            duration_secs: s.duration.as_secs(),
            remaining_secs: s.remaining.as_secs(),
            owner: s.owner.clone(),
            pid: s.pid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatsWire {
    pub idx: usize,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub type_tokens: Vec<String>,
    pub total_memory: u64,
    pub available_memory: u64,
    pub active_partition_count: usize,
}

impl From<&DeviceStats> for DeviceStatsWire {
    fn from(s: &DeviceStats) -> Self {
        Self {
            idx: s.idx,
            name: s.name.clone(),
            vendor: s.vendor.clone(),
            version: s.version.clone(),
            type_tokens: s.type_tokens.iter().map(|t| t.to_string()).collect(),
            total_memory: s.total_memory,
            available_memory: s.available_memory,
            active_partition_count: s.active_partition_count,
        }
    }
}
