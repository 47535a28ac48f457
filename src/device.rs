//! Device registry: the immutable device list plus each device's mutable
//! `available_memory` counter.

use crate::gpu::GpuSource;
use bitflags::bitflags;
use tracing::warn;

bitflags! {
    /// Device type bitset, mirrored from the OpenCL device type bitfield.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceType: u8 {
        const CPU         = 0b0001;
        const GPU         = 0b0010;
        const ACCELERATOR = 0b0100;
        const DEFAULT     = 0b1000;
    }
}

impl DeviceType {
    /// Space-separated human tokens, in bit order, for the device-stats report.
    pub fn tokens(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.contains(DeviceType::DEFAULT) {
            out.push("DEFAULT");
        }
        if self.contains(DeviceType::CPU) {
            out.push("CPU");
        }
        if self.contains(DeviceType::GPU) {
            out.push("GPU");
        }
        if self.contains(DeviceType::ACCELERATOR) {
            out.push("ACCELERATOR");
        }
        if out.is_empty() {
            out.push("UNKNOWN");
        }
        out
    }
}

/// Opaque device identifier from the GPU layer. Only equality is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// A single enumerated device plus its mutable memory counter.
#[derive(Debug, Clone)]
pub struct Device {
    pub handle: DeviceHandle,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub device_type: DeviceType,
    pub total_memory: u64,
    pub available_memory: u64,
}

/// The immutable device list, built once at construction.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Enumerate platforms from the GPU layer and build the registry. An
    /// empty enumeration is not an error: the registry is simply empty and
    /// every subsequent device-index argument fails `InvalidArgument`.
    pub fn build(gpu: &dyn GpuSource) -> Self {
        let infos = gpu.enumerate();
        if infos.is_empty() {
            warn!("no GPU platforms or devices enumerated; registry is empty");
        }

        let devices = infos
            .into_iter()
            .map(|info| Device {
                handle: info.handle,
                name: info.name,
                vendor: info.vendor,
                version: info.version,
                device_type: info.device_type,
                total_memory: info.total_memory,
                available_memory: info.total_memory,
            })
            .collect();

        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Device> {
        self.devices.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Device> {
        self.devices.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Device)> {
        self.devices.iter().enumerate()
    }
}
