//! GPU enumeration: the platform/device/context discovery step, run once at
//! startup to build the device registry.

use crate::device::{DeviceHandle, DeviceType};
use tracing::warn;

/// One enumerated device, as reported by [`GpuSource::enumerate`].
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    pub handle: DeviceHandle,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub device_type: DeviceType,
    pub total_memory: u64,
}

/// Source of GPU device information. Real implementation enumerates OpenCL
/// platforms and devices; tests inject a fixed list instead.
pub trait GpuSource: Send + Sync {
    fn enumerate(&self) -> Vec<GpuDeviceInfo>;
}

/// Enumerates devices by picking the first OpenCL platform and listing every
/// device of every type it reports. A context spanning all of them is
/// created transiently, purely to perform the documented discovery step and
/// surface a platform-level failure early; it is dropped immediately after
/// and the engine never issues another OpenCL call.
pub struct OpenClSource;

impl OpenClSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OpenClSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuSource for OpenClSource {
    fn enumerate(&self) -> Vec<GpuDeviceInfo> {
        use opencl3::context::Context;
        use opencl3::device::{Device as ClDevice, CL_DEVICE_TYPE_ALL};
        use opencl3::platform::get_platforms;

        let platforms = match get_platforms() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to query OpenCL platforms");
                return Vec::new();
            }
        };

        let Some(platform) = platforms.into_iter().next() else {
            warn!("no OpenCL platforms present on this host");
            return Vec::new();
        };

        let device_ids = match platform.get_devices(CL_DEVICE_TYPE_ALL) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to enumerate devices on first platform");
                return Vec::new();
            }
        };

        if device_ids.is_empty() {
            warn!("OpenCL platform reported zero devices");
            return Vec::new();
        }

        // Create a context spanning every device, solely to complete the
        // discovery step; it is not retained.
        if let Err(e) = Context::from_devices(&device_ids, &[], None, std::ptr::null_mut()) {
            warn!(error = %e, "failed to create OpenCL context over enumerated devices");
            return Vec::new();
        }

        device_ids
            .into_iter()
            .enumerate()
            .map(|(idx, id)| {
                let device = ClDevice::new(id);
                let name = device
                    .name()
                    .unwrap_or_else(|_| "Unknown".to_string());
                let vendor = device
                    .vendor()
                    .unwrap_or_else(|_| "Unknown".to_string());
                let version = device
                    .version()
                    .unwrap_or_else(|_| "Unknown".to_string());
                let total_memory = device.global_mem_size().unwrap_or(0);
                let device_type = device
                    .dev_type()
                    .map(cl_type_to_device_type)
                    .unwrap_or(DeviceType::DEFAULT);

                GpuDeviceInfo {
                    handle: DeviceHandle(idx as u64),
                    name,
                    vendor,
                    version,
                    device_type,
                    total_memory,
                }
            })
            .collect()
    }
}

fn cl_type_to_device_type(cl_type: opencl3::device::cl_device_type) -> DeviceType {
    use opencl3::device::{
        CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_DEFAULT,
        CL_DEVICE_TYPE_GPU,
    };

    let mut t = DeviceType::empty();
    if cl_type & CL_DEVICE_TYPE_CPU != 0 {
        t |= DeviceType::CPU;
    }
    if cl_type & CL_DEVICE_TYPE_GPU != 0 {
        t |= DeviceType::GPU;
    }
    if cl_type & CL_DEVICE_TYPE_ACCELERATOR != 0 {
        t |= DeviceType::ACCELERATOR;
    }
    if cl_type & CL_DEVICE_TYPE_DEFAULT != 0 {
        t |= DeviceType::DEFAULT;
    }
    t
}

/// Fixed-list fake source for tests.
pub struct FakeGpuSource {
    devices: Vec<GpuDeviceInfo>,
}

impl FakeGpuSource {
    pub fn new(devices: Vec<GpuDeviceInfo>) -> Self {
        Self { devices }
    }

    /// A single device named "Fake GPU 0" with `total_memory` bytes.
    pub fn single(total_memory: u64) -> Self {
        Self::new(vec![GpuDeviceInfo {
            handle: DeviceHandle(0),
            name: "Fake GPU 0".to_string(),
            vendor: "Testcorp".to_string(),
            version: "OpenCL 3.0".to_string(),
            device_type: DeviceType::GPU,
            total_memory,
        }])
    }

    /// `count` identical devices, each with `total_memory` bytes.
    pub fn many(count: usize, total_memory: u64) -> Self {
        Self::new(
            (0..count)
                .map(|i| GpuDeviceInfo {
                    handle: DeviceHandle(i as u64),
                    name: format!("Fake GPU {i}"),
                    vendor: "Testcorp".to_string(),
                    version: "OpenCL 3.0".to_string(),
                    device_type: DeviceType::GPU,
                    total_memory,
                })
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl GpuSource for FakeGpuSource {
    fn enumerate(&self) -> Vec<GpuDeviceInfo> {
        self.devices.clone()
    }
}
