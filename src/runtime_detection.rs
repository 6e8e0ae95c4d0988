//! Device catalog: the compute devices visible to this process plus the
//! native CPU pseudo-device.
//!
//! Compute devices are wgpu adapters. Their handles are resolved at
//! enumeration time and never persisted; a stored score is matched back to
//! a device through its [`DeviceKey`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    NativeCpu,
    ComputeDevice,
}

/// Identity used to match a stored score to an enumerated device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub kind: DeviceKind,
    pub name: String,
    pub driver_version: String,
}

impl DeviceKey {
    pub fn native() -> Self {
        Self {
            kind: DeviceKind::NativeCpu,
            name: String::new(),
            driver_version: String::new(),
        }
    }
}

#[derive(Clone)]
pub struct Device {
    kind: DeviceKind,
    name: String,
    driver_version: String,
    handle: Option<wgpu::Adapter>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("driver_version", &self.driver_version)
            .field("has_handle", &self.handle.is_some())
            .finish()
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Device {
    pub const NATIVE_NAME: &'static str = "native CPU";

    pub fn native() -> Self {
        Self {
            kind: DeviceKind::NativeCpu,
            name: Self::NATIVE_NAME.to_string(),
            driver_version: String::new(),
            handle: None,
        }
    }

    /// A compute device without an adapter handle. It can be scored and
    /// selected but not opened.
    pub fn compute(name: impl Into<String>, driver_version: impl Into<String>) -> Self {
        Self {
            kind: DeviceKind::ComputeDevice,
            name: name.into(),
            driver_version: driver_version.into(),
            handle: None,
        }
    }

    pub fn from_adapter(adapter: wgpu::Adapter) -> Self {
        let info = adapter.get_info();
        let name = format!("{} ({:?})", info.name.trim(), info.backend);
        let driver_version = format!("{} {}", info.driver, info.driver_info).trim().to_string();
        Self {
            kind: DeviceKind::ComputeDevice,
            name,
            driver_version,
            handle: Some(adapter),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn is_native(&self) -> bool {
        self.kind == DeviceKind::NativeCpu
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver_version(&self) -> &str {
        &self.driver_version
    }

    pub fn adapter(&self) -> Option<&wgpu::Adapter> {
        self.handle.as_ref()
    }

    /// Matching identity. The native device matches on kind alone.
    pub fn key(&self) -> DeviceKey {
        match self.kind {
            DeviceKind::NativeCpu => DeviceKey::native(),
            DeviceKind::ComputeDevice => DeviceKey {
                kind: self.kind,
                name: self.name.clone(),
                driver_version: self.driver_version.clone(),
            },
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.driver_version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} [{}]", self.name, self.driver_version)
        }
    }
}

/// Source of candidate devices.
pub trait DeviceCatalog: Send + Sync {
    /// Every candidate in catalog order. The native CPU entry is included
    /// exactly once.
    fn enumerate(&self) -> Vec<Device>;
}

/// Catalog of wgpu adapters, with the native CPU appended last.
#[derive(Debug, Clone)]
pub struct WgpuCatalog {
    backends: wgpu::Backends,
}

impl WgpuCatalog {
    pub fn new(backends: wgpu::Backends) -> Self {
        Self { backends }
    }
}

impl Default for WgpuCatalog {
    fn default() -> Self {
        Self::new(wgpu::Backends::PRIMARY)
    }
}

impl DeviceCatalog for WgpuCatalog {
    fn enumerate(&self) -> Vec<Device> {
        if self.backends.is_empty() {
            return vec![Device::native()];
        }
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: self.backends,
            ..Default::default()
        });
        let mut devices: Vec<Device> = instance
            .enumerate_adapters(self.backends)
            .into_iter()
            .map(Device::from_adapter)
            .collect();
        disambiguate_names(&mut devices);

        if devices.is_empty() {
            log::debug!("No wgpu adapters for {:?}; native CPU only", self.backends);
        }
        for device in &devices {
            log::debug!("Found compute device {}", device);
        }
        devices.push(Device::native());
        devices
    }
}

/// Fixed device list, for embedders that enumerate devices themselves.
#[derive(Debug, Clone)]
pub struct FixedCatalog {
    devices: Vec<Device>,
}

impl FixedCatalog {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }
}

impl DeviceCatalog for FixedCatalog {
    fn enumerate(&self) -> Vec<Device> {
        self.devices.clone()
    }
}

/// Identical adapters get a `#n` suffix so score records and kernel
/// binaries stay distinct per device.
fn disambiguate_names(devices: &mut [Device]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for device in devices.iter_mut() {
        let count = seen.entry(device.name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            device.name = format!("{} #{}", device.name, count);
        }
    }
}
