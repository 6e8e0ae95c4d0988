use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{AccelError, AccelResult};
use crate::runtime_detection::Device;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// An opened wgpu device with its queue.
pub struct GpuContext {
    name: String,
    instance: u64,
    info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    features: wgpu::Features,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("name", &self.name)
            .field("backend", &self.info.backend)
            .field("features", &self.features)
            .finish()
    }
}

impl GpuContext {
    /// Open the adapter behind a catalog device.
    pub fn open(device: &Device) -> AccelResult<Arc<Self>> {
        let adapter = device
            .adapter()
            .ok_or_else(|| AccelError::Wgpu(format!("{} has no adapter handle", device.name())))?;
        Self::from_adapter(adapter, device.name())
    }

    pub fn from_adapter(adapter: &wgpu::Adapter, name: &str) -> AccelResult<Arc<Self>> {
        let info = adapter.get_info();
        let unified_memory = matches!(
            info.device_type,
            wgpu::DeviceType::IntegratedGpu | wgpu::DeviceType::Cpu
        );
        let mut wanted = wgpu::Features::PIPELINE_CACHE;
        if unified_memory {
            wanted |= wgpu::Features::MAPPABLE_PRIMARY_BUFFERS;
        }
        let features = adapter.features() & wanted;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(name),
            required_features: features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))?;

        let label = name.to_string();
        device.on_uncaptured_error(Box::new(move |err| {
            log::error!("Uncaptured wgpu error on {}: {}", label, err);
        }));

        log::debug!("Opened {} ({:?}, features {:?})", name, info.backend, features);
        Ok(Arc::new(Self {
            name: name.to_string(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            info,
            device,
            queue,
            features,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distinguishes this `wgpu::Device` from other openings of the same
    /// adapter.
    pub fn instance_id(&self) -> u64 {
        self.instance
    }

    pub fn info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn supports_pipeline_cache(&self) -> bool {
        self.features.contains(wgpu::Features::PIPELINE_CACHE)
    }

    /// Storage buffers can also be mapped by the host.
    pub fn host_mappable(&self) -> bool {
        self.features.contains(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS)
    }

    /// Run `f` inside an error scope and return the first captured error.
    pub(crate) fn scoped<T>(&self, filter: wgpu::ErrorFilter, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(filter);
        let value = f();
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error)
    }

    /// Block until all submitted work has finished.
    pub fn wait_idle(&self) -> AccelResult<()> {
        self.device.poll(wgpu::PollType::Wait)?;
        Ok(())
    }
}
