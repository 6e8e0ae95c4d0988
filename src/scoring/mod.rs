//! Device benchmark runner.
//!
//! Every device runs the same battery of workloads on the same synthetic
//! page. The cost of a device is the weighted sum of the workload times;
//! a workload that fails makes the whole cost infinite so the device is
//! ranked last instead of aborting selection.
//!
//! ```text
//! synthetic  -- fixed-seed benchmark page
//! measure    -- wall-clock timing
//! cache      -- score store file
//! ```

pub mod cache;
pub mod measure;
pub mod synthetic;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

pub use cache::ScoreStore;
pub use measure::MeasureConfig;
pub use synthetic::SyntheticInput;

use crate::config::AccelConfig;
use crate::cpu_kernels::NativeExecutor;
use crate::error::AccelResult;
use crate::kernel_cache::ProgramCache;
use crate::ops::morphology::{get_lines, LineParams};
use crate::ops::variant::BoundaryMode;
use crate::pipeline::KernelExecutor;
use crate::pix::Rect;
use crate::runtime_detection::{Device, DeviceKey};
use crate::wgpu_kernels::{GpuContext, MorphProgram, WgpuExecutor};

/// Produces the time cost of one device.
pub trait DeviceBenchmark: Send + Sync {
    /// Lower is better. `f64::INFINITY` marks a device that cannot run the
    /// workloads.
    fn run(&self, device: &Device) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    /// ABGR to RGBA conversion of the page.
    Compose,
    /// Four channel histogram of the whole page.
    Histogram,
    /// Four channel threshold of the whole page to a bitmap.
    Threshold,
    /// Line mask extraction from the binary page.
    LineMasks,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Workload {
    pub name: &'static str,
    pub kind: WorkloadKind,
    pub weight: f64,
}

pub const DEFAULT_BATTERY: [Workload; 4] = [
    Workload {
        name: "compose_rgb",
        kind: WorkloadKind::Compose,
        weight: 1.2,
    },
    Workload {
        name: "histogram_rect",
        kind: WorkloadKind::Histogram,
        weight: 2.4,
    },
    Workload {
        name: "threshold_rect",
        kind: WorkloadKind::Threshold,
        weight: 4.5,
    },
    Workload {
        name: "line_masks",
        kind: WorkloadKind::LineMasks,
        weight: 5.0,
    },
];

const THRESHOLDS: [i32; 4] = [128; 4];
const HI_VALUES: [i32; 4] = [1, 1, 1, -1];
const LINE_DPI: u32 = 300;

/// Per-workload outcome of one device run.
#[derive(Debug, Clone)]
pub struct BatteryReport {
    pub device: String,
    /// Seconds per workload, `None` where the workload failed.
    pub timings: Vec<(&'static str, Option<f64>)>,
    pub time_cost: f64,
}

/// The default [`DeviceBenchmark`]: runs a workload battery on the native
/// executor or on a freshly opened wgpu device.
pub struct BatteryRunner {
    battery: Vec<Workload>,
    measure: MeasureConfig,
    width: u32,
    height: u32,
    seed: u64,
    boundary: BoundaryMode,
    programs: ProgramCache<MorphProgram>,
    contexts: Mutex<HashMap<DeviceKey, Arc<GpuContext>>>,
    input: OnceLock<SyntheticInput>,
}

impl BatteryRunner {
    pub fn new(config: &AccelConfig) -> Self {
        Self {
            battery: DEFAULT_BATTERY.to_vec(),
            measure: MeasureConfig::default(),
            width: config.benchmark_width,
            height: config.benchmark_height,
            seed: config.benchmark_seed,
            boundary: config.boundary,
            programs: ProgramCache::new(config.kernel_dir()),
            contexts: Mutex::new(HashMap::new()),
            input: OnceLock::new(),
        }
    }

    pub fn with_battery(mut self, battery: Vec<Workload>) -> Self {
        self.battery = battery;
        self
    }

    pub fn with_measure(mut self, measure: MeasureConfig) -> Self {
        self.measure = measure;
        self
    }

    pub fn battery(&self) -> &[Workload] {
        &self.battery
    }

    fn input(&self) -> AccelResult<&SyntheticInput> {
        if let Some(input) = self.input.get() {
            return Ok(input);
        }
        let input = SyntheticInput::generate(self.width, self.height, self.seed)?;
        Ok(self.input.get_or_init(|| input))
    }

    /// Context for `device`, opened once per runner so repeated runs share
    /// one `wgpu::Device` and its memoized programs.
    fn context(&self, device: &Device) -> AccelResult<Arc<GpuContext>> {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ctx) = contexts.get(&device.key()) {
            return Ok(Arc::clone(ctx));
        }
        let ctx = GpuContext::open(device)?;
        contexts.insert(device.key(), Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Run the battery on `device` and keep the per-workload timings.
    pub fn run_detailed(&self, device: &Device) -> BatteryReport {
        let failed = |reason: String| {
            log::warn!("Benchmark of {} failed: {}", device.name(), reason);
            BatteryReport {
                device: device.name().to_string(),
                timings: self.battery.iter().map(|w| (w.name, None)).collect(),
                time_cost: f64::INFINITY,
            }
        };

        let input = match self.input() {
            Ok(input) => input,
            Err(e) => return failed(e.to_string()),
        };
        if device.is_native() {
            return self.run_battery(device, &NativeExecutor::new(), input);
        }

        let exec = match self.context(device).and_then(|ctx| WgpuExecutor::with_cache(ctx, &self.programs)) {
            Ok(exec) => exec,
            Err(e) => return failed(e.to_string()),
        };
        self.run_battery(device, &exec, input)
    }

    fn run_battery<E: KernelExecutor>(&self, device: &Device, exec: &E, input: &SyntheticInput) -> BatteryReport {
        let mut timings = Vec::with_capacity(self.battery.len());
        let mut time_cost = 0.0;
        for workload in &self.battery {
            match measure::measure(&self.measure, || self.run_workload(exec, workload.kind, input)) {
                Ok(secs) => {
                    log::debug!("{} on {}: {:.3} ms", workload.name, device.name(), secs * 1e3);
                    timings.push((workload.name, Some(secs)));
                    time_cost += workload.weight * secs;
                }
                Err(e) => {
                    log::warn!("Workload {} failed on {}: {}", workload.name, device.name(), e);
                    timings.push((workload.name, None));
                    time_cost = f64::INFINITY;
                }
            }
        }
        log::info!("Benchmarked {}: time cost {:.6}", device.name(), time_cost);
        BatteryReport {
            device: device.name().to_string(),
            timings,
            time_cost,
        }
    }

    fn run_workload<E: KernelExecutor>(&self, exec: &E, kind: WorkloadKind, input: &SyntheticInput) -> AccelResult<()> {
        match kind {
            WorkloadKind::Compose => {
                exec.compose_rgb(&input.abgr, input.width, input.height)?;
            }
            WorkloadKind::Histogram => {
                exec.histogram_rect(&input.rgba, 4, Rect::full(&input.rgba))?;
            }
            WorkloadKind::Threshold => {
                exec.threshold_rect(&input.rgba, Rect::full(&input.rgba), &THRESHOLDS, &HI_VALUES)?;
            }
            WorkloadKind::LineMasks => {
                get_lines(exec, &input.binary, &LineParams::for_resolution(LINE_DPI), self.boundary)?;
            }
        }
        exec.synchronize()
    }
}

impl DeviceBenchmark for BatteryRunner {
    fn run(&self, device: &Device) -> f64 {
        self.run_detailed(device).time_cost
    }
}
