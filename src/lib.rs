//! pixmorph-kernels: benchmark-driven backend selection and binary
//! morphology for document image preprocessing.
//!
//! This crate provides:
//! - **Runtime Backend Selection**: every wgpu adapter and the native CPU
//!   are benchmarked once; the scores persist in a versioned file and the
//!   cheapest device runs everything afterwards
//! - **Program Cache**: compiled pipelines are memoized per device and
//!   their pipeline-cache blobs are kept on disk
//! - **Buffer Chains**: multi-stage morphology stays on the device, with
//!   buffer roles swapped instead of copied
//! - **Native Fallback**: a rayon implementation of every kernel that is
//!   both the benchmark baseline and the reference result
//!
//! # Quick Start
//!
//! ```ignore
//! use pixmorph_kernels::{KernelDispatcher, LineParams};
//!
//! let dispatcher = KernelDispatcher::global(); // selects a device on first use
//! let closed = dispatcher.close(&binary, 3, 3)?;
//! let lines = dispatcher.get_lines(&binary, &LineParams::for_resolution(300))?;
//! ```

pub mod config;
pub mod error;
pub mod pix;

pub mod ops;
pub mod pipeline;

// Native reference kernels
pub mod cpu_kernels;
// WGPU kernels (cross-platform)
pub mod wgpu_kernels;

// Device catalog, scoring and selection
pub mod runtime_detection;
pub mod profile;
pub mod scoring;
pub mod backend_selector;
pub mod kernel_cache;

pub mod kernel_dispatcher;

pub use config::AccelConfig;
pub use error::{AccelError, AccelResult};
pub use pix::{Colormap, Pix, Rect};

pub use runtime_detection::{Device, DeviceCatalog, DeviceKey, DeviceKind, FixedCatalog, WgpuCatalog};
pub use profile::{DeviceScore, Profile, ProfileEntry};
pub use scoring::{BatteryRunner, DeviceBenchmark, ScoreStore, Workload, WorkloadKind, DEFAULT_BATTERY};
pub use backend_selector::{choose_device, BackendContext, Selection};
pub use kernel_cache::{KernelSource, ProgramCache, ProgramTarget};

pub use pipeline::{BufferAccess, BufferChain, HostCopy, KernelExecutor};
pub use cpu_kernels::NativeExecutor;
pub use wgpu_kernels::{GpuContext, WgpuExecutor};

pub use ops::{BoundaryMode, LineMasks, LineParams, MorphOp, MorphPlan, MorphStep};

pub use kernel_dispatcher::KernelDispatcher;
