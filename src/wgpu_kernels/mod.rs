//! WGPU compute backend for the morphology pipeline.

pub mod context;
pub mod executor;
pub mod program;

pub use context::GpuContext;
pub use executor::{GpuBuffer, WgpuExecutor};
pub use program::{KernelEntry, KernelParams, MorphProgram, MORPH_KERNELS};
