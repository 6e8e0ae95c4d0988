//! The morphology shader module and its compute pipelines.
//!
//! The compiled form that survives a restart is a `wgpu::PipelineCache`
//! blob. Adapters without `PIPELINE_CACHE` compile from WGSL every time.

use crate::error::{AccelError, AccelResult};
use crate::kernel_cache::{KernelSource, ProgramTarget};
use crate::wgpu_kernels::context::GpuContext;

pub const MORPH_KERNELS: KernelSource = KernelSource {
    stem: "morphology",
    text: include_str!("kernels/morphology.wgsl"),
};

/// Uniform block shared by every entry point of `morphology.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelParams {
    pub width: u32,
    pub height: u32,
    pub wpl_in: u32,
    pub wpl_out: u32,
    pub reach_lo: u32,
    pub reach_hi: u32,
    pub fill: u32,
    pub op: u32,
    pub rect_x: u32,
    pub rect_y: u32,
    pub rect_w: u32,
    pub rect_h: u32,
    pub channels: u32,
    pub groups: u32,
    pub depth: u32,
    pub _pad0: u32,
    pub thresholds: [i32; 4],
    pub hi_values: [i32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelEntry {
    MorphHorShort,
    MorphHorWide,
    MorphHorBrick5,
    MorphVer,
    MorphVerBrick5,
    Subtract,
    SubtractInPlace,
    HistogramPartial,
    HistogramReduce,
    ThresholdToBitmap,
    ComposeRgb,
}

impl KernelEntry {
    pub const ALL: [KernelEntry; 11] = [
        KernelEntry::MorphHorShort,
        KernelEntry::MorphHorWide,
        KernelEntry::MorphHorBrick5,
        KernelEntry::MorphVer,
        KernelEntry::MorphVerBrick5,
        KernelEntry::Subtract,
        KernelEntry::SubtractInPlace,
        KernelEntry::HistogramPartial,
        KernelEntry::HistogramReduce,
        KernelEntry::ThresholdToBitmap,
        KernelEntry::ComposeRgb,
    ];

    pub fn entry_point(self) -> &'static str {
        match self {
            KernelEntry::MorphHorShort => "morph_hor_short",
            KernelEntry::MorphHorWide => "morph_hor_wide",
            KernelEntry::MorphHorBrick5 => "morph_hor_brick5",
            KernelEntry::MorphVer => "morph_ver",
            KernelEntry::MorphVerBrick5 => "morph_ver_brick5",
            KernelEntry::Subtract => "subtract",
            KernelEntry::SubtractInPlace => "subtract_inplace",
            KernelEntry::HistogramPartial => "histogram_partial",
            KernelEntry::HistogramReduce => "histogram_reduce",
            KernelEntry::ThresholdToBitmap => "threshold_to_bitmap",
            KernelEntry::ComposeRgb => "compose_rgb",
        }
    }
}

pub struct MorphProgram {
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Vec<wgpu::ComputePipeline>,
    cache: Option<wgpu::PipelineCache>,
}

impl MorphProgram {
    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn pipeline(&self, entry: KernelEntry) -> &wgpu::ComputePipeline {
        &self.pipelines[entry as usize]
    }
}

fn buffer_layout_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn build_program(ctx: &GpuContext, source: &KernelSource, binary: Option<&[u8]>) -> AccelResult<MorphProgram> {
    if binary.is_some() && !ctx.supports_pipeline_cache() {
        return Err(AccelError::kernel_build(
            source.stem,
            ctx.name(),
            "adapter cannot load pipeline cache data",
        ));
    }
    let device = ctx.device();

    let (program, error) = ctx.scoped(wgpu::ErrorFilter::Validation, || {
        let cache = ctx.supports_pipeline_cache().then(|| {
            // SAFETY: `binary` only ever comes from `PipelineCache::get_data`
            // written for this device name; wgpu checks the header against
            // the adapter and reports a mismatch inside this error scope.
            unsafe {
                device.create_pipeline_cache(&wgpu::PipelineCacheDescriptor {
                    label: Some(source.stem),
                    data: binary,
                    fallback: binary.is_none(),
                })
            }
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(source.stem),
            source: wgpu::ShaderSource::Wgsl(source.text.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pixmorph bind group layout"),
            entries: &[
                buffer_layout_entry(0, wgpu::BufferBindingType::Uniform),
                buffer_layout_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_layout_entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_layout_entry(3, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pixmorph pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = KernelEntry::ALL
            .iter()
            .map(|entry| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry.entry_point()),
                    layout: Some(&layout),
                    module: &module,
                    entry_point: Some(entry.entry_point()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: cache.as_ref(),
                })
            })
            .collect();

        MorphProgram {
            bind_group_layout,
            pipelines,
            cache,
        }
    });

    match error {
        Some(err) => Err(AccelError::kernel_build(source.stem, ctx.name(), err.to_string())),
        None => Ok(program),
    }
}

impl ProgramTarget for GpuContext {
    type Program = MorphProgram;

    fn device_name(&self) -> &str {
        self.name()
    }

    fn instance_id(&self) -> u64 {
        GpuContext::instance_id(self)
    }

    fn build_from_binary(&self, source: &KernelSource, binary: &[u8]) -> AccelResult<MorphProgram> {
        build_program(self, source, Some(binary))
    }

    fn build_from_source(&self, source: &KernelSource) -> AccelResult<MorphProgram> {
        build_program(self, source, None)
    }

    fn binary_of(&self, program: &MorphProgram) -> Option<Vec<u8>> {
        program.cache.as_ref()?.get_data()
    }
}
