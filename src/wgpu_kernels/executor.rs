//! [`KernelExecutor`] over a wgpu device.
//!
//! Every dispatch is submitted to the device queue as soon as it is
//! recorded; the queue keeps chain stages in order and only read-back
//! blocks.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::cpu_kernels::histogram::HISTOGRAM_BINS;
use crate::cpu_kernels::threshold::{clip_threshold_rect, validate_threshold_args};
use crate::error::{AccelError, AccelResult};
use crate::kernel_cache::ProgramCache;
use crate::ops::check_channels;
use crate::ops::variant::{Direction, MorphOp, MorphPass, PassKernel};
use crate::pipeline::{BufferAccess, Geometry, KernelExecutor};
use crate::pix::{Pix, Rect};
use crate::wgpu_kernels::context::GpuContext;
use crate::wgpu_kernels::program::{KernelEntry, KernelParams, MorphProgram, MORPH_KERNELS};

const WORKGROUP_2D: u32 = 16;
const WORKGROUP_1D: u32 = 256;
const MAX_HISTOGRAM_GROUPS: u32 = 64;

/// A device buffer of `u32` words.
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    words: usize,
    access: BufferAccess,
    host_mapped: bool,
}

impl GpuBuffer {
    pub fn words(&self) -> usize {
        self.words
    }

    pub fn access(&self) -> BufferAccess {
        self.access
    }

    /// The host can map this buffer without a staging copy.
    pub fn is_host_mapped(&self) -> bool {
        self.host_mapped
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

pub struct WgpuExecutor {
    ctx: Arc<GpuContext>,
    program: Arc<MorphProgram>,
}

impl WgpuExecutor {
    pub fn new(ctx: Arc<GpuContext>, program: Arc<MorphProgram>) -> Self {
        Self { ctx, program }
    }

    /// Executor for `ctx` with its program taken from (or built into) `cache`.
    pub fn with_cache(ctx: Arc<GpuContext>, cache: &ProgramCache<MorphProgram>) -> AccelResult<Self> {
        let program = cache.get_or_build(ctx.as_ref(), &MORPH_KERNELS)?;
        Ok(Self::new(ctx, program))
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    fn create_buffer(&self, label: &str, words: usize, usage: wgpu::BufferUsages) -> AccelResult<wgpu::Buffer> {
        let size = (words.max(1) * 4) as u64;
        let limits = self.ctx.device().limits();
        if size > limits.max_buffer_size || size > limits.max_storage_buffer_binding_size as u64 {
            return Err(AccelError::Allocation(format!(
                "{} bytes for {} exceeds the limits of {}",
                size,
                label,
                self.ctx.name()
            )));
        }
        let (buffer, error) = self.ctx.scoped(wgpu::ErrorFilter::OutOfMemory, || {
            self.ctx.device().create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        });
        match error {
            Some(err) => Err(AccelError::Allocation(format!("{} on {}: {}", label, self.ctx.name(), err))),
            None => Ok(buffer),
        }
    }

    fn storage_usage(&self, host_mapped: bool) -> (wgpu::BufferUsages, bool) {
        let usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
        if host_mapped && self.ctx.host_mappable() {
            (usage | wgpu::BufferUsages::MAP_READ, true)
        } else {
            (usage, false)
        }
    }

    fn upload_words(&self, label: &str, words: &[u32]) -> AccelResult<wgpu::Buffer> {
        let padded;
        let words = if words.is_empty() {
            padded = [0u32];
            &padded[..]
        } else {
            words
        };
        let (buffer, error) = self.ctx.scoped(wgpu::ErrorFilter::OutOfMemory, || {
            self.ctx.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(words),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            })
        });
        match error {
            Some(err) => Err(AccelError::Allocation(format!("{} on {}: {}", label, self.ctx.name(), err))),
            None => Ok(buffer),
        }
    }

    fn dispatch(
        &self,
        entry: KernelEntry,
        params: &KernelParams,
        src_a: &wgpu::Buffer,
        src_b: &wgpu::Buffer,
        dst: &wgpu::Buffer,
        groups: (u32, u32),
    ) -> AccelResult<()> {
        let device = self.ctx.device();
        let ((), error) = self.ctx.scoped(wgpu::ErrorFilter::Validation, || {
            let param_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("pixmorph params"),
                contents: bytemuck::bytes_of(params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(entry.entry_point()),
                layout: self.program.bind_group_layout(),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: param_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: src_a.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: src_b.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: dst.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(entry.entry_point()),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(entry.entry_point()),
                    timestamp_writes: None,
                });
                pass.set_pipeline(self.program.pipeline(entry));
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(groups.0.max(1), groups.1.max(1), 1);
            }
            self.ctx.queue().submit(Some(encoder.finish()));
        });
        match error {
            Some(err) => Err(AccelError::Wgpu(format!("{}: {}", entry.entry_point(), err))),
            None => Ok(()),
        }
    }

    fn linear_groups(&self, items: usize) -> (u32, u32) {
        let max = self.ctx.device().limits().max_compute_workgroups_per_dimension.max(1) as usize;
        let groups = items.div_ceil(WORKGROUP_1D as usize).max(1);
        let x = groups.min(max);
        (x as u32, groups.div_ceil(x) as u32)
    }

    fn read_words(&self, buffer: &wgpu::Buffer, words: usize) -> AccelResult<Vec<u32>> {
        if words == 0 {
            return Ok(Vec::new());
        }
        let slice = buffer.slice(0..(words * 4) as u64);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.ctx.wait_idle()?;
        match receiver.recv() {
            Ok(result) => result?,
            Err(_) => return Err(AccelError::Wgpu("map_async channel closed".into())),
        }
        let data = slice.get_mapped_range();
        let out = bytemuck::pod_collect_to_vec(&data[..]);
        drop(data);
        buffer.unmap();
        Ok(out)
    }

    fn read_back(&self, src: &wgpu::Buffer, words: usize) -> AccelResult<Vec<u32>> {
        if words == 0 {
            return Ok(Vec::new());
        }
        let staging = self.create_buffer(
            "pixmorph staging",
            words,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        )?;
        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pixmorph read back"),
            });
        encoder.copy_buffer_to_buffer(src, 0, &staging, 0, (words * 4) as u64);
        self.ctx.queue().submit(Some(encoder.finish()));
        self.read_words(&staging, words)
    }
}

fn pass_entry(pass: &MorphPass) -> KernelEntry {
    match (pass.direction, pass.kernel) {
        (Direction::Horizontal, PassKernel::Brick5) => KernelEntry::MorphHorBrick5,
        (Direction::Horizontal, PassKernel::Short) => KernelEntry::MorphHorShort,
        (Direction::Horizontal, PassKernel::Wide) => KernelEntry::MorphHorWide,
        (Direction::Vertical, PassKernel::Brick5) => KernelEntry::MorphVerBrick5,
        (Direction::Vertical, _) => KernelEntry::MorphVer,
    }
}

fn groups_2d(x: u32, y: u32) -> (u32, u32) {
    (x.div_ceil(WORKGROUP_2D), y.div_ceil(WORKGROUP_2D))
}

impl KernelExecutor for WgpuExecutor {
    type Buffer = GpuBuffer;

    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn upload(&self, pix: &Pix, access: BufferAccess) -> AccelResult<GpuBuffer> {
        let words = pix.words().len();
        let (usage, host_mapped) = self.storage_usage(true);
        if host_mapped {
            // host-visible memory: stage nothing, copy straight in
            let buffer = self.create_buffer("pixmorph source", words, usage)?;
            if words > 0 {
                self.ctx
                    .queue()
                    .write_buffer(&buffer, 0, bytemuck::cast_slice(pix.words()));
            }
            return Ok(GpuBuffer {
                buffer,
                words: words.max(1),
                access,
                host_mapped,
            });
        }
        let buffer = self.upload_words("pixmorph source", pix.words())?;
        Ok(GpuBuffer {
            buffer,
            words: words.max(1),
            access,
            host_mapped: false,
        })
    }

    fn allocate(&self, words: usize, access: BufferAccess, host_mapped: bool) -> AccelResult<GpuBuffer> {
        let (usage, host_mapped) = self.storage_usage(host_mapped);
        let buffer = self.create_buffer("pixmorph chain buffer", words, usage)?;
        Ok(GpuBuffer {
            buffer,
            words: words.max(1),
            access,
            host_mapped,
        })
    }

    fn write(&self, buffer: &mut GpuBuffer, pix: &Pix) -> AccelResult<()> {
        let words = pix.words();
        if words.len() > buffer.words {
            return Err(AccelError::GeometryMismatch(format!(
                "{} words into a {} word buffer",
                words.len(),
                buffer.words
            )));
        }
        if !words.is_empty() {
            self.ctx
                .queue()
                .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(words));
        }
        Ok(())
    }

    fn morph_pass(&self, pass: &MorphPass, geometry: &Geometry, src: &GpuBuffer, dst: &mut GpuBuffer) -> AccelResult<()> {
        if geometry.words() == 0 {
            return Ok(());
        }
        let params = KernelParams {
            width: geometry.width,
            height: geometry.height,
            wpl_in: geometry.wpl,
            wpl_out: geometry.wpl,
            reach_lo: pass.reach_lo,
            reach_hi: pass.reach_hi,
            fill: pass.fill(),
            op: match pass.op {
                MorphOp::Dilate => 0,
                MorphOp::Erode => 1,
            },
            ..Default::default()
        };
        self.dispatch(
            pass_entry(pass),
            &params,
            &src.buffer,
            &src.buffer,
            &dst.buffer,
            groups_2d(geometry.wpl, geometry.height),
        )
    }

    fn subtract(&self, geometry: &Geometry, a: &GpuBuffer, b: &GpuBuffer, dst: &mut GpuBuffer) -> AccelResult<()> {
        let words = geometry.words();
        if words == 0 {
            return Ok(());
        }
        let groups = self.linear_groups(words);
        let params = KernelParams {
            rect_w: words as u32,
            groups: groups.0,
            ..Default::default()
        };
        self.dispatch(KernelEntry::Subtract, &params, &a.buffer, &b.buffer, &dst.buffer, groups)
    }

    fn subtract_in_place(&self, geometry: &Geometry, a: &mut GpuBuffer, b: &GpuBuffer) -> AccelResult<()> {
        let words = geometry.words();
        if words == 0 {
            return Ok(());
        }
        let groups = self.linear_groups(words);
        let params = KernelParams {
            rect_w: words as u32,
            groups: groups.0,
            ..Default::default()
        };
        self.dispatch(KernelEntry::SubtractInPlace, &params, &b.buffer, &b.buffer, &a.buffer, groups)
    }

    fn copy(&self, geometry: &Geometry, src: &GpuBuffer, dst: &mut GpuBuffer) -> AccelResult<()> {
        let words = geometry.words();
        if words == 0 {
            return Ok(());
        }
        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pixmorph copy"),
            });
        encoder.copy_buffer_to_buffer(&src.buffer, 0, &dst.buffer, 0, (words * 4) as u64);
        self.ctx.queue().submit(Some(encoder.finish()));
        Ok(())
    }

    fn download(&self, geometry: &Geometry, buffer: &GpuBuffer) -> AccelResult<Vec<u32>> {
        let words = geometry.words();
        if buffer.host_mapped {
            self.read_words(&buffer.buffer, words)
        } else {
            self.read_back(&buffer.buffer, words)
        }
    }

    fn synchronize(&self) -> AccelResult<()> {
        self.ctx.wait_idle()
    }

    fn supports_channels(&self, depth: u32, channels: usize) -> bool {
        matches!((depth, channels), (8, 1) | (32, 4))
    }

    fn histogram_rect(&self, pix: &Pix, channels: usize, rect: Rect) -> AccelResult<Vec<u32>> {
        check_channels("histogram", pix, channels)?;
        let bins = HISTOGRAM_BINS * channels;
        let Some(rect) = rect.clipped(pix.width(), pix.height()) else {
            return Ok(vec![0; bins]);
        };

        let total = rect.w as usize * rect.h as usize;
        let groups = (total.div_ceil(WORKGROUP_1D as usize) as u32).clamp(1, MAX_HISTOGRAM_GROUPS);
        let params = KernelParams {
            width: pix.width(),
            height: pix.height(),
            wpl_in: pix.wpl(),
            rect_x: rect.x,
            rect_y: rect.y,
            rect_w: rect.w,
            rect_h: rect.h,
            channels: channels as u32,
            groups,
            depth: pix.depth(),
            ..Default::default()
        };

        let input = self.upload_words("pixmorph histogram input", pix.words())?;
        let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
        let partial = self.create_buffer("pixmorph histogram partial", bins * groups as usize, storage)?;
        let result = self.create_buffer("pixmorph histogram", bins, storage)?;

        self.dispatch(KernelEntry::HistogramPartial, &params, &input, &input, &partial, (groups, 1))?;
        self.dispatch(
            KernelEntry::HistogramReduce,
            &params,
            &partial,
            &partial,
            &result,
            (bins.div_ceil(WORKGROUP_1D as usize) as u32, 1),
        )?;
        self.read_back(&result, bins)
    }

    fn threshold_rect(&self, pix: &Pix, rect: Rect, thresholds: &[i32], hi_values: &[i32]) -> AccelResult<Pix> {
        validate_threshold_args(pix, thresholds, hi_values)?;
        let rect = clip_threshold_rect(pix, rect)?;
        let mut out = Pix::new(rect.w, rect.h, 1)?;

        let mut params = KernelParams {
            width: pix.width(),
            height: pix.height(),
            wpl_in: pix.wpl(),
            wpl_out: out.wpl(),
            rect_x: rect.x,
            rect_y: rect.y,
            rect_w: rect.w,
            rect_h: rect.h,
            channels: thresholds.len() as u32,
            depth: pix.depth(),
            hi_values: [-1; 4],
            ..Default::default()
        };
        params.thresholds[..thresholds.len()].copy_from_slice(thresholds);
        params.hi_values[..hi_values.len()].copy_from_slice(hi_values);

        let words = out.words().len();
        let input = self.upload_words("pixmorph threshold input", pix.words())?;
        let output = self.create_buffer(
            "pixmorph threshold output",
            words,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        )?;
        self.dispatch(
            KernelEntry::ThresholdToBitmap,
            &params,
            &input,
            &input,
            &output,
            groups_2d(out.wpl(), rect.h),
        )?;
        let bits = self.read_back(&output, words)?;
        out.words_mut().copy_from_slice(&bits);
        Ok(out)
    }

    fn compose_rgb(&self, abgr: &[u32], width: u32, height: u32) -> AccelResult<Pix> {
        let words = width as usize * height as usize;
        if abgr.len() != words {
            return Err(AccelError::GeometryMismatch(format!(
                "{} source words for a {}x{} image",
                abgr.len(),
                width,
                height
            )));
        }
        let mut out = Pix::new(width, height, 32)?;
        if words == 0 {
            return Ok(out);
        }
        let params = KernelParams {
            width,
            height,
            wpl_in: width,
            wpl_out: out.wpl(),
            ..Default::default()
        };
        let input = self.upload_words("pixmorph compose input", abgr)?;
        let output = self.create_buffer(
            "pixmorph compose output",
            words,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        )?;
        self.dispatch(
            KernelEntry::ComposeRgb,
            &params,
            &input,
            &input,
            &output,
            groups_2d(width, height),
        )?;
        let rgba = self.read_back(&output, words)?;
        out.words_mut().copy_from_slice(&rgba);
        Ok(out)
    }
}
