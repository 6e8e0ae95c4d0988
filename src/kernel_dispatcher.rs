//! Kernel dispatcher with runtime backend selection.
//!
//! The public morphology, histogram, threshold and compose entry points.
//! The first call selects a device through the [`BackendContext`]; after
//! that every call runs on the selected wgpu device, or on the native
//! executor when the native CPU won or the device could not be opened.
//! Histogram and threshold inputs the GPU kernels do not cover always run
//! natively.

use std::sync::{Arc, OnceLock};

use crate::backend_selector::BackendContext;
use crate::config::AccelConfig;
use crate::cpu_kernels::NativeExecutor;
use crate::error::AccelResult;
use crate::kernel_cache::ProgramCache;
use crate::ops::check_channels;
use crate::ops::morphology::{self, LineMasks, LineParams, MorphStep};
use crate::ops::variant::BoundaryMode;
use crate::pipeline::{HostCopy, KernelExecutor};
use crate::pix::{Pix, Rect};
use crate::wgpu_kernels::{GpuContext, MorphProgram, WgpuExecutor};

/// Global dispatcher (lazy initialized)
static DISPATCHER: OnceLock<KernelDispatcher> = OnceLock::new();

/// Run `$body` with `$exec` bound to the active executor.
macro_rules! with_executor {
    ($self:ident, $exec:ident => $body:expr) => {
        match $self.gpu_executor()? {
            Some(gpu) => {
                let $exec = &gpu;
                $body
            }
            None => {
                let $exec = &$self.native;
                $body
            }
        }
    };
}

pub struct KernelDispatcher {
    backend: BackendContext,
    programs: ProgramCache<MorphProgram>,
    gpu: OnceLock<Option<Arc<GpuContext>>>,
    native: NativeExecutor,
}

impl KernelDispatcher {
    pub fn new(config: AccelConfig) -> Self {
        Self::with_backend(BackendContext::new(config))
    }

    pub fn with_backend(backend: BackendContext) -> Self {
        let programs = ProgramCache::new(backend.config().kernel_dir());
        Self {
            backend,
            programs,
            gpu: OnceLock::new(),
            native: NativeExecutor::new(),
        }
    }

    /// Process-wide dispatcher configured from the environment.
    pub fn global() -> &'static KernelDispatcher {
        DISPATCHER.get_or_init(|| KernelDispatcher::new(AccelConfig::from_env()))
    }

    pub fn backend(&self) -> &BackendContext {
        &self.backend
    }

    pub fn program_cache(&self) -> &ProgramCache<MorphProgram> {
        &self.programs
    }

    pub fn boundary(&self) -> BoundaryMode {
        self.backend.config().boundary
    }

    /// Opened context of the selected compute device, `None` when the
    /// native CPU runs everything.
    pub fn gpu_context(&self) -> AccelResult<Option<&Arc<GpuContext>>> {
        let selection = self.backend.ensure_selected()?;
        let ctx = self.gpu.get_or_init(|| {
            let device = selection.device();
            if device.is_native() {
                return None;
            }
            match GpuContext::open(device) {
                Ok(ctx) => Some(ctx),
                Err(e) => {
                    log::warn!("Failed to open {}, falling back to native CPU: {}", device.name(), e);
                    None
                }
            }
        });
        Ok(ctx.as_ref())
    }

    /// Executor for the selected compute device. A program build failure
    /// is returned to the caller and retried on the next call.
    fn gpu_executor(&self) -> AccelResult<Option<WgpuExecutor>> {
        match self.gpu_context()? {
            Some(ctx) => WgpuExecutor::with_cache(Arc::clone(ctx), &self.programs).map(Some),
            None => Ok(None),
        }
    }

    /// Name of the executor operations run on.
    pub fn active_backend(&self) -> AccelResult<String> {
        Ok(match self.gpu_context()? {
            Some(ctx) => ctx.name().to_string(),
            None => self.native.name().to_string(),
        })
    }

    /// Result is always copied to the host; use [`Self::run_sequence`] to
    /// keep it on the device.
    pub fn dilate(&self, pix: &Pix, h: u32, v: u32) -> AccelResult<Pix> {
        self.run_step(pix, MorphStep::Dilate { h, v })
    }

    /// Copies the result to the host. See [`Self::run_sequence`].
    pub fn erode(&self, pix: &Pix, h: u32, v: u32) -> AccelResult<Pix> {
        self.run_step(pix, MorphStep::Erode { h, v })
    }

    /// Copies the result to the host. See [`Self::run_sequence`].
    pub fn open(&self, pix: &Pix, h: u32, v: u32) -> AccelResult<Pix> {
        self.run_step(pix, MorphStep::Open { h, v })
    }

    /// Copies the result to the host. See [`Self::run_sequence`].
    pub fn close(&self, pix: &Pix, h: u32, v: u32) -> AccelResult<Pix> {
        self.run_step(pix, MorphStep::Close { h, v })
    }

    /// `close(pix) - open(close(pix))`, copied to the host. A chain that
    /// leaves it on the device goes through [`Self::run_sequence`].
    pub fn hollow(&self, pix: &Pix, close_h: u32, close_v: u32, open_h: u32, open_v: u32) -> AccelResult<Pix> {
        self.run_step(
            pix,
            MorphStep::Hollow {
                close_h,
                close_v,
                open_h,
                open_v,
            },
        )
    }

    fn run_step(&self, pix: &Pix, step: MorphStep) -> AccelResult<Pix> {
        let boundary = self.boundary();
        with_executor!(self, exec => morphology::run_step(exec, pix, step, boundary))
    }

    /// Run `steps` on one buffer chain. With [`HostCopy::No`] the result
    /// stays on the device and is released when the chain ends.
    pub fn run_sequence(&self, pix: &Pix, steps: &[MorphStep], copy: HostCopy) -> AccelResult<Option<Pix>> {
        let boundary = self.boundary();
        with_executor!(self, exec => morphology::run_steps(exec, pix, steps, boundary, copy))
    }

    /// `a & !b`.
    pub fn subtract(&self, a: &Pix, b: &Pix) -> AccelResult<Pix> {
        with_executor!(self, exec => morphology::subtract(exec, a, b))
    }

    /// `a &= !b`.
    pub fn subtract_in_place(&self, a: &mut Pix, b: &Pix) -> AccelResult<()> {
        with_executor!(self, exec => morphology::subtract_in_place(exec, a, b))
    }

    /// Both masks (and the closed image when asked for) are always read
    /// back to the host.
    pub fn get_lines(&self, pix: &Pix, params: &LineParams) -> AccelResult<LineMasks> {
        let boundary = self.boundary();
        with_executor!(self, exec => morphology::get_lines(exec, pix, params, boundary))
    }

    /// Per-channel histogram of `rect`, `256 * channels` bins, channel-major.
    pub fn histogram_rect(&self, pix: &Pix, channels: usize, rect: Rect) -> AccelResult<Vec<u32>> {
        check_channels("histogram", pix, channels)?;
        if let Some(gpu) = self.gpu_executor()? {
            if gpu.supports_channels(pix.depth(), channels) {
                return gpu.histogram_rect(pix, channels, rect);
            }
            log::debug!(
                "No GPU histogram for {} channels at {} bpp; using native",
                channels,
                pix.depth()
            );
        }
        self.native.histogram_rect(pix, channels, rect)
    }

    /// 1 bpp foreground mask of `rect`, one threshold and polarity per
    /// channel.
    pub fn threshold_rect_to_pix(&self, pix: &Pix, rect: Rect, thresholds: &[i32], hi_values: &[i32]) -> AccelResult<Pix> {
        if let Some(gpu) = self.gpu_executor()? {
            if gpu.supports_channels(pix.depth(), thresholds.len()) {
                return gpu.threshold_rect(pix, rect, thresholds, hi_values);
            }
            log::debug!(
                "No GPU threshold for {} channels at {} bpp; using native",
                thresholds.len(),
                pix.depth()
            );
        }
        self.native.threshold_rect(pix, rect, thresholds, hi_values)
    }

    /// [`threshold_rect_to_pix`](Self::threshold_rect_to_pix) over the
    /// whole image.
    pub fn threshold_to_pix(&self, pix: &Pix, thresholds: &[i32], hi_values: &[i32]) -> AccelResult<Pix> {
        self.threshold_rect_to_pix(pix, Rect::full(pix), thresholds, hi_values)
    }

    /// TIFF-order ABGR words to a 32 bpp RGBA image.
    pub fn compose_rgb(&self, abgr: &[u32], width: u32, height: u32) -> AccelResult<Pix> {
        with_executor!(self, exec => exec.compose_rgb(abgr, width, height))
    }
}
