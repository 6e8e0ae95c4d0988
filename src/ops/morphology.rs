//! Rectangle morphology expressed over a [`BufferChain`].
//!
//! Every function here is generic over the executor, so the GPU path and
//! the native fallback run the same sequence of stages.

use crate::error::{AccelError, AccelResult};
use crate::ops::variant::{BoundaryMode, MorphOp, MorphPlan};
use crate::pipeline::{BufferChain, HostCopy, KernelExecutor};
use crate::pix::Pix;

/// One step of a morphology sequence run on a single chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphStep {
    Dilate { h: u32, v: u32 },
    Erode { h: u32, v: u32 },
    Open { h: u32, v: u32 },
    Close { h: u32, v: u32 },
    Hollow { close_h: u32, close_v: u32, open_h: u32, open_v: u32 },
}

impl MorphStep {
    fn validate(&self) -> AccelResult<()> {
        let sizes = match *self {
            MorphStep::Dilate { h, v }
            | MorphStep::Erode { h, v }
            | MorphStep::Open { h, v }
            | MorphStep::Close { h, v } => [h, v, 1, 1],
            MorphStep::Hollow {
                close_h,
                close_v,
                open_h,
                open_v,
            } => [close_h, close_v, open_h, open_v],
        };
        if sizes.iter().any(|&s| s == 0) {
            return Err(AccelError::InvalidArgument(format!(
                "structuring element sizes must be positive: {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Brick sizes for line extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineParams {
    pub close_h: u32,
    pub close_v: u32,
    pub open_h: u32,
    pub open_v: u32,
    /// Height of the 1-wide element that keeps vertical lines.
    pub line_v: u32,
    /// Width of the 1-high element that keeps horizontal lines.
    pub line_h: u32,
    /// Also return the closed image.
    pub keep_closed: bool,
}

impl LineParams {
    /// Bricks scaled to the scan resolution: lines are at most dpi/20 thick
    /// and at least dpi/4 long.
    pub fn for_resolution(dpi: u32) -> Self {
        let max_line_width = (dpi / 20).max(1);
        let min_line_length = (dpi / 4).max(1);
        let closing_brick = (max_line_width / 3).max(1);
        Self {
            close_h: closing_brick,
            close_v: closing_brick,
            open_h: max_line_width,
            open_v: max_line_width,
            line_v: min_line_length,
            line_h: min_line_length,
            keep_closed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMasks {
    pub vertical: Pix,
    pub horizontal: Pix,
    pub closed: Option<Pix>,
}

fn run_plan<E: KernelExecutor>(chain: &mut BufferChain<'_, E>, plan: &MorphPlan) -> AccelResult<()> {
    for pass in plan.passes() {
        chain.apply(pass)?;
    }
    Ok(())
}

pub fn dilate_chain<E: KernelExecutor>(chain: &mut BufferChain<'_, E>, h: u32, v: u32, boundary: BoundaryMode) -> AccelResult<()> {
    run_plan(chain, &MorphPlan::select(MorphOp::Dilate, h, v, boundary))
}

pub fn erode_chain<E: KernelExecutor>(chain: &mut BufferChain<'_, E>, h: u32, v: u32, boundary: BoundaryMode) -> AccelResult<()> {
    run_plan(chain, &MorphPlan::select(MorphOp::Erode, h, v, boundary))
}

pub fn open_chain<E: KernelExecutor>(chain: &mut BufferChain<'_, E>, h: u32, v: u32, boundary: BoundaryMode) -> AccelResult<()> {
    erode_chain(chain, h, v, boundary)?;
    dilate_chain(chain, h, v, boundary)
}

pub fn close_chain<E: KernelExecutor>(chain: &mut BufferChain<'_, E>, h: u32, v: u32, boundary: BoundaryMode) -> AccelResult<()> {
    dilate_chain(chain, h, v, boundary)?;
    erode_chain(chain, h, v, boundary)
}

/// `close - open(close)`. Leaves the closed image in the spare buffer.
pub fn hollow_chain<E: KernelExecutor>(
    chain: &mut BufferChain<'_, E>,
    close_h: u32,
    close_v: u32,
    open_h: u32,
    open_v: u32,
    boundary: BoundaryMode,
) -> AccelResult<()> {
    close_chain(chain, close_h, close_v, boundary)?;
    chain.save_to_spare()?;
    open_chain(chain, open_h, open_v, boundary)?;
    chain.subtract_from_spare()
}

pub fn apply_step<E: KernelExecutor>(chain: &mut BufferChain<'_, E>, step: &MorphStep, boundary: BoundaryMode) -> AccelResult<()> {
    step.validate()?;
    match *step {
        MorphStep::Dilate { h, v } => dilate_chain(chain, h, v, boundary),
        MorphStep::Erode { h, v } => erode_chain(chain, h, v, boundary),
        MorphStep::Open { h, v } => open_chain(chain, h, v, boundary),
        MorphStep::Close { h, v } => close_chain(chain, h, v, boundary),
        MorphStep::Hollow {
            close_h,
            close_v,
            open_h,
            open_v,
        } => hollow_chain(chain, close_h, close_v, open_h, open_v, boundary),
    }
}

/// Run `steps` on one chain, reading the result back only when asked to.
pub fn run_steps<E: KernelExecutor>(
    exec: &E,
    pix: &Pix,
    steps: &[MorphStep],
    boundary: BoundaryMode,
    copy: HostCopy,
) -> AccelResult<Option<Pix>> {
    for step in steps {
        step.validate()?;
    }
    let mut chain = BufferChain::new(exec, pix)?;
    for step in steps {
        apply_step(&mut chain, step, boundary)?;
    }
    chain.finish(copy)
}

/// Single step with the result copied to the host.
pub fn run_step<E: KernelExecutor>(exec: &E, pix: &Pix, step: MorphStep, boundary: BoundaryMode) -> AccelResult<Pix> {
    step.validate()?;
    let mut chain = BufferChain::new(exec, pix)?;
    apply_step(&mut chain, &step, boundary)?;
    chain.into_pix()
}

pub fn subtract<E: KernelExecutor>(exec: &E, a: &Pix, b: &Pix) -> AccelResult<Pix> {
    let mut chain = BufferChain::new(exec, a)?;
    chain.load_spare(b)?;
    chain.subtract_spare()?;
    chain.into_pix()
}

pub fn subtract_in_place<E: KernelExecutor>(exec: &E, a: &mut Pix, b: &Pix) -> AccelResult<()> {
    let mut chain = BufferChain::new(exec, a)?;
    chain.load_spare(b)?;
    chain.subtract_spare_in_place()?;
    let result = chain.into_pix()?;
    a.words_mut().copy_from_slice(result.words());
    Ok(())
}

/// Vertical and horizontal line masks from the hollow of the closed image.
pub fn get_lines<E: KernelExecutor>(exec: &E, pix: &Pix, params: &LineParams, boundary: BoundaryMode) -> AccelResult<LineMasks> {
    MorphStep::Hollow {
        close_h: params.close_h,
        close_v: params.close_v,
        open_h: params.open_h,
        open_v: params.open_v,
    }
    .validate()?;
    if params.line_h == 0 || params.line_v == 0 {
        return Err(AccelError::InvalidArgument("line lengths must be positive".into()));
    }

    let mut chain = BufferChain::new(exec, pix)?;
    hollow_chain(
        &mut chain,
        params.close_h,
        params.close_v,
        params.open_h,
        params.open_v,
        boundary,
    )?;
    let closed = if params.keep_closed {
        Some(chain.read_spare()?)
    } else {
        None
    };

    // the spare now keeps the hollow image for the second line pass
    chain.save_to_spare()?;
    open_chain(&mut chain, 1, params.line_v, boundary)?;
    let vertical = chain.read_source()?;
    chain.restore_from_spare()?;
    open_chain(&mut chain, params.line_h, 1, boundary)?;
    let horizontal = chain.into_pix()?;

    Ok(LineMasks {
        vertical,
        horizontal,
        closed,
    })
}
