//! Kernel variant selection for separable rectangle morphology.
//!
//! A `(h, v)` brick is split into a horizontal and a vertical pass. Which
//! kernel runs each pass is decided once per call by [`MorphPlan::select`].

/// Largest per-side reach that the three-word horizontal kernel covers.
pub const SHORT_REACH_MAX: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MorphOp {
    Dilate,
    Erode,
}

/// Treatment of pixels outside the image.
///
/// Only `Symmetric` keeps opening and closing idempotent for foreground
/// that touches the border, so it is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoundaryMode {
    /// Outside pixels are background for both dilation and erosion.
    Asymmetric,
    /// Outside pixels are background for dilation, foreground for erosion.
    #[default]
    Symmetric,
}

impl BoundaryMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asymmetric" | "asym" => Some(BoundaryMode::Asymmetric),
            "symmetric" | "sym" => Some(BoundaryMode::Symmetric),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKernel {
    /// Unrolled reach of 2 on both sides, used only for the 5x5 brick.
    Brick5,
    /// Every source bit lies in the neighbouring three words.
    Short,
    /// Reach beyond one word; walks word boundaries explicitly.
    Wide,
}

/// One 1-D pass: `out(p) = op over d in [-reach_lo, reach_hi] of in(p + d)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MorphPass {
    pub op: MorphOp,
    pub direction: Direction,
    pub kernel: PassKernel,
    pub reach_lo: u32,
    pub reach_hi: u32,
    pub boundary: BoundaryMode,
}

impl MorphPass {
    /// Word value substituted for pixels outside the image.
    #[inline]
    pub fn fill(&self) -> u32 {
        match (self.op, self.boundary) {
            (MorphOp::Erode, BoundaryMode::Symmetric) => u32::MAX,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphPlan {
    pub horizontal: Option<MorphPass>,
    pub vertical: Option<MorphPass>,
}

/// Offsets covered by a brick of `size` with origin at `size / 2`.
///
/// Erosion reads the element as placed; dilation reads its reflection, so
/// even sizes lean the other way.
#[inline]
pub fn reach(op: MorphOp, size: u32) -> (u32, u32) {
    let origin = size / 2;
    let far = size.saturating_sub(1) - origin;
    match op {
        MorphOp::Erode => (origin, far),
        MorphOp::Dilate => (far, origin),
    }
}

impl MorphPlan {
    pub fn select(op: MorphOp, h: u32, v: u32, boundary: BoundaryMode) -> Self {
        let brick5 = h == 5 && v == 5;
        let pass = |direction: Direction, size: u32| {
            if size <= 1 {
                return None;
            }
            let (reach_lo, reach_hi) = reach(op, size);
            let kernel = if brick5 {
                PassKernel::Brick5
            } else if direction == Direction::Horizontal && reach_lo.max(reach_hi) > SHORT_REACH_MAX {
                PassKernel::Wide
            } else {
                PassKernel::Short
            };
            Some(MorphPass {
                op,
                direction,
                kernel,
                reach_lo,
                reach_hi,
                boundary,
            })
        };
        Self {
            horizontal: pass(Direction::Horizontal, h),
            vertical: pass(Direction::Vertical, v),
        }
    }

    pub fn passes(&self) -> impl Iterator<Item = &MorphPass> {
        self.horizontal.iter().chain(self.vertical.iter())
    }

    pub fn is_identity(&self) -> bool {
        self.horizontal.is_none() && self.vertical.is_none()
    }
}
