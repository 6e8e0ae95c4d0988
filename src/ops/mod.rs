//! Morphology operation library.

pub mod morphology;
pub mod variant;

pub use morphology::{LineMasks, LineParams, MorphStep};
pub use variant::{BoundaryMode, Direction, MorphOp, MorphPass, MorphPlan, PassKernel};

use crate::error::{AccelError, AccelResult};
use crate::pix::Pix;

/// Histogram and threshold inputs are 8 bpp gray or 32 bpp RGBA, reading
/// at most one channel per byte.
pub(crate) fn check_channels(op: &'static str, pix: &Pix, channels: usize) -> AccelResult<()> {
    if !matches!(pix.depth(), 8 | 32) {
        return Err(AccelError::UnsupportedDepth { op, depth: pix.depth() });
    }
    if channels == 0 || channels > pix.bytes_per_pixel() {
        return Err(AccelError::UnsupportedChannels {
            channels,
            depth: pix.depth(),
        });
    }
    Ok(())
}
