use rayon::prelude::*;

use crate::error::{AccelError, AccelResult};
use crate::ops::check_channels;
use crate::pix::{Pix, Rect};

/// Foreground decision for one pixel.
///
/// A channel with a negative `hi_value` is ignored. Any other channel marks
/// the pixel as foreground when `(value > threshold) == (hi_value == 0)`.
#[inline]
pub fn is_foreground(values: impl Fn(usize) -> i32, thresholds: &[i32], hi_values: &[i32]) -> bool {
    thresholds
        .iter()
        .zip(hi_values)
        .enumerate()
        .any(|(c, (&threshold, &hi))| hi >= 0 && (values(c) > threshold) == (hi == 0))
}

pub(crate) fn validate_threshold_args(pix: &Pix, thresholds: &[i32], hi_values: &[i32]) -> AccelResult<()> {
    if thresholds.len() != hi_values.len() {
        return Err(AccelError::InvalidArgument(format!(
            "{} thresholds but {} hi values",
            thresholds.len(),
            hi_values.len()
        )));
    }
    check_channels("threshold", pix, thresholds.len())
}

pub(crate) fn clip_threshold_rect(pix: &Pix, rect: Rect) -> AccelResult<Rect> {
    rect.clipped(pix.width(), pix.height()).ok_or_else(|| {
        AccelError::InvalidArgument(format!(
            "rect {:?} misses the {}x{} image",
            rect,
            pix.width(),
            pix.height()
        ))
    })
}

/// Pack the foreground decision of every pixel in `rect` into a 1 bpp
/// image of the rect's size.
pub(crate) fn threshold_rect(pix: &Pix, rect: Rect, thresholds: &[i32], hi_values: &[i32]) -> AccelResult<Pix> {
    validate_threshold_args(pix, thresholds, hi_values)?;
    let rect = clip_threshold_rect(pix, rect)?;
    let mut out = Pix::new(rect.w, rect.h, 1)?;
    let wpl = out.wpl() as usize;

    out.words_mut().par_chunks_mut(wpl).enumerate().for_each(|(y, row)| {
        let py = rect.y + y as u32;
        for x in 0..rect.w {
            let px = rect.x + x;
            if is_foreground(|c| pix.channel(px, py, c) as i32, thresholds, hi_values) {
                row[(x / 32) as usize] |= 0x8000_0000 >> (x % 32);
            }
        }
    });
    Ok(out)
}
