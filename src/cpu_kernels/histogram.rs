use rayon::prelude::*;

use crate::error::AccelResult;
use crate::ops::check_channels;
use crate::pix::{Pix, Rect};

pub const HISTOGRAM_BINS: usize = 256;

/// Single-pass per-channel histogram of `rect`, channel-major.
pub(crate) fn histogram_rect(pix: &Pix, channels: usize, rect: Rect) -> AccelResult<Vec<u32>> {
    check_channels("histogram", pix, channels)?;
    let bins = HISTOGRAM_BINS * channels;
    let Some(rect) = rect.clipped(pix.width(), pix.height()) else {
        return Ok(vec![0; bins]);
    };

    let hist = (rect.y..rect.y + rect.h)
        .into_par_iter()
        .fold(
            || vec![0u32; bins],
            |mut acc, y| {
                for x in rect.x..rect.x + rect.w {
                    for c in 0..channels {
                        acc[c * HISTOGRAM_BINS + pix.channel(x, y, c) as usize] += 1;
                    }
                }
                acc
            },
        )
        .reduce(
            || vec![0u32; bins],
            |mut a, b| {
                a.iter_mut().zip(&b).for_each(|(x, y)| *x += y);
                a
            },
        );
    Ok(hist)
}
