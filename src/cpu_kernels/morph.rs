//! Packed-word rectangle morphology on the host.
//!
//! Both passes compute `out(p) = op over d in [-reach_lo, reach_hi] of
//! in(p + d)` on whole 32-bit words. Source bits past the row width and
//! pixels outside the image read as the pass's fill word; output padding
//! bits are cleared.

use rayon::prelude::*;

use crate::ops::variant::{Direction, MorphOp, MorphPass, PassKernel};
use crate::pipeline::Geometry;
use crate::pix::{last_word_mask, words_per_line};

#[derive(Clone, Copy)]
struct RowContext {
    valid: usize,
    mask: u32,
    fill: u32,
}

impl RowContext {
    fn new(pass: &MorphPass, geometry: &Geometry) -> Self {
        Self {
            valid: words_per_line(geometry.width, 1) as usize,
            mask: last_word_mask(geometry.width),
            fill: pass.fill(),
        }
    }

    #[inline]
    fn load(&self, row: &[u32], q: isize) -> u32 {
        if q < 0 || q as usize >= self.valid {
            return self.fill;
        }
        let value = row[q as usize];
        if q as usize == self.valid - 1 {
            (value & self.mask) | (self.fill & !self.mask)
        } else {
            value
        }
    }
}

#[inline]
fn identity(op: MorphOp) -> u32 {
    match op {
        MorphOp::Dilate => 0,
        MorphOp::Erode => u32::MAX,
    }
}

#[inline]
fn combine(op: MorphOp, acc: u32, value: u32) -> u32 {
    match op {
        MorphOp::Dilate => acc | value,
        MorphOp::Erode => acc & value,
    }
}

/// The 32 pixels starting `r` bits into `a` and continuing into `b`.
#[inline]
fn window(a: u32, b: u32, r: u32) -> u32 {
    if r == 0 {
        a
    } else {
        (a << r) | (b >> (32 - r))
    }
}

fn short_word(pass: &MorphPass, ctx: &RowContext, row: &[u32], w: usize) -> u32 {
    let w = w as isize;
    let prev = ctx.load(row, w - 1);
    let cur = ctx.load(row, w);
    let next = ctx.load(row, w + 1);
    let mut acc = identity(pass.op);
    for d in -(pass.reach_lo as i32)..=pass.reach_hi as i32 {
        let value = match d {
            0 => cur,
            d if d > 0 => window(cur, next, d as u32),
            d => window(prev, cur, (32 + d) as u32),
        };
        acc = combine(pass.op, acc, value);
    }
    acc
}

fn wide_word(pass: &MorphPass, ctx: &RowContext, row: &[u32], w: usize) -> u32 {
    let mut acc = identity(pass.op);
    for d in -(pass.reach_lo as isize)..=pass.reach_hi as isize {
        let bit = w as isize * 32 + d;
        let q = bit.div_euclid(32);
        let r = bit.rem_euclid(32) as u32;
        acc = combine(pass.op, acc, window(ctx.load(row, q), ctx.load(row, q + 1), r));
    }
    acc
}

fn horizontal(pass: &MorphPass, geometry: &Geometry, src: &[u32], dst: &mut [u32]) {
    let ctx = RowContext::new(pass, geometry);
    let wpl = geometry.wpl as usize;
    dst.par_chunks_mut(wpl).enumerate().for_each(|(y, out)| {
        let row = &src[y * wpl..(y + 1) * wpl];
        for (w, word) in out.iter_mut().enumerate() {
            if w >= ctx.valid {
                *word = 0;
                continue;
            }
            let acc = match pass.kernel {
                PassKernel::Brick5 | PassKernel::Short => short_word(pass, &ctx, row, w),
                PassKernel::Wide => wide_word(pass, &ctx, row, w),
            };
            *word = if w == ctx.valid - 1 { acc & ctx.mask } else { acc };
        }
    });
}

fn vertical(pass: &MorphPass, geometry: &Geometry, src: &[u32], dst: &mut [u32]) {
    let ctx = RowContext::new(pass, geometry);
    let wpl = geometry.wpl as usize;
    let height = geometry.height as isize;
    dst.par_chunks_mut(wpl).enumerate().for_each(|(y, out)| {
        for (w, word) in out.iter_mut().enumerate() {
            if w >= ctx.valid {
                *word = 0;
                continue;
            }
            let mut acc = identity(pass.op);
            for d in -(pass.reach_lo as isize)..=pass.reach_hi as isize {
                let yy = y as isize + d;
                let value = if yy < 0 || yy >= height {
                    ctx.fill
                } else {
                    src[yy as usize * wpl + w]
                };
                acc = combine(pass.op, acc, value);
            }
            *word = if w == ctx.valid - 1 { acc & ctx.mask } else { acc };
        }
    });
}

pub(crate) fn morph_pass(pass: &MorphPass, geometry: &Geometry, src: &[u32], dst: &mut [u32]) {
    let words = geometry.words();
    if words == 0 {
        return;
    }
    let (src, dst) = (&src[..words], &mut dst[..words]);
    match pass.direction {
        Direction::Horizontal => horizontal(pass, geometry, src, dst),
        Direction::Vertical => vertical(pass, geometry, src, dst),
    }
}
