//! Native CPU executor.
//!
//! The reference implementation of every kernel: the benchmark baseline and
//! the fallback whenever no compute device is selected or a fast path does
//! not cover the input. Rows are processed in parallel with rayon.

pub mod compose;
pub mod histogram;
pub mod morph;
pub mod threshold;

use crate::error::AccelResult;
use crate::ops::variant::MorphPass;
use crate::pipeline::{BufferAccess, Geometry, KernelExecutor};
use crate::pix::{Pix, Rect};

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeExecutor;

impl NativeExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl KernelExecutor for NativeExecutor {
    type Buffer = Vec<u32>;

    fn name(&self) -> &str {
        "native"
    }

    fn upload(&self, pix: &Pix, _access: BufferAccess) -> AccelResult<Vec<u32>> {
        let mut words = pix.words().to_vec();
        if words.is_empty() {
            words.push(0);
        }
        Ok(words)
    }

    fn allocate(&self, words: usize, _access: BufferAccess, _host_mapped: bool) -> AccelResult<Vec<u32>> {
        Ok(vec![0; words])
    }

    fn write(&self, buffer: &mut Vec<u32>, pix: &Pix) -> AccelResult<()> {
        let words = pix.words();
        buffer[..words.len()].copy_from_slice(words);
        Ok(())
    }

    fn morph_pass(&self, pass: &MorphPass, geometry: &Geometry, src: &Vec<u32>, dst: &mut Vec<u32>) -> AccelResult<()> {
        morph::morph_pass(pass, geometry, src, dst);
        Ok(())
    }

    fn subtract(&self, geometry: &Geometry, a: &Vec<u32>, b: &Vec<u32>, dst: &mut Vec<u32>) -> AccelResult<()> {
        let n = geometry.words();
        for ((out, &a), &b) in dst[..n].iter_mut().zip(&a[..n]).zip(&b[..n]) {
            *out = a & !b;
        }
        Ok(())
    }

    fn subtract_in_place(&self, geometry: &Geometry, a: &mut Vec<u32>, b: &Vec<u32>) -> AccelResult<()> {
        let n = geometry.words();
        for (a, &b) in a[..n].iter_mut().zip(&b[..n]) {
            *a &= !b;
        }
        Ok(())
    }

    fn copy(&self, geometry: &Geometry, src: &Vec<u32>, dst: &mut Vec<u32>) -> AccelResult<()> {
        let n = geometry.words();
        dst[..n].copy_from_slice(&src[..n]);
        Ok(())
    }

    fn download(&self, geometry: &Geometry, buffer: &Vec<u32>) -> AccelResult<Vec<u32>> {
        Ok(buffer[..geometry.words()].to_vec())
    }

    fn synchronize(&self) -> AccelResult<()> {
        Ok(())
    }

    fn supports_channels(&self, depth: u32, channels: usize) -> bool {
        matches!(depth, 8 | 32) && channels >= 1 && channels <= depth as usize / 8
    }

    fn histogram_rect(&self, pix: &Pix, channels: usize, rect: Rect) -> AccelResult<Vec<u32>> {
        histogram::histogram_rect(pix, channels, rect)
    }

    fn threshold_rect(&self, pix: &Pix, rect: Rect, thresholds: &[i32], hi_values: &[i32]) -> AccelResult<Pix> {
        threshold::threshold_rect(pix, rect, thresholds, hi_values)
    }

    fn compose_rgb(&self, abgr: &[u32], width: u32, height: u32) -> AccelResult<Pix> {
        compose::compose_rgb(abgr, width, height)
    }
}
