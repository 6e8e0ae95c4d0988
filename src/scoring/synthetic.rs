//! Fixed-seed benchmark input: a light page with ruled lines and ink
//! blobs, in the three forms the workloads consume.

use crate::error::AccelResult;
use crate::pix::Pix;

/// Knuth MMIX linear congruential generator.
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    /// Uniform in `0..bound`; `bound` must be non-zero.
    pub fn below(&mut self, bound: u32) -> u32 {
        self.next_u32() % bound
    }
}

pub struct SyntheticInput {
    pub width: u32,
    pub height: u32,
    /// TIFF-order ABGR words, `width * height` of them.
    pub abgr: Vec<u32>,
    /// The same pixels as 32 bpp RGBA.
    pub rgba: Pix,
    /// Ink mask: 1 where the luminance is dark.
    pub binary: Pix,
}

const INK: u8 = 40;

impl SyntheticInput {
    pub fn generate(width: u32, height: u32, seed: u64) -> AccelResult<Self> {
        let mut rng = Lcg::new(seed);
        let (w, h) = (width as usize, height as usize);
        let mut gray = vec![0u8; w * h];
        for v in gray.iter_mut() {
            *v = 190 + rng.below(50) as u8;
        }

        // horizontal and vertical rules, slightly uneven in thickness
        let rule_step = (height / 8).max(4) as usize;
        for y0 in (rule_step / 2..h).step_by(rule_step) {
            let thickness = 1 + rng.below(3) as usize;
            for y in y0..(y0 + thickness).min(h) {
                gray[y * w..(y + 1) * w].fill(INK);
            }
        }
        let rule_step = (width / 8).max(4) as usize;
        for x0 in (rule_step / 2..w).step_by(rule_step) {
            let thickness = 1 + rng.below(3) as usize;
            for y in 0..h {
                for x in x0..(x0 + thickness).min(w) {
                    gray[y * w + x] = INK;
                }
            }
        }

        // noise blobs
        if w > 0 && h > 0 {
            let blobs = (w * h / 4096).max(1);
            for _ in 0..blobs {
                let cx = rng.below(width) as usize;
                let cy = rng.below(height) as usize;
                let size = 1 + rng.below(6) as usize;
                for y in cy..(cy + size).min(h) {
                    for x in cx..(cx + size).min(w) {
                        gray[y * w + x] = INK + rng.below(30) as u8;
                    }
                }
            }
        }

        let mut abgr = Vec::with_capacity(w * h);
        let mut rgba = Pix::new(width, height, 32)?;
        let mut binary = Pix::new(width, height, 1)?;
        for y in 0..height {
            for x in 0..width {
                let g = gray[y as usize * w + x as usize] as u32;
                let r = g;
                let gr = g.saturating_sub(rng.below(8));
                let b = (g + rng.below(8)).min(255);
                abgr.push(0xff00_0000 | (b << 16) | (gr << 8) | r);
                rgba.set_pixel(x, y, (r << 24) | (gr << 16) | (b << 8));
                if g < 128 {
                    binary.set_pixel(x, y, 1);
                }
            }
        }

        Ok(Self {
            width,
            height,
            abgr,
            rgba,
            binary,
        })
    }
}
