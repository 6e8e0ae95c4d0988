//! Minimal packed image container.
//!
//! Rows are stored as 32-bit words, `wpl` words per row. Pixels are packed
//! MSB-first: at 1 bpp pixel `x` is bit `31 - x % 32` of word `x / 32`; at
//! 8 bpp pixel 0 sits in the most significant byte; at 32 bpp each word is
//! one RGBA pixel with red in the most significant byte.

use crate::error::{AccelError, AccelResult};

/// Optional palette carried alongside the pixels. Never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Colormap {
    pub entries: Vec<[u8; 4]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pix {
    width: u32,
    height: u32,
    depth: u32,
    wpl: u32,
    data: Vec<u32>,
    colormap: Option<Colormap>,
}

/// Words needed for one row of `width` pixels at `depth` bits each.
#[inline]
pub fn words_per_line(width: u32, depth: u32) -> u32 {
    ((width as u64 * depth as u64 + 31) / 32) as u32
}

fn check_depth(depth: u32) -> AccelResult<()> {
    match depth {
        1 | 8 | 32 => Ok(()),
        _ => Err(AccelError::UnsupportedDepth { op: "pix", depth }),
    }
}

impl Pix {
    /// All-zero image.
    pub fn new(width: u32, height: u32, depth: u32) -> AccelResult<Self> {
        check_depth(depth)?;
        let wpl = words_per_line(width, depth);
        Ok(Self {
            width,
            height,
            depth,
            wpl,
            data: vec![0; wpl as usize * height as usize],
            colormap: None,
        })
    }

    /// Wrap existing words; `data.len()` must equal `wpl * height`.
    pub fn from_words(width: u32, height: u32, depth: u32, data: Vec<u32>) -> AccelResult<Self> {
        check_depth(depth)?;
        let wpl = words_per_line(width, depth);
        let expected = wpl as usize * height as usize;
        if data.len() != expected {
            return Err(AccelError::GeometryMismatch(format!(
                "{}x{}x{} needs {} words, got {}",
                width,
                height,
                depth,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            depth,
            wpl,
            data,
            colormap: None,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn wpl(&self) -> u32 {
        self.wpl
    }

    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.data
    }

    #[inline]
    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.data
    }

    pub fn into_words(self) -> Vec<u32> {
        self.data
    }

    pub fn colormap(&self) -> Option<&Colormap> {
        self.colormap.as_ref()
    }

    pub fn set_colormap(&mut self, colormap: Option<Colormap>) {
        self.colormap = colormap;
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn bytes_per_pixel(&self) -> usize {
        (self.depth as usize / 8).max(1)
    }

    pub fn same_geometry(&self, other: &Pix) -> bool {
        self.width == other.width && self.height == other.height && self.depth == other.depth
    }

    #[inline]
    pub fn row(&self, y: u32) -> &[u32] {
        let start = y as usize * self.wpl as usize;
        &self.data[start..start + self.wpl as usize]
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> u32 {
        let row = self.row(y);
        match self.depth {
            1 => (row[(x / 32) as usize] >> (31 - x % 32)) & 1,
            8 => (row[(x / 4) as usize] >> (24 - 8 * (x % 4))) & 0xff,
            _ => row[x as usize],
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, value: u32) {
        let start = y as usize * self.wpl as usize;
        match self.depth {
            1 => {
                let word = &mut self.data[start + (x / 32) as usize];
                let bit = 1u32 << (31 - x % 32);
                if value & 1 != 0 {
                    *word |= bit;
                } else {
                    *word &= !bit;
                }
            }
            8 => {
                let word = &mut self.data[start + (x / 4) as usize];
                let shift = 24 - 8 * (x % 4);
                *word = (*word & !(0xff << shift)) | ((value & 0xff) << shift);
            }
            _ => self.data[start + x as usize] = value,
        }
    }

    /// Byte `c` of the pixel at `(x, y)`; channel 0 is red at 32 bpp.
    #[inline]
    pub fn channel(&self, x: u32, y: u32, c: usize) -> u8 {
        match self.depth {
            32 => (self.row(y)[x as usize] >> (24 - 8 * c as u32)) as u8,
            _ => self.get_pixel(x, y) as u8,
        }
    }

    /// Mask for the valid bits of the last word of a 1 bpp row.
    pub fn last_word_mask(&self) -> u32 {
        last_word_mask(self.width * self.depth)
    }

    /// Zero the bits past `width` in every row.
    pub fn clear_padding(&mut self) {
        if self.wpl == 0 {
            return;
        }
        let mask = self.last_word_mask();
        let wpl = self.wpl as usize;
        for row in self.data.chunks_mut(wpl) {
            row[wpl - 1] &= mask;
        }
    }

    /// Number of set pixels in a 1 bpp image, padding excluded.
    pub fn count_foreground(&self) -> u64 {
        if self.depth != 1 || self.wpl == 0 {
            return 0;
        }
        let mask = self.last_word_mask();
        let wpl = self.wpl as usize;
        self.data
            .chunks(wpl)
            .map(|row| {
                let body: u64 = row[..wpl - 1].iter().map(|w| w.count_ones() as u64).sum();
                body + (row[wpl - 1] & mask).count_ones() as u64
            })
            .sum()
    }
}

/// Valid-bit mask of the final word of a row that carries `row_bits` bits.
#[inline]
pub fn last_word_mask(row_bits: u32) -> u32 {
    match row_bits % 32 {
        0 => u32::MAX,
        r => !(u32::MAX >> r),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn full(pix: &Pix) -> Self {
        Self::new(0, 0, pix.width(), pix.height())
    }

    /// Intersection with a `width x height` image, `None` when empty.
    pub fn clipped(&self, width: u32, height: u32) -> Option<Rect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.w.min(width - self.x);
        let h = self.h.min(height - self.y);
        if w == 0 || h == 0 {
            None
        } else {
            Some(Rect::new(self.x, self.y, w, h))
        }
    }
}
