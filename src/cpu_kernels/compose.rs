use rayon::prelude::*;

use crate::error::{AccelError, AccelResult};
use crate::pix::Pix;

/// Convert TIFF-order ABGR words to leptonica RGBA with a zero alpha byte.
#[inline]
pub fn compose_rgb_word(abgr: u32) -> u32 {
    let r = abgr & 0xff;
    let g = (abgr >> 8) & 0xff;
    let b = (abgr >> 16) & 0xff;
    (r << 24) | (g << 16) | (b << 8)
}

pub(crate) fn compose_rgb(abgr: &[u32], width: u32, height: u32) -> AccelResult<Pix> {
    if abgr.len() != width as usize * height as usize {
        return Err(AccelError::GeometryMismatch(format!(
            "{} source words for a {}x{} image",
            abgr.len(),
            width,
            height
        )));
    }
    let words = abgr.par_iter().map(|&w| compose_rgb_word(w)).collect();
    Pix::from_words(width, height, 32, words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_rgb() {
        assert_eq!(compose_rgb_word(0xff33_2211), 0x1122_3300);
        let pix = compose_rgb(&[0x0000_00ff, 0x00ff_0000], 2, 1).unwrap();
        assert_eq!(pix.words(), &[0xff00_0000, 0x0000_ff00]);
        assert!(compose_rgb(&[0; 3], 2, 2).is_err());
    }
}
