//! GPU vs native comparison tests.
//!
//! Every kernel is integer-exact, so the wgpu executor must reproduce the
//! native executor bit for bit. Tests print a skip message and return when
//! no wgpu adapter is available.

mod cache;
mod morphology;
mod reductions;

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use pixmorph_kernels::wgpu_kernels::MorphProgram;
use pixmorph_kernels::{DeviceCatalog, GpuContext, Pix, ProgramCache, WgpuCatalog, WgpuExecutor};

static CONTEXT: OnceLock<Option<Arc<GpuContext>>> = OnceLock::new();
static PROGRAMS: OnceLock<ProgramCache<MorphProgram>> = OnceLock::new();

pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pixmorph-gpu-{}-{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// First wgpu adapter that opens, shared by all tests.
pub fn gpu_context() -> Option<Arc<GpuContext>> {
    CONTEXT
        .get_or_init(|| {
            WgpuCatalog::default()
                .enumerate()
                .into_iter()
                .filter(|d| !d.is_native())
                .find_map(|device| match GpuContext::open(&device) {
                    Ok(ctx) => Some(ctx),
                    Err(e) => {
                        eprintln!("cannot open {}: {}", device.name(), e);
                        None
                    }
                })
        })
        .clone()
}

pub fn gpu_executor(context: &str) -> Option<WgpuExecutor> {
    let Some(ctx) = gpu_context() else {
        eprintln!("{}: no wgpu adapter available, skipping", context);
        return None;
    };
    let programs = PROGRAMS.get_or_init(|| ProgramCache::new(temp_dir("shared").join("kernels")));
    Some(WgpuExecutor::with_cache(ctx, programs).expect("morphology program builds"))
}

/// Deterministic binary image, roughly one third foreground.
pub fn generate_binary(width: u32, height: u32, seed: u64) -> Pix {
    let mut pix = Pix::new(width, height, 1).unwrap();
    let mut state = seed;
    for y in 0..height {
        for x in 0..width {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            if (state >> 33) % 3 == 0 {
                pix.set_pixel(x, y, 1);
            }
        }
    }
    pix
}

pub fn generate_words(count: usize, seed: u64) -> Vec<u32> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 32) as u32
        })
        .collect()
}

pub fn generate_rgba(width: u32, height: u32, seed: u64) -> Pix {
    let words = generate_words(width as usize * height as usize, seed);
    Pix::from_words(width, height, 32, words).unwrap()
}

pub fn generate_gray(width: u32, height: u32, seed: u64) -> Pix {
    let mut pix = Pix::new(width, height, 8).unwrap();
    let values = generate_words(width as usize * height as usize, seed);
    for y in 0..height {
        for x in 0..width {
            pix.set_pixel(x, y, values[(y * width + x) as usize] >> 24);
        }
    }
    pix
}

/// Compare two binary images and report the first differing pixel.
pub fn assert_same_pix(actual: &Pix, expected: &Pix, context: &str) {
    assert_eq!(
        (actual.width(), actual.height(), actual.depth()),
        (expected.width(), expected.height(), expected.depth()),
        "{}: geometry mismatch",
        context
    );
    if actual == expected {
        return;
    }
    for y in 0..expected.height() {
        for x in 0..expected.width() {
            assert_eq!(
                actual.get_pixel(x, y),
                expected.get_pixel(x, y),
                "{}: mismatch at ({}, {})",
                context,
                x,
                y
            );
        }
    }
    panic!("{}: padding bits differ", context);
}
