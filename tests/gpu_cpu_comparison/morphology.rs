//! Morphology on the GPU against the native executor.

use pixmorph_kernels::ops::morphology::{self, MorphStep};
use pixmorph_kernels::{BoundaryMode, HostCopy, LineParams, NativeExecutor, Pix};

use super::{assert_same_pix, generate_binary, gpu_executor};

/// Sizes that reach every pass kernel: short, wide (reach above 31) and
/// the fixed 5x5 brick.
const SIZES: [(u32, u32); 8] = [(3, 3), (5, 5), (2, 4), (1, 9), (31, 1), (64, 3), (80, 1), (101, 7)];
const BOUNDARIES: [BoundaryMode; 2] = [BoundaryMode::Asymmetric, BoundaryMode::Symmetric];

#[test]
fn test_dilate_erode_match_native() {
    let Some(gpu) = gpu_executor("dilate/erode") else {
        return;
    };
    let native = NativeExecutor::new();
    // widths with a partial last word
    for (seed, &(w, h)) in [(97, 33), (256, 40), (1000, 17)].iter().enumerate() {
        let pix = generate_binary(w, h, seed as u64);
        for &(sh, sv) in &SIZES {
            for bc in BOUNDARIES {
                for s in [MorphStep::Dilate { h: sh, v: sv }, MorphStep::Erode { h: sh, v: sv }] {
                    let context = format!("{:?} {:?} on {}x{}", s, bc, w, h);
                    let expected = morphology::run_step(&native, &pix, s, bc).unwrap();
                    let actual = morphology::run_step(&gpu, &pix, s, bc).unwrap();
                    assert_same_pix(&actual, &expected, &context);
                }
            }
        }
    }
}

#[test]
fn test_open_close_hollow_match_native() {
    let Some(gpu) = gpu_executor("open/close/hollow") else {
        return;
    };
    let native = NativeExecutor::new();
    let pix = generate_binary(333, 121, 17);
    let steps = [
        MorphStep::Open { h: 3, v: 3 },
        MorphStep::Close { h: 5, v: 5 },
        MorphStep::Open { h: 40, v: 2 },
        MorphStep::Close { h: 2, v: 40 },
        MorphStep::Hollow {
            close_h: 5,
            close_v: 5,
            open_h: 15,
            open_v: 15,
        },
    ];
    for bc in BOUNDARIES {
        for s in steps {
            let expected = morphology::run_step(&native, &pix, s, bc).unwrap();
            let actual = morphology::run_step(&gpu, &pix, s, bc).unwrap();
            assert_same_pix(&actual, &expected, &format!("{:?} {:?}", s, bc));
        }
    }
}

#[test]
fn test_sequence_matches_native() {
    let Some(gpu) = gpu_executor("sequence") else {
        return;
    };
    let native = NativeExecutor::new();
    let pix = generate_binary(200, 90, 23);
    let steps = [
        MorphStep::Close { h: 3, v: 3 },
        MorphStep::Open { h: 3, v: 3 },
        MorphStep::Dilate { h: 70, v: 1 },
        MorphStep::Erode { h: 1, v: 6 },
    ];
    let bc = BoundaryMode::Asymmetric;
    let expected = morphology::run_steps(&native, &pix, &steps, bc, HostCopy::Yes).unwrap().unwrap();
    let actual = morphology::run_steps(&gpu, &pix, &steps, bc, HostCopy::Yes).unwrap().unwrap();
    assert_same_pix(&actual, &expected, "close/open/dilate/erode sequence");
    assert!(morphology::run_steps(&gpu, &pix, &steps, bc, HostCopy::No).unwrap().is_none());
}

#[test]
fn test_subtract_matches_native() {
    let Some(gpu) = gpu_executor("subtract") else {
        return;
    };
    let native = NativeExecutor::new();
    for width in [1, 32, 45, 300] {
        let a = generate_binary(width, 20, 100 + width as u64);
        let b = generate_binary(width, 20, 200 + width as u64);
        let expected = morphology::subtract(&native, &a, &b).unwrap();
        let actual = morphology::subtract(&gpu, &a, &b).unwrap();
        assert_same_pix(&actual, &expected, &format!("subtract width {}", width));

        let mut in_place = a.clone();
        morphology::subtract_in_place(&gpu, &mut in_place, &b).unwrap();
        assert_same_pix(&in_place, &expected, &format!("subtract_in_place width {}", width));
    }
}

#[test]
fn test_get_lines_matches_native() {
    let Some(gpu) = gpu_executor("get_lines") else {
        return;
    };
    let native = NativeExecutor::new();
    let mut page = generate_binary(640, 480, 31);
    // ruled lines over the noise
    for x in 10..630 {
        for y in 200..205 {
            page.set_pixel(x, y, 1);
        }
    }
    for y in 10..470 {
        for x in 320..324 {
            page.set_pixel(x, y, 1);
        }
    }
    let mut params = LineParams::for_resolution(300);
    params.keep_closed = true;
    for bc in BOUNDARIES {
        let expected = morphology::get_lines(&native, &page, &params, bc).unwrap();
        let actual = morphology::get_lines(&gpu, &page, &params, bc).unwrap();
        assert_same_pix(&actual.vertical, &expected.vertical, "vertical lines");
        assert_same_pix(&actual.horizontal, &expected.horizontal, "horizontal lines");
        assert_same_pix(
            actual.closed.as_ref().unwrap(),
            expected.closed.as_ref().unwrap(),
            "closed page",
        );
    }
}

#[test]
fn test_empty_and_tiny_images() {
    let Some(gpu) = gpu_executor("tiny images") else {
        return;
    };
    let native = NativeExecutor::new();
    for (w, h) in [(1, 1), (1, 50), (50, 1), (33, 2)] {
        let pix = generate_binary(w, h, (w * h) as u64);
        for s in [MorphStep::Dilate { h: 5, v: 5 }, MorphStep::Close { h: 3, v: 7 }] {
            let expected = morphology::run_step(&native, &pix, s, BoundaryMode::Symmetric).unwrap();
            let actual = morphology::run_step(&gpu, &pix, s, BoundaryMode::Symmetric).unwrap();
            assert_same_pix(&actual, &expected, &format!("{:?} on {}x{}", s, w, h));
        }
    }
    let empty = Pix::new(0, 0, 1).unwrap();
    let out = morphology::run_step(&gpu, &empty, MorphStep::Dilate { h: 3, v: 3 }, BoundaryMode::Asymmetric).unwrap();
    assert_eq!((out.width(), out.height()), (0, 0));
}
