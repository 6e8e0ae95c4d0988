//! Histogram, threshold and compose on the GPU against the native executor.

use pixmorph_kernels::{KernelExecutor, NativeExecutor, Rect};

use super::{assert_same_pix, generate_gray, generate_rgba, generate_words, gpu_executor};

#[test]
fn test_histogram_matches_native() {
    let Some(gpu) = gpu_executor("histogram") else {
        return;
    };
    let native = NativeExecutor::new();

    let rgba = generate_rgba(301, 97, 5);
    let gray = generate_gray(203, 61, 6);
    let rects = [
        Rect::new(0, 0, 10_000, 10_000),
        Rect::new(13, 7, 100, 50),
        Rect::new(300, 96, 5, 5),
        Rect::new(0, 0, 1, 1),
    ];
    for rect in rects {
        let expected = native.histogram_rect(&rgba, 4, rect).unwrap();
        let actual = gpu.histogram_rect(&rgba, 4, rect).unwrap();
        assert_eq!(actual, expected, "rgba histogram of {:?}", rect);

        let expected = native.histogram_rect(&gray, 1, rect).unwrap();
        let actual = gpu.histogram_rect(&gray, 1, rect).unwrap();
        assert_eq!(actual, expected, "gray histogram of {:?}", rect);
    }

    let outside = gpu.histogram_rect(&gray, 1, Rect::new(500, 500, 4, 4)).unwrap();
    assert!(outside.iter().all(|&n| n == 0));
}

#[test]
fn test_large_histogram_uses_many_groups() {
    let Some(gpu) = gpu_executor("large histogram") else {
        return;
    };
    let native = NativeExecutor::new();
    let rgba = generate_rgba(1024, 768, 0x5EED);
    let rect = Rect::full(&rgba);
    assert_eq!(
        gpu.histogram_rect(&rgba, 4, rect).unwrap(),
        native.histogram_rect(&rgba, 4, rect).unwrap()
    );
}

#[test]
fn test_threshold_matches_native() {
    let Some(gpu) = gpu_executor("threshold") else {
        return;
    };
    let native = NativeExecutor::new();

    let rgba = generate_rgba(157, 43, 8);
    let cases: [([i32; 4], [i32; 4]); 3] = [
        ([128; 4], [1, 1, 1, -1]),
        ([40, 200, 90, 10], [0, 1, -1, 0]),
        ([255, 0, 128, 128], [-1, -1, -1, -1]),
    ];
    for rect in [Rect::full(&rgba), Rect::new(31, 5, 70, 30), Rect::new(150, 40, 100, 100)] {
        for (thresholds, hi_values) in &cases {
            let context = format!("rgba {:?} {:?} {:?}", rect, thresholds, hi_values);
            let expected = native.threshold_rect(&rgba, rect, thresholds, hi_values).unwrap();
            let actual = gpu.threshold_rect(&rgba, rect, thresholds, hi_values).unwrap();
            assert_same_pix(&actual, &expected, &context);
        }
    }

    let gray = generate_gray(99, 30, 9);
    for hi in [0, 1] {
        let rect = Rect::new(3, 2, 64, 20);
        let expected = native.threshold_rect(&gray, rect, &[100], &[hi]).unwrap();
        let actual = gpu.threshold_rect(&gray, rect, &[100], &[hi]).unwrap();
        assert_same_pix(&actual, &expected, &format!("gray hi {}", hi));
    }
}

#[test]
fn test_threshold_rejects_what_native_rejects() {
    let Some(gpu) = gpu_executor("threshold errors") else {
        return;
    };
    let gray = generate_gray(16, 16, 1);
    assert!(gpu.threshold_rect(&gray, Rect::full(&gray), &[1, 2], &[0, 0]).is_err());
    assert!(gpu.threshold_rect(&gray, Rect::full(&gray), &[1], &[0, 0]).is_err());
    assert!(gpu.threshold_rect(&gray, Rect::new(40, 40, 2, 2), &[1], &[0]).is_err());
}

#[test]
fn test_compose_rgb_matches_native() {
    let Some(gpu) = gpu_executor("compose_rgb") else {
        return;
    };
    let native = NativeExecutor::new();
    for (w, h) in [(1, 1), (17, 9), (640, 480)] {
        let abgr = generate_words(w as usize * h as usize, (w + h) as u64);
        let expected = native.compose_rgb(&abgr, w, h).unwrap();
        let actual = gpu.compose_rgb(&abgr, w, h).unwrap();
        assert_eq!(actual.words(), expected.words(), "compose {}x{}", w, h);
    }
    assert!(gpu.compose_rgb(&[0; 5], 2, 2).is_err());
}
