//! Program cache behaviour against a real wgpu device.

use pixmorph_kernels::ops::morphology::{self, MorphStep};
use pixmorph_kernels::wgpu_kernels::{MorphProgram, MORPH_KERNELS};
use pixmorph_kernels::{BoundaryMode, ProgramCache, WgpuExecutor};

use super::{assert_same_pix, generate_binary, gpu_context, temp_dir};

#[test]
fn test_memoized_program_is_reused() {
    let Some(ctx) = gpu_context() else {
        eprintln!("program memo: no wgpu adapter available, skipping");
        return;
    };
    let dir = temp_dir("memo");
    let cache: ProgramCache<MorphProgram> = ProgramCache::new(&dir);
    WgpuExecutor::with_cache(ctx.clone(), &cache).unwrap();
    WgpuExecutor::with_cache(ctx.clone(), &cache).unwrap();

    let stats = cache.stats();
    assert_eq!(stats.binary_builds + stats.source_builds, 1);
    assert_eq!(stats.memo_hits, 1);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_deleted_binary_rebuilds_identical_results() {
    let Some(ctx) = gpu_context() else {
        eprintln!("cache miss resilience: no wgpu adapter available, skipping");
        return;
    };
    let dir = temp_dir("resilience");
    let cache: ProgramCache<MorphProgram> = ProgramCache::new(&dir);
    let pix = generate_binary(250, 80, 77);
    let s = MorphStep::Close { h: 7, v: 3 };
    let bc = BoundaryMode::Asymmetric;

    let first = {
        let exec = WgpuExecutor::with_cache(ctx.clone(), &cache).unwrap();
        morphology::run_step(&exec, &pix, s, bc).unwrap()
    };

    let binary = cache.binary_path(MORPH_KERNELS.stem, ctx.name());
    if ctx.supports_pipeline_cache() {
        assert!(binary.exists(), "pipeline cache blob written to {:?}", binary);
    }
    let _ = std::fs::remove_file(&binary);
    cache.clear_memo();

    let second = {
        let exec = WgpuExecutor::with_cache(ctx.clone(), &cache).unwrap();
        morphology::run_step(&exec, &pix, s, bc).unwrap()
    };
    assert_same_pix(&second, &first, "result after rebuilding from source");
    assert_eq!(cache.stats().source_builds, 2);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_garbage_binary_falls_back_to_source() {
    let Some(ctx) = gpu_context() else {
        eprintln!("corrupt binary: no wgpu adapter available, skipping");
        return;
    };
    let dir = temp_dir("garbage");
    let cache: ProgramCache<MorphProgram> = ProgramCache::new(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(cache.binary_path(MORPH_KERNELS.stem, ctx.name()), b"definitely not a pipeline cache").unwrap();

    let exec = WgpuExecutor::with_cache(ctx.clone(), &cache).unwrap();
    let pix = generate_binary(64, 64, 3);
    let out = morphology::run_step(&exec, &pix, MorphStep::Dilate { h: 3, v: 3 }, BoundaryMode::Asymmetric).unwrap();
    assert_eq!((out.width(), out.height()), (64, 64));
    let _ = std::fs::remove_dir_all(&dir);
}
