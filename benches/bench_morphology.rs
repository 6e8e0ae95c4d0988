//! Morphology and page-preprocessing benchmarks.
//!
//! Workloads: open/close bricks, line extraction, 4-channel histogram and
//! threshold on the synthetic benchmark page.
//! Executors: native, plus the first wgpu adapter when one opens.
//! Report: page throughput (pixels).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use pixmorph_kernels::ops::morphology::{self, MorphStep};
use pixmorph_kernels::scoring::SyntheticInput;
use pixmorph_kernels::wgpu_kernels::MorphProgram;
use pixmorph_kernels::{
    BoundaryMode, DeviceCatalog, GpuContext, KernelExecutor, LineParams, NativeExecutor, ProgramCache, Rect, WgpuCatalog,
    WgpuExecutor,
};

const PAGES: &[(u32, u32)] = &[(1024, 768), (2480, 3508)];

fn page_label(width: u32, height: u32) -> String {
    format!("{}x{}", width, height)
}

fn first_gpu() -> Option<WgpuExecutor> {
    let device = WgpuCatalog::default().enumerate().into_iter().find(|d| !d.is_native())?;
    let ctx = GpuContext::open(&device).ok()?;
    let cache: ProgramCache<MorphProgram> = ProgramCache::new(std::env::temp_dir().join("pixmorph-bench-kernels"));
    WgpuExecutor::with_cache(ctx, &cache).ok()
}

fn bench_executor<E: KernelExecutor>(c: &mut Criterion, exec: &E) {
    let label = exec.name().to_string();
    let pages: Vec<SyntheticInput> = PAGES
        .iter()
        .map(|&(w, h)| SyntheticInput::generate(w, h, 0x5EED).expect("benchmark page"))
        .collect();

    let mut group = c.benchmark_group(format!("morphology/{}", label));
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(3));
    for page in &pages {
        let id = page_label(page.width, page.height);
        group.throughput(Throughput::Elements(page.width as u64 * page.height as u64));
        for (name, step) in [
            ("close_3x3", MorphStep::Close { h: 3, v: 3 }),
            ("open_5x5", MorphStep::Open { h: 5, v: 5 }),
            ("dilate_75x1", MorphStep::Dilate { h: 75, v: 1 }),
        ] {
            group.bench_with_input(BenchmarkId::new(name, &id), &page.binary, |b, pix| {
                b.iter(|| morphology::run_step(exec, black_box(pix), step, BoundaryMode::Asymmetric).unwrap())
            });
        }
        let params = LineParams::for_resolution(300);
        group.bench_with_input(BenchmarkId::new("get_lines", &id), &page.binary, |b, pix| {
            b.iter(|| morphology::get_lines(exec, black_box(pix), &params, BoundaryMode::Asymmetric).unwrap())
        });
    }
    group.finish();

    let mut group = c.benchmark_group(format!("page/{}", label));
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(3));
    for page in &pages {
        let id = page_label(page.width, page.height);
        group.throughput(Throughput::Elements(page.width as u64 * page.height as u64));
        group.bench_with_input(BenchmarkId::new("histogram_rgba", &id), &page.rgba, |b, pix| {
            b.iter(|| exec.histogram_rect(black_box(pix), 4, Rect::full(pix)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("threshold_rgba", &id), &page.rgba, |b, pix| {
            b.iter(|| {
                exec.threshold_rect(black_box(pix), Rect::full(pix), &[128; 4], &[1, 1, 1, -1])
                    .unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("compose_rgb", &id), &page.abgr, |b, abgr| {
            b.iter(|| exec.compose_rgb(black_box(abgr), page.width, page.height).unwrap())
        });
    }
    group.finish();
}

fn bench_native(c: &mut Criterion) {
    bench_executor(c, &NativeExecutor::new());
}

fn bench_gpu(c: &mut Criterion) {
    match first_gpu() {
        Some(exec) => bench_executor(c, &exec),
        None => eprintln!("no wgpu adapter available, skipping GPU benchmarks"),
    }
}

criterion_group!(benches, bench_native, bench_gpu);
criterion_main!(benches);
