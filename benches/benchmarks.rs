// benches/benchmarks.rs -- Per-stage and full-filter CPU benchmarks.
//
// Synthetic benchmarks (always run):
//   cargo bench --bench benchmarks
//
// Frame size defaults to 752×480 (EuRoC cam0). Each stage is benchmarked in
// isolation against buffers prepared once outside the timing loop, then the
// whole filter is benchmarked per frame over a short translating sequence.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use flowfilter::buffer::Buffer;
use flowfilter::filter::FlowFilter;
use flowfilter::image::Image;
use flowfilter::imagemodel::ImageModel;
use flowfilter::propagation::FlowPropagator;
use flowfilter::smoother::FlowSmoother;
use flowfilter::update::FlowUpdate;

const W: usize = 752;
const H: usize = 480;

// ============================================================
// Helpers
// ============================================================

/// Synthetic textured frame, shifted by (dx, dy) pixels.
fn make_scene(w: usize, h: usize, dx: f32, dy: f32) -> Image<u8> {
    Image::from_fn(w, h, |x, y| {
        let sx = x as f32 - dx;
        let sy = y as f32 - dy;
        let v = 128.0
            + 50.0 * (sx * 0.07).sin() * (sy * 0.05).cos()
            + 30.0 * ((sx + sy) * 0.19).sin();
        v.round().clamp(0.0, 255.0) as u8
    })
}

/// A smooth flow field with magnitudes up to `max_flow`.
fn make_flow(w: usize, h: usize, max_flow: f32) -> Image<[f32; 2]> {
    Image::from_fn(w, h, |x, y| {
        let u = max_flow * (x as f32 * 0.01).sin();
        let v = max_flow * (y as f32 * 0.013).cos();
        [u, v]
    })
}

// ============================================================
// Per-stage benchmarks
// ============================================================

fn bench_imagemodel(c: &mut Criterion) {
    let input = Buffer::new(H, W);
    input.upload(&make_scene(W, H, 0.0, 0.0)).unwrap();
    let mut model = ImageModel::new(&input);

    let mut group = c.benchmark_group("imagemodel");
    group.bench_function("752x480", |b| b.iter(|| model.compute()));
    group.finish();
}

fn bench_propagation(c: &mut Criterion) {
    let input = Buffer::new(H, W);
    input.upload(&make_flow(W, H, 4.0)).unwrap();

    let mut group = c.benchmark_group("propagation");
    for iterations in [1usize, 2, 4, 8] {
        let mut prop = FlowPropagator::new(&input, iterations).unwrap();
        group.bench_with_input(BenchmarkId::new("752x480", iterations), &iterations, |b, _| {
            b.iter(|| prop.compute().unwrap())
        });
    }
    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let input = Buffer::new(H, W);
    input.upload(&make_scene(W, H, 0.0, 0.0)).unwrap();
    let mut model = ImageModel::new(&input);
    model.compute();

    let flow = Buffer::new(H, W);
    flow.upload(&make_flow(W, H, 1.0)).unwrap();
    let mut update =
        FlowUpdate::new(&flow, model.image_constant(), model.image_gradient(), 1.0, 4.0).unwrap();

    let mut group = c.benchmark_group("update");
    group.bench_function("752x480", |b| b.iter(|| update.compute()));
    group.finish();
}

fn bench_smoother(c: &mut Criterion) {
    let input = Buffer::new(H, W);
    input.upload(&make_flow(W, H, 2.0)).unwrap();
    let output = Buffer::new(H, W);

    let mut group = c.benchmark_group("smoother");
    for iterations in [1usize, 2, 4] {
        let mut smoother = FlowSmoother::new(&input, &output, iterations).unwrap();
        group.bench_with_input(BenchmarkId::new("752x480", iterations), &iterations, |b, _| {
            b.iter(|| smoother.compute().unwrap())
        });
    }
    group.finish();
}

// ============================================================
// Full filter
// ============================================================

fn bench_filter(c: &mut Criterion) {
    let frames: Vec<Image<u8>> = (0..10)
        .map(|i| make_scene(W, H, 0.8 * i as f32, 0.3 * i as f32))
        .collect();

    let mut group = c.benchmark_group("filter");
    group.sample_size(20);

    for max_flow in [1.0f32, 4.0] {
        group.bench_with_input(
            BenchmarkId::new("per_frame_752x480", format!("max_flow_{max_flow}")),
            &max_flow,
            |b, &max_flow| {
                let mut filter = FlowFilter::new(H, W, 2, max_flow, 0.1).unwrap();
                let mut k = 0;
                b.iter(|| {
                    filter.load_image(&frames[k % frames.len()]).unwrap();
                    filter.compute().unwrap();
                    k += 1;
                })
            },
        );
    }

    group.bench_function("10frames_cold_752x480", |b| {
        b.iter(|| {
            let mut filter = FlowFilter::new(H, W, 2, 2.0, 0.1).unwrap();
            for frame in &frames {
                filter.load_image(frame).unwrap();
                filter.compute().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_imagemodel,
    bench_propagation,
    bench_update,
    bench_smoother,
    bench_filter,
);
criterion_main!(benches);
