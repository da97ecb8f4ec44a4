//! Correlation engine benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Point2;

use point_tracker_core::FloatImage;
use point_tracker_tracking::{find_template, high_pass, normalized_cross_correlation, SearchWindow};

fn speckle(w: usize, h: usize) -> FloatImage {
    let mut img = FloatImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let v = ((x * 31 + y * 17) % 23) as f32 + (x as f32 * 0.2).sin() * 8.0;
            img.set(x, y, v);
        }
    }
    img
}

fn bench_ncc(c: &mut Criterion) {
    let target = speckle(64, 64);
    let template = target.view().crop(22, 22, 42, 42);

    c.bench_function("ncc_20x20_in_64x64", |b| {
        b.iter(|| normalized_cross_correlation(black_box(&template.view()), black_box(&target.view())))
    });
}

fn bench_find_template(c: &mut Criterion) {
    let img = speckle(256, 256);
    let window = SearchWindow {
        template_center: Point2::new(128.0, 128.0),
        template_half_size: [10, 10],
        search_center: Point2::new(130.0, 126.0),
        search_half_size: [25, 25],
    };

    c.bench_function("find_template_default_window", |b| {
        b.iter(|| find_template(black_box(&img.view()), black_box(&window), black_box(&img.view())))
    });
}

fn bench_high_pass(c: &mut Criterion) {
    let img = speckle(512, 512);

    c.bench_function("high_pass_512", |b| {
        b.iter(|| high_pass(black_box(&img.view()), [10, 10]))
    });
}

criterion_group!(benches, bench_ncc, bench_find_template, bench_high_pass);
criterion_main!(benches);
