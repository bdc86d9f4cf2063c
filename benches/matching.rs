// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;
use stereo_odometry_rs::core::features::brief::{self, Brief};
use stereo_odometry_rs::core::features::harris::HarrisDetector;

/// Random 8x8 blocks, rich in corners.
fn textured_image(nrows: usize, ncols: usize, seed: u64) -> DMatrix<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let blocks = DMatrix::from_fn(nrows / 8 + 1, ncols / 8 + 1, |_, _| rng.gen::<u8>());
    DMatrix::from_fn(nrows, ncols, |r, c| blocks[(r / 8, c / 8)])
}

fn criterion_benchmark(c: &mut Criterion) {
    let img = textured_image(480, 640, 1);
    let detector = HarrisDetector::default();
    let descriptor = Brief::default();

    c.bench_function("harris 480x640", |b| {
        b.iter(|| detector.detect(black_box(&img)))
    });

    let keypoints: Vec<_> = detector.detect(&img).into_iter().take(500).collect();
    c.bench_function("brief 500 keypoints", |b| {
        b.iter(|| descriptor.describe(black_box(&img), black_box(&keypoints)))
    });

    let query = descriptor.describe(&img, &keypoints);
    let other = textured_image(480, 640, 2);
    let train = descriptor.describe(&other, &keypoints);
    c.bench_function("brute force match 500x500 cross check", |b| {
        b.iter(|| brief::brute_force_match(black_box(&query), black_box(&train), true))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
