// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;
use stereo_odometry_rs::core::features::disparity::BlockMatcher;

fn criterion_benchmark(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let right: DMatrix<u8> = DMatrix::from_fn(240, 320, |_, _| rng.gen());
    let shift = 12;
    let left = DMatrix::from_fn(240, 320, |r, col| right[(r, col.saturating_sub(shift))]);

    c.bench_function("block matching 240x320 d<64", |b| {
        let matcher = BlockMatcher::default();
        b.iter(|| matcher.compute(black_box(&left), black_box(&right)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
