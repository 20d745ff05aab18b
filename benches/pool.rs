// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use edgefirst_genicam::{
    mock::MockStream,
    pool::BufferPool,
    stream::BufferStatus,
};

pub fn benchmark_recycle(c: &mut Criterion) {
    let dims = [(640, 480), (1920, 1080), (3840, 2160)];

    let mut group = c.benchmark_group("recycle");
    for (width, height) in dims.iter() {
        let size = width * height;
        let stream = MockStream::new_gv();
        let pool = BufferPool::new(stream.clone());
        pool.acquire_initial(4, size).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_function(format!("{width}x{height}"), |b| {
            b.iter(|| {
                stream.complete_next(1, BufferStatus::Success);
                let buffer = stream.pop_completed().unwrap();
                let image = pool.wrap(buffer).unwrap();
                drop(image);
            })
        });
    }
    group.finish();
}

pub fn benchmark_growth(c: &mut Criterion) {
    c.bench_function("allocate_additional", |b| {
        b.iter_batched(
            || {
                let pool = BufferPool::new(MockStream::new_usb());
                pool.acquire_initial(1, 640 * 480).unwrap();
                pool
            },
            |pool| pool.allocate_additional(8).unwrap(),
            criterion::BatchSize::SmallInput,
        )
    });
}

pub fn benchmark_spare(c: &mut Criterion) {
    let pool = BufferPool::new(MockStream::new_usb());
    pool.acquire_initial(1, 1920 * 1080).unwrap();

    c.bench_function("spare_image", |b| {
        b.iter(|| {
            let mut spare = pool.get_spare_image();
            if let Some(data) = spare.spare_data_mut() {
                data.resize(1920 * 1080 * 3, 0);
            }
        })
    });
}

criterion_group!(benches, benchmark_recycle, benchmark_growth, benchmark_spare);
criterion_main!(benches);
