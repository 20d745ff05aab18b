// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_genicam::{
    mock::MockStream,
    pool::{BufferPool, PoolStats},
    stream::{BufferStatus, Stream},
};
use serial_test::serial;
use std::{error::Error, sync::Arc, thread};

/// Buffers owned by the stream plus loaned and idle buffers add up to the
/// pool total.
fn assert_conserved(stream: &MockStream, stats: PoolStats) {
    assert_eq!(
        stream.n_owned() + stats.loaned + stats.idle,
        stats.total,
        "buffer accounting broken: {stats:?}"
    );
}

#[test]
fn test_acquire_initial() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_usb();
    let pool = BufferPool::new(stream.clone());
    pool.acquire_initial(10, 4096)?;

    assert_eq!(pool.buffer_size(), 4096);
    assert_eq!(stream.n_queued(), 10);
    assert_eq!(
        pool.stats(),
        PoolStats {
            total: 10,
            ..Default::default()
        }
    );
    for id in 0..10 {
        assert_eq!(stream.push_count(id), 1);
    }
    Ok(())
}

#[test]
fn test_wrap_and_recycle() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_usb();
    let pool = BufferPool::new(stream.clone());
    pool.acquire_initial(2, 64)?;

    stream.complete_next(1, BufferStatus::Success);
    let buffer = stream.pop_completed().ok_or("no buffer")?;
    let id = buffer.id();
    let image = pool.wrap(buffer).map_err(|_| "wrap failed")?;

    assert!(image.is_native());
    assert_eq!(image.buffer_id(), Some(id));
    assert_eq!(image.data(), &[1u8; 64][..]);
    assert_eq!(pool.stats().loaned, 1);
    assert_eq!(stream.n_queued(), 1);
    assert_conserved(&stream, pool.stats());

    drop(image);
    assert_eq!(pool.stats().loaned, 0);
    assert_eq!(stream.n_queued(), 2);
    assert_eq!(stream.push_count(id), 2);
    assert_conserved(&stream, pool.stats());
    Ok(())
}

#[test]
fn test_native_memory_keeps_payload_size() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_usb();
    let pool = BufferPool::new(stream.clone());
    pool.acquire_initial(2, 64)?;

    stream.complete_next(1, BufferStatus::Success);
    let buffer = stream.pop_completed().ok_or("no buffer")?;
    let id = buffer.id();
    let mut image = pool.wrap(buffer).map_err(|_| "wrap failed")?;

    assert!(image.spare_data_mut().is_none());
    image.data_mut().fill(9);
    assert_eq!(image.data(), &[9u8; 64][..]);
    drop(image);

    // The buffer returns to the fill queue at the payload size.
    stream.complete_next(2, BufferStatus::Success);
    stream.complete_next(3, BufferStatus::Success);
    drop(stream.pop_completed());
    let buffer = stream.pop_completed().ok_or("no buffer")?;
    assert_eq!(buffer.id(), id);
    assert_eq!(buffer.size(), 64);
    Ok(())
}

#[test]
fn test_wrap_rejects_bad_status() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_usb();
    let pool = BufferPool::new(stream.clone());
    pool.acquire_initial(1, 64)?;

    stream.complete_next(1, BufferStatus::Timeout);
    let buffer = stream.pop_completed().ok_or("no buffer")?;
    let buffer = match pool.wrap(buffer) {
        Ok(_) => return Err("bad buffer was wrapped".into()),
        Err(buffer) => buffer,
    };
    assert_eq!(buffer.status, BufferStatus::Timeout);
    assert_eq!(pool.stats().loaned, 0);

    stream.push_buffer(buffer);
    assert_conserved(&stream, pool.stats());
    Ok(())
}

#[test]
fn test_grow_while_loaned() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_usb();
    let pool = BufferPool::new(stream.clone());
    pool.acquire_initial(2, 32)?;

    let mut images = Vec::new();
    for frame_id in 1..=2 {
        stream.complete_next(frame_id, BufferStatus::Success);
        let buffer = stream.pop_completed().ok_or("no buffer")?;
        images.push(pool.wrap(buffer).map_err(|_| "wrap failed")?);
    }
    assert_eq!(stream.n_queued(), 0);

    pool.allocate_additional(3)?;
    assert_eq!(pool.stats().total, 5);
    assert_eq!(stream.n_queued(), 3);
    assert_conserved(&stream, pool.stats());

    images.clear();
    assert_eq!(stream.n_queued(), 5);
    assert_conserved(&stream, pool.stats());
    Ok(())
}

#[test]
fn test_shrink() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_usb();
    let pool = BufferPool::new(stream.clone());
    pool.acquire_initial(3, 32)?;

    // Never below one buffer.
    assert_eq!(pool.shrink(5), 2);
    assert_eq!(pool.shrink(1), 0);
    assert_eq!(pool.stats().pending_shrink, 2);

    for frame_id in 1..=3 {
        stream.complete_next(frame_id, BufferStatus::Success);
        let buffer = stream.pop_completed().ok_or("no buffer")?;
        drop(pool.wrap(buffer).map_err(|_| "wrap failed")?);
        assert_conserved(&stream, pool.stats());
    }

    let stats = pool.stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending_shrink, 0);
    assert_eq!(stream.n_queued(), 1);
    Ok(())
}

#[test]
fn test_detach_and_release() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_usb();
    let pool = BufferPool::new(stream.clone());
    pool.acquire_initial(2, 32)?;

    stream.complete_next(1, BufferStatus::Success);
    let buffer = stream.pop_completed().ok_or("no buffer")?;
    let image = pool.wrap(buffer).map_err(|_| "wrap failed")?;

    pool.detach();
    drop(image);
    assert_eq!(stream.n_queued(), 1);
    assert_eq!(pool.stats().idle, 1);
    assert_conserved(&stream, pool.stats());

    assert_eq!(pool.release_idle(), 1);
    assert_eq!(pool.stats().total, 1);
    assert_eq!(pool.stats().idle, 0);
    Ok(())
}

#[test]
fn test_spare_images_reused() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_usb();
    let pool = BufferPool::new(stream.clone());
    pool.acquire_initial(1, 128)?;

    for _ in 0..5 {
        let mut spare = pool.get_spare_image();
        assert!(!spare.is_native());
        assert!(spare.data().is_empty());
        spare
            .spare_data_mut()
            .ok_or("spare image is not resizable")?
            .extend_from_slice(&[7; 128]);
        assert_eq!(spare.data().len(), 128);
    }
    assert_eq!(pool.stats().spares, 1);

    let first = pool.get_spare_image();
    let second = pool.get_spare_image();
    assert_eq!(pool.stats().spares, 2);
    drop((first, second));
    assert_eq!(pool.stats().total, 1);
    Ok(())
}

#[test]
#[serial]
fn test_concurrent_recycle_and_growth() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_gv();
    let pool = BufferPool::new(stream.clone());
    pool.acquire_initial(16, 256)?;

    let mut images = Vec::new();
    for frame_id in 0..16 {
        stream.complete_next(frame_id, BufferStatus::Success);
        let buffer = stream.pop_completed().ok_or("no buffer")?;
        images.push(pool.wrap(buffer).map_err(|_| "wrap failed")?);
    }
    let ids: Vec<u64> = images.iter().filter_map(|image| image.buffer_id()).collect();

    let chunks: Vec<Vec<_>> = {
        let mut chunks = vec![Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        for (i, image) in images.into_iter().enumerate() {
            chunks[i % 4].push(image);
        }
        chunks
    };

    let grower = {
        let pool = pool.clone();
        thread::spawn(move || {
            for _ in 0..8 {
                if pool.allocate_additional(1).is_err() {
                    return false;
                }
            }
            true
        })
    };
    let droppers: Vec<_> = chunks
        .into_iter()
        .map(|chunk| thread::spawn(move || drop(chunk)))
        .collect();

    for dropper in droppers {
        dropper.join().map_err(|_| "dropper panicked")?;
    }
    assert!(grower.join().map_err(|_| "grower panicked")?);

    let stats = pool.stats();
    assert_eq!(stats.total, 24);
    assert_eq!(stats.loaned, 0);
    assert_eq!(stream.n_queued(), 24);
    for id in ids {
        assert_eq!(stream.push_count(id), 2, "buffer {id} returned twice");
    }
    Ok(())
}

#[test]
fn test_pool_outlives_images() -> Result<(), Box<dyn Error>> {
    let stream = MockStream::new_usb();
    let image = {
        let pool = BufferPool::new(stream.clone() as Arc<dyn Stream>);
        pool.acquire_initial(1, 16)?;
        stream.complete_next(1, BufferStatus::Success);
        let buffer = stream.pop_completed().ok_or("no buffer")?;
        pool.wrap(buffer).map_err(|_| "wrap failed")?
    };

    drop(image);
    assert_eq!(stream.n_queued(), 1);
    Ok(())
}
