// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Native buffer pool for one stream channel.
//!
//! The pool allocates native buffers sized to the negotiated payload and
//! hands them to the stream for filling. Completed buffers are wrapped into
//! [`RecyclableImage`]s without copying; dropping the image returns the
//! buffer to the stream's fill queue.
//!
//! Every buffer is always in exactly one of these places:
//!
//! 1. idle in the pool (only after [`BufferPool::detach`]),
//! 2. owned by the stream, queued for filling or waiting to be popped,
//! 3. loaned out inside a [`RecyclableImage`],
//! 4. being freed after a [`BufferPool::shrink`] request.
//!
//! Ownership of [`NativeBuffer`] moves between these places, so a buffer
//! cannot be returned twice. Growth only touches atomics and the stream's
//! queue and is safe while images are in flight on other threads.
//!
//! # Example
//!
//! ```
//! use edgefirst_genicam::{mock::MockStream, pool::BufferPool, stream::BufferStatus};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = MockStream::new_usb();
//! let pool = BufferPool::new(stream.clone());
//! pool.acquire_initial(10, 1024)?;
//!
//! stream.complete_next(1, BufferStatus::Success);
//! let buffer = stream.pop_completed().ok_or("no buffer")?;
//! let image = pool.wrap(buffer).map_err(|_| "bad buffer")?;
//! assert_eq!(pool.stats().loaned, 1);
//!
//! // Dropping the image queues the buffer for filling again.
//! drop(image);
//! assert_eq!(stream.n_queued(), 10);
//! # Ok(())
//! # }
//! ```

use crate::{
    image::Header,
    stream::{BufferStatus, NativeBuffer, Stream},
};
use crossbeam_queue::SegQueue;
use std::{
    fmt, mem,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to allocate {count} buffers of {size} bytes")]
    Allocation { count: usize, size: usize },
}

/// Point-in-time pool accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Native buffers currently owned by the pool in any state.
    pub total: usize,
    /// Native buffers loaned out as images.
    pub loaned: usize,
    /// Native buffers parked in the pool.
    pub idle: usize,
    /// Shrink requests not yet honoured.
    pub pending_shrink: usize,
    /// Spare conversion buffers allocated so far.
    pub spares: usize,
}

struct PoolInner {
    stream: Arc<dyn Stream>,
    buffer_size: AtomicUsize,
    next_id: AtomicU64,
    total: AtomicUsize,
    loaned: AtomicUsize,
    idle: SegQueue<NativeBuffer>,
    pending_shrink: AtomicUsize,
    detached: AtomicBool,
    spares: SegQueue<Vec<u8>>,
    spares_total: AtomicUsize,
}

impl PoolInner {
    fn recycle(&self, buffer: NativeBuffer) {
        if self
            .pending_shrink
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            self.total.fetch_sub(1, Ordering::AcqRel);
            self.loaned.fetch_sub(1, Ordering::AcqRel);
            debug!(buffer = buffer.id(), "buffer freed after shrink request");
            return;
        }

        if self.detached.load(Ordering::Acquire) {
            self.idle.push(buffer);
        } else {
            self.stream.push_buffer(buffer);
        }
        self.loaned.fetch_sub(1, Ordering::AcqRel);
    }

    fn recycle_spare(&self, mut data: Vec<u8>) {
        data.clear();
        self.spares.push(data);
    }
}

/// Pool of native acquisition buffers for one stream.
///
/// Cloning shares the pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(stream: Arc<dyn Stream>) -> Self {
        BufferPool {
            inner: Arc::new(PoolInner {
                stream,
                buffer_size: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
                total: AtomicUsize::new(0),
                loaned: AtomicUsize::new(0),
                idle: SegQueue::new(),
                pending_shrink: AtomicUsize::new(0),
                detached: AtomicBool::new(false),
                spares: SegQueue::new(),
                spares_total: AtomicUsize::new(0),
            }),
        }
    }

    /// The stream this pool feeds.
    pub fn stream(&self) -> &Arc<dyn Stream> {
        &self.inner.stream
    }

    /// Size in bytes of every buffer this pool allocates.
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size.load(Ordering::Acquire)
    }

    /// Allocates `count` buffers of `buffer_size` bytes and queues all of
    /// them on the stream.
    pub fn acquire_initial(&self, count: usize, buffer_size: usize) -> Result<(), PoolError> {
        self.inner.buffer_size.store(buffer_size, Ordering::Release);
        info!(
            pool_size = count,
            buffer_size, "allocating buffer pool"
        );
        self.allocate(count)
    }

    /// Grows the pool by `n` buffers and queues them on the stream
    /// immediately.
    pub fn allocate_additional(&self, n: usize) -> Result<(), PoolError> {
        let old_size = self.inner.total.load(Ordering::Acquire);
        warn!(
            old_size,
            new_size = old_size + n,
            "stream starved of buffers, growing pool"
        );
        self.allocate(n)
    }

    fn allocate(&self, n: usize) -> Result<(), PoolError> {
        let size = self.buffer_size();
        for _ in 0..n {
            let mut data = Vec::new();
            data.try_reserve_exact(size)
                .map_err(|_| PoolError::Allocation { count: n, size })?;
            data.resize(size, 0);

            let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
            self.inner.total.fetch_add(1, Ordering::AcqRel);
            self.inner.stream.push_buffer(NativeBuffer::new(id, data));
        }
        Ok(())
    }

    /// Wraps a completed buffer into an image without copying.
    ///
    /// A buffer whose status is not [`BufferStatus::Success`] is handed back
    /// unchanged; the caller must return it to the stream.
    pub fn wrap(&self, buffer: NativeBuffer) -> Result<RecyclableImage, NativeBuffer> {
        if buffer.status != BufferStatus::Success {
            return Err(buffer);
        }

        self.inner.loaned.fetch_add(1, Ordering::AcqRel);
        Ok(RecyclableImage {
            header: Header::default(),
            width: 0,
            height: 0,
            encoding: String::new(),
            is_bigendian: false,
            step: 0,
            memory: Memory::Native(buffer),
            pool: self.inner.clone(),
        })
    }

    /// Returns an empty image backed by pool owned memory, used as the
    /// destination of a format conversion.
    pub fn get_spare_image(&self) -> RecyclableImage {
        let data = match self.inner.spares.pop() {
            Some(data) => data,
            None => {
                self.inner.spares_total.fetch_add(1, Ordering::AcqRel);
                Vec::with_capacity(self.buffer_size())
            }
        };

        RecyclableImage {
            header: Header::default(),
            width: 0,
            height: 0,
            encoding: String::new(),
            is_bigendian: false,
            step: 0,
            memory: Memory::Spare(data),
            pool: self.inner.clone(),
        }
    }

    /// Schedules up to `n` buffers to be freed as their images are dropped.
    /// The pool never shrinks below one buffer. Returns the number of
    /// buffers scheduled.
    pub fn shrink(&self, n: usize) -> usize {
        let total = self.inner.total.load(Ordering::Acquire);
        let mut scheduled = 0;
        let _ = self
            .inner
            .pending_shrink
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                let room = total.saturating_sub(1).saturating_sub(pending);
                scheduled = n.min(room);
                Some(pending + scheduled)
            });
        scheduled
    }

    /// Stops returning buffers to the stream. Buffers returned after this
    /// are parked idle until [`BufferPool::release_idle`].
    pub fn detach(&self) {
        self.inner.detached.store(true, Ordering::Release);
    }

    /// Frees every idle buffer. Returns the number freed.
    pub fn release_idle(&self) -> usize {
        let mut freed = 0;
        while self.inner.idle.pop().is_some() {
            self.inner.total.fetch_sub(1, Ordering::AcqRel);
            freed += 1;
        }
        freed
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.inner.total.load(Ordering::Acquire),
            loaned: self.inner.loaned.load(Ordering::Acquire),
            idle: self.inner.idle.len(),
            pending_shrink: self.inner.pending_shrink.load(Ordering::Acquire),
            spares: self.inner.spares_total.load(Ordering::Acquire),
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.buffer_size())
            .field("stats", &self.stats())
            .finish()
    }
}

enum Memory {
    Native(NativeBuffer),
    Spare(Vec<u8>),
}

/// Image backed by pool memory.
///
/// A wrapped native buffer goes back to the stream's fill queue when the
/// image is dropped. A spare image returns its memory to the pool's spare
/// list.
pub struct RecyclableImage {
    pub header: Header,
    pub width: u32,
    pub height: u32,
    /// Image encoding, a pixel format name or a converted encoding.
    pub encoding: String,
    pub is_bigendian: bool,
    /// Bytes per row.
    pub step: u32,
    memory: Memory,
    pool: Arc<PoolInner>,
}

impl RecyclableImage {
    pub fn data(&self) -> &[u8] {
        match &self.memory {
            Memory::Native(buffer) => buffer.data(),
            Memory::Spare(data) => data,
        }
    }

    /// Mutable pixel memory. A native buffer keeps the stream's payload
    /// size.
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.memory {
            Memory::Native(buffer) => buffer.data_mut(),
            Memory::Spare(data) => data,
        }
    }

    /// Resizable memory of a spare image, `None` for a native buffer.
    /// Conversions resize spare images to fit their output.
    pub fn spare_data_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.memory {
            Memory::Native(_) => None,
            Memory::Spare(data) => Some(data),
        }
    }

    /// Whether the image wraps a native acquisition buffer.
    pub fn is_native(&self) -> bool {
        matches!(self.memory, Memory::Native(_))
    }

    /// Identity of the wrapped native buffer.
    pub fn buffer_id(&self) -> Option<u64> {
        match &self.memory {
            Memory::Native(buffer) => Some(buffer.id()),
            Memory::Spare(_) => None,
        }
    }

    /// Copies the geometry and encoding of another image.
    pub fn copy_format(&mut self, other: &RecyclableImage) {
        self.width = other.width;
        self.height = other.height;
        self.encoding.clone_from(&other.encoding);
        self.is_bigendian = other.is_bigendian;
        self.step = other.step;
    }
}

impl Drop for RecyclableImage {
    fn drop(&mut self) {
        match mem::replace(&mut self.memory, Memory::Spare(Vec::new())) {
            Memory::Native(buffer) => self.pool.recycle(buffer),
            Memory::Spare(data) => self.pool.recycle_spare(data),
        }
    }
}

impl fmt::Debug for RecyclableImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecyclableImage")
            .field("header", &self.header)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoding", &self.encoding)
            .field("step", &self.step)
            .field("buffer", &self.buffer_id())
            .finish()
    }
}

impl fmt::Display for RecyclableImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {}x{} {} step {}",
            self.header.frame_id, self.header.seq, self.width, self.height, self.encoding, self.step
        )
    }
}
