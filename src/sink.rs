// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Publish sink interfaces.
//!
//! Sinks take ownership of what they publish. Dropping a published image
//! returns its memory to the channel's pool, so a sink may hold on to it
//! until it has been serialized.

use crate::{calibration::CameraInfo, pool::RecyclableImage};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Invoked by a sink whenever its subscriber count changes.
pub type SubscriberChangeFn = Arc<dyn Fn() + Send + Sync>;

/// Destination of one channel's images and calibration.
pub trait ImageSink: Send + Sync {
    /// Number of subscribers currently interested in the images.
    fn subscriber_count(&self) -> usize;

    fn publish(&self, image: RecyclableImage, info: CameraInfo);
}

/// Destination of an auxiliary message stream.
pub trait MessageSink<T>: Send + Sync {
    fn publish(&self, message: T);
}

/// Sink that keeps everything it is given. Images are kept alive until
/// taken, which holds their buffers out of the pool.
#[derive(Default)]
pub struct CollectingSink {
    subscribers: AtomicUsize,
    images: Mutex<Vec<(RecyclableImage, CameraInfo)>>,
}

impl CollectingSink {
    pub fn new(subscribers: usize) -> Arc<Self> {
        Arc::new(CollectingSink {
            subscribers: AtomicUsize::new(subscribers),
            images: Mutex::new(Vec::new()),
        })
    }

    pub fn set_subscribers(&self, subscribers: usize) {
        self.subscribers.store(subscribers, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.images.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.lock().is_empty()
    }

    /// Takes every published image, oldest first.
    pub fn take(&self) -> Vec<(RecyclableImage, CameraInfo)> {
        std::mem::take(&mut *self.images.lock())
    }
}

impl ImageSink for CollectingSink {
    fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Acquire)
    }

    fn publish(&self, image: RecyclableImage, info: CameraInfo) {
        self.images.lock().push((image, info));
    }
}

/// Message sink that keeps every message.
pub struct CollectingMessages<T> {
    messages: Mutex<Vec<T>>,
}

impl<T> CollectingMessages<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(CollectingMessages {
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl<T: Send> MessageSink<T> for CollectingMessages<T> {
    fn publish(&self, message: T) {
        self.messages.lock().push(message);
    }
}

/// Sink with no subscribers, used when a publisher could not be created.
/// Every frame dispatched to it is recycled immediately.
pub struct NullSink;

impl ImageSink for NullSink {
    fn subscriber_count(&self) -> usize {
        0
    }

    fn publish(&self, _image: RecyclableImage, _info: CameraInfo) {}
}

impl<T: Send> MessageSink<T> for NullSink {
    fn publish(&self, _message: T) {}
}
