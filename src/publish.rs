// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Zenoh publish sinks.
//!
//! Images and calibration are serialized as CDR `sensor_msgs/Image` and
//! `sensor_msgs/CameraInfo`. Telemetry and auto parameters are published as
//! JSON. Serialization and network writes run on the tokio runtime, fed by
//! a bounded queue, so the stream callback thread never waits on the
//! network. A frame that finds the queue full is dropped and its buffer
//! returns to the pool.

use crate::{
    calibration::CameraInfo,
    image::Header,
    lifecycle::SinkFactory,
    pool::RecyclableImage,
    sink::{ImageSink, MessageSink, NullSink, SubscriberChangeFn},
    telemetry::{AutoController, AutoParameters, ExtendedCameraInfo},
};
use cdr::{CdrLe, Infinite};
use edgefirst_schemas::{
    builtin_interfaces::Time,
    sensor_msgs::{self, RegionOfInterest},
    std_msgs,
};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};
use zenoh::{pubsub::Publisher, Session, Wait};

/// Topic names of one camera.
#[derive(Clone, Debug)]
pub struct Topics {
    pub image: String,
    pub info: String,
    pub extended_info: String,
    pub auto: String,
}

impl Default for Topics {
    fn default() -> Self {
        Topics {
            image: "rt/camera/image".to_string(),
            info: "rt/camera/info".to_string(),
            extended_info: "rt/camera/extended_info".to_string(),
            auto: "rt/camera/auto".to_string(),
        }
    }
}

/// Topic of a channel: `base` for the unnamed channel, `base/name`
/// otherwise.
pub fn channel_topic(base: &str, name: &str) -> String {
    if name.is_empty() {
        base.to_owned()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

/// Sink factory publishing over a Zenoh session.
pub struct ZenohSinks {
    session: Session,
    runtime: Handle,
    topics: Topics,
    queue: usize,
}

impl ZenohSinks {
    /// `queue` bounds the frames waiting to be serialized per channel.
    pub fn new(session: Session, runtime: Handle, topics: Topics, queue: usize) -> Self {
        ZenohSinks {
            session,
            runtime,
            topics,
            queue: queue.max(1),
        }
    }

    fn publisher(&self, topic: &str) -> Option<Publisher<'static>> {
        match self.session.declare_publisher(topic.to_owned()).wait() {
            Ok(publisher) => Some(publisher),
            Err(error) => {
                error!(topic, %error, "failed to declare publisher");
                None
            }
        }
    }

    fn message_sink<T>(&self, topic: String) -> Arc<dyn MessageSink<T>>
    where
        T: Serialize + Send + 'static,
    {
        let Some(publisher) = self.publisher(&topic) else {
            return Arc::new(NullSink);
        };
        let (tx, rx) = kanal::bounded_async::<T>(self.queue);
        self.runtime.spawn(async move {
            while let Ok(message) = rx.recv().await {
                let bytes = match serde_json::to_vec(&message) {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        warn!(topic, %error, "failed to serialize message");
                        continue;
                    }
                };
                if let Err(error) = publisher.put(bytes).await {
                    warn!(topic, %error, "failed to publish message");
                }
            }
            debug!(topic, "message publisher closed");
        });
        Arc::new(ZenohMessageSink {
            tx: tx.to_sync(),
        })
    }
}

impl SinkFactory for ZenohSinks {
    fn image_sink(
        &self,
        index: usize,
        name: &str,
        on_change: SubscriberChangeFn,
    ) -> Arc<dyn ImageSink> {
        let image_topic = channel_topic(&self.topics.image, name);
        let info_topic = channel_topic(&self.topics.info, name);
        let (Some(image_pub), Some(info_pub)) =
            (self.publisher(&image_topic), self.publisher(&info_topic))
        else {
            warn!(channel = index, "image sink unavailable, frames will be dropped");
            return Arc::new(NullSink);
        };

        let subscribers = Arc::new(AtomicUsize::new(0));
        let listener = {
            let subscribers = subscribers.clone();
            let topic = image_topic.clone();
            image_pub
                .matching_listener()
                .callback(move |status| {
                    let matching = status.matching();
                    info!(topic, matching, "image subscribers changed");
                    subscribers.store(usize::from(matching), Ordering::Release);
                    on_change();
                })
                .background()
                .wait()
        };
        if let Err(error) = listener {
            // Without notifications the sink reports a subscriber so that
            // acquisition runs unconditionally.
            warn!(channel = index, %error, "failed to watch subscribers, assuming one");
            subscribers.store(1, Ordering::Release);
        }
        match image_pub.matching_status().wait() {
            Ok(status) if status.matching() => subscribers.store(1, Ordering::Release),
            Ok(_) => {}
            Err(error) => debug!(channel = index, %error, "matching status unavailable"),
        }

        let (tx, rx) = kanal::bounded_async::<(RecyclableImage, CameraInfo)>(self.queue);
        self.runtime.spawn(async move {
            while let Ok((image, info)) = rx.recv().await {
                publish_frame(&image_pub, &info_pub, image, info).await;
            }
            debug!(topic = image_topic, "image publisher closed");
        });

        Arc::new(ZenohImageSink {
            index,
            subscribers,
            tx: tx.to_sync(),
            dropped: AtomicU64::new(0),
        })
    }

    fn extended_info_sink(
        &self,
        _index: usize,
        name: &str,
    ) -> Arc<dyn MessageSink<ExtendedCameraInfo>> {
        self.message_sink(channel_topic(&self.topics.extended_info, name))
    }

    fn auto_sink(&self) -> Arc<dyn MessageSink<AutoParameters>> {
        self.message_sink(self.topics.auto.clone())
    }
}

struct ZenohImageSink {
    index: usize,
    subscribers: Arc<AtomicUsize>,
    tx: kanal::Sender<(RecyclableImage, CameraInfo)>,
    dropped: AtomicU64,
}

impl ImageSink for ZenohImageSink {
    fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Acquire)
    }

    fn publish(&self, image: RecyclableImage, info: CameraInfo) {
        match self.tx.try_send((image, info)) {
            Ok(true) => {}
            Ok(false) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(channel = self.index, dropped, "publisher busy, frame dropped");
            }
            Err(error) => warn!(channel = self.index, %error, "image publisher closed"),
        }
    }
}

struct ZenohMessageSink<T> {
    tx: kanal::Sender<T>,
}

impl<T: Send> MessageSink<T> for ZenohMessageSink<T> {
    fn publish(&self, message: T) {
        if let Ok(false) = self.tx.try_send(message) {
            trace!("publisher busy, message dropped");
        }
    }
}

async fn publish_frame(
    image_pub: &Publisher<'static>,
    info_pub: &Publisher<'static>,
    image: RecyclableImage,
    info: CameraInfo,
) {
    let header = ros_header(&image.header);
    let msg = sensor_msgs::Image {
        header: header.clone(),
        height: image.height,
        width: image.width,
        encoding: image.encoding.clone(),
        is_bigendian: u8::from(image.is_bigendian),
        step: image.step,
        data: image.data().to_vec(),
    };
    // Recycle the buffer before waiting on the network.
    drop(image);

    match cdr::serialize::<_, _, CdrLe>(&msg, Infinite) {
        Ok(bytes) => {
            if let Err(error) = image_pub.put(bytes).await {
                warn!(%error, "failed to publish image");
            }
        }
        Err(error) => warn!(%error, "failed to serialize image"),
    }

    let msg = camera_info_message(header, info);
    match cdr::serialize::<_, _, CdrLe>(&msg, Infinite) {
        Ok(bytes) => {
            if let Err(error) = info_pub.put(bytes).await {
                warn!(%error, "failed to publish camera info");
            }
        }
        Err(error) => warn!(%error, "failed to serialize camera info"),
    }
}

fn ros_header(header: &Header) -> std_msgs::Header {
    std_msgs::Header {
        stamp: Time {
            sec: header.sec(),
            nanosec: header.nanosec(),
        },
        frame_id: header.frame_id.clone(),
    }
}

fn camera_info_message(header: std_msgs::Header, info: CameraInfo) -> sensor_msgs::CameraInfo {
    sensor_msgs::CameraInfo {
        header,
        height: info.height,
        width: info.width,
        distortion_model: info.distortion_model,
        d: info.d,
        k: info.k,
        r: info.r,
        p: info.p,
        binning_x: info.binning_x,
        binning_y: info.binning_y,
        roi: RegionOfInterest {
            x_offset: 0,
            y_offset: 0,
            height: info.height,
            width: info.width,
            do_rectify: false,
        },
    }
}

/// Follows the auto parameters published by a master camera on `topic`.
/// The subscription lives as long as the session.
pub async fn follow_auto_master(
    session: &Session,
    topic: &str,
    controller: Arc<AutoController>,
) -> Result<(), zenoh::Error> {
    session
        .declare_subscriber(topic.to_owned())
        .callback(move |sample| {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<AutoParameters>(&payload) {
                Ok(master) => controller.apply(&master),
                Err(error) => warn!(%error, "invalid auto parameters from master"),
            }
        })
        .background()
        .await?;
    info!(topic, "following auto parameter master");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_topic() {
        assert_eq!(channel_topic("rt/camera/image", ""), "rt/camera/image");
        assert_eq!(
            channel_topic("rt/camera/image", "left"),
            "rt/camera/image/left"
        );
        assert_eq!(channel_topic("rt/camera/", "left"), "rt/camera/left");
    }

    #[test]
    fn test_camera_info_roi() {
        let info = CameraInfo {
            width: 640,
            height: 480,
            ..Default::default()
        };
        let msg = camera_info_message(ros_header(&Header::default()), info);
        assert_eq!(msg.roi.width, 640);
        assert_eq!(msg.roi.height, 480);
        assert_eq!(msg.k, [0.0; 9]);
    }
}
