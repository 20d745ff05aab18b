// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Stream dispatch.
//!
//! [`StreamChannel::on_buffer_ready`] runs once per buffer-ready event on the
//! stream's callback thread. It pops the completed buffer, keeps the fill
//! queue from running dry, drops bad or unwanted frames straight back to the
//! stream, and otherwise stamps, converts and publishes the frame along with
//! its calibration and telemetry.

use crate::{
    calibration::{CalibrationProvider, CameraInfo},
    convert::ConversionFn,
    device::DeviceHandle,
    features::FeatureMap,
    image::{Header, SensorDescription},
    pool::BufferPool,
    ptp,
    sink::{ImageSink, MessageSink},
    stream::{BufferStatus, Stream},
    telemetry::{AutoController, AutoParameters, ExtendedCameraInfo, ExtendedInfoReader},
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{error, instrument, trace, warn};

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// State shared by every channel of one device.
pub struct DeviceContext {
    pub device: DeviceHandle,
    pub features: Arc<FeatureMap>,
    /// Stamp frames with the device's PTP time instead of host time.
    pub use_ptp_timestamp: bool,
    /// Reader for per-frame telemetry, when enabled.
    pub extended_info: Option<ExtendedInfoReader>,
    /// Auto-parameter master: the snapshot is synced and published after
    /// every buffer-ready event, whether or not a frame was published.
    pub auto_master: Option<(Arc<AutoController>, Arc<dyn MessageSink<AutoParameters>>)>,
}

impl DeviceContext {
    pub fn new(device: DeviceHandle, features: Arc<FeatureMap>) -> Self {
        DeviceContext {
            device,
            features,
            use_ptp_timestamp: false,
            extended_info: None,
            auto_master: None,
        }
    }
}

/// Why a frame was not published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    BadStatus(BufferStatus),
    NoPool,
    NoSubscribers,
}

/// Result of one dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event had no completed buffer behind it.
    Spurious,
    /// The buffer went straight back to the stream.
    Dropped(DropReason),
    /// The frame with this sequence number was published.
    Published(u64),
}

/// Frame identifier for a channel: the base frame id, the channel name, or
/// `frame_id/channel` when both are set.
pub fn channel_frame_id(frame_id: &str, channel: &str) -> String {
    match (frame_id.is_empty(), channel.is_empty()) {
        (_, true) => frame_id.to_owned(),
        (true, false) => channel.to_owned(),
        (false, false) => format!("{frame_id}/{channel}"),
    }
}

/// Bounds the warnings logged for bad buffer statuses on one channel. The
/// first occurrence of a status is always logged; repeats within the
/// interval are counted and reported with the next logged line.
#[derive(Debug, Default)]
pub struct StatusLimiter {
    seen: HashMap<BufferStatus, (Instant, u64)>,
}

impl StatusLimiter {
    /// Returns `Some(suppressed)` when `status` should be logged now.
    pub fn check(&mut self, status: BufferStatus, now: Instant) -> Option<u64> {
        match self.seen.get_mut(&status) {
            None => {
                self.seen.insert(status, (now, 0));
                Some(0)
            }
            Some((last, suppressed)) => {
                if now.duration_since(*last) < STATUS_LOG_INTERVAL {
                    *suppressed += 1;
                    None
                } else {
                    let count = *suppressed;
                    *last = now;
                    *suppressed = 0;
                    Some(count)
                }
            }
        }
    }
}

/// Everything a channel needs besides its device context.
pub struct ChannelSetup {
    pub index: usize,
    pub name: String,
    /// Base frame id, combined with the channel name.
    pub frame_id: String,
    pub stream: Arc<dyn Stream>,
    pub pool: Option<BufferPool>,
    pub sensor: SensorDescription,
    pub conversion: Option<ConversionFn>,
    pub sink: Arc<dyn ImageSink>,
    pub calibration: Arc<dyn CalibrationProvider>,
    pub extended_sink: Option<Arc<dyn MessageSink<ExtendedCameraInfo>>>,
}

/// Dispatch state of one stream channel.
pub struct StreamChannel {
    index: usize,
    name: String,
    frame_id: String,
    stream: Arc<dyn Stream>,
    pool: Option<BufferPool>,
    sensor: SensorDescription,
    conversion: Option<ConversionFn>,
    sink: Arc<dyn ImageSink>,
    calibration: Arc<dyn CalibrationProvider>,
    extended_sink: Option<Arc<dyn MessageSink<ExtendedCameraInfo>>>,
    context: Arc<DeviceContext>,
    status_log: Mutex<StatusLimiter>,
    calibration_warned: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl StreamChannel {
    pub fn new(setup: ChannelSetup, context: Arc<DeviceContext>) -> Self {
        StreamChannel {
            index: setup.index,
            frame_id: channel_frame_id(&setup.frame_id, &setup.name),
            name: setup.name,
            stream: setup.stream,
            pool: setup.pool,
            sensor: setup.sensor,
            conversion: setup.conversion,
            sink: setup.sink,
            calibration: setup.calibration,
            extended_sink: setup.extended_sink,
            context,
            status_log: Mutex::new(StatusLimiter::default()),
            calibration_warned: AtomicBool::new(false),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The frame id stamped on this channel's headers.
    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn stream(&self) -> &Arc<dyn Stream> {
        &self.stream
    }

    pub fn pool(&self) -> Option<&BufferPool> {
        self.pool.as_ref()
    }

    pub fn sensor(&self) -> &SensorDescription {
        &self.sensor
    }

    pub fn sink(&self) -> &Arc<dyn ImageSink> {
        &self.sink
    }

    /// Frames published so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames handed straight back to the stream so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Handles one buffer-ready event.
    #[instrument(level = "trace", skip_all, fields(channel = self.index))]
    pub fn on_buffer_ready(&self) -> DispatchOutcome {
        let outcome = self.dispatch();
        if let Some((controller, sink)) = &self.context.auto_master {
            sink.publish(controller.sync());
        }
        outcome
    }

    fn dispatch(&self) -> DispatchOutcome {
        let buffer = self.stream.try_pop_buffer();

        if self.stream.n_buffers().0 == 0 {
            if let Some(pool) = &self.pool {
                if let Err(error) = pool.allocate_additional(1) {
                    error!(channel = self.index, %error, "failed to grow buffer pool");
                }
            }
        }

        let Some(buffer) = buffer else {
            return DispatchOutcome::Spurious;
        };

        let reason = if buffer.status != BufferStatus::Success {
            Some(DropReason::BadStatus(buffer.status))
        } else if self.pool.is_none() {
            Some(DropReason::NoPool)
        } else if self.sink.subscriber_count() == 0 {
            Some(DropReason::NoSubscribers)
        } else {
            None
        };

        let pool = match (reason, &self.pool) {
            (None, Some(pool)) => pool,
            (reason, _) => {
                let reason = reason.unwrap_or(DropReason::NoPool);
                if let DropReason::BadStatus(status) = reason {
                    self.log_status(status, buffer.frame_id);
                }
                trace!(channel = self.index, frame_id = buffer.frame_id, ?reason, "frame dropped");
                self.stream.push_buffer(buffer);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return DispatchOutcome::Dropped(reason);
            }
        };

        let header = Header {
            stamp_ns: if self.context.use_ptp_timestamp {
                buffer.timestamp_ns
            } else {
                buffer.system_timestamp_ns
            },
            seq: buffer.frame_id,
            frame_id: self.frame_id.clone(),
        };

        let mut image = match pool.wrap(buffer) {
            Ok(image) => image,
            Err(buffer) => {
                self.stream.push_buffer(buffer);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return DispatchOutcome::Dropped(DropReason::BadStatus(BufferStatus::Unknown));
            }
        };
        image.header = header.clone();
        image.width = self.sensor.width;
        image.height = self.sensor.height;
        image.encoding.clone_from(&self.sensor.pixel_format);
        image.is_bigendian = false;
        image.step = self.sensor.step();

        let image = match &self.conversion {
            Some(convert) => {
                let mut converted = pool.get_spare_image();
                converted.copy_format(&image);
                convert(&image, &mut converted);
                drop(image);
                converted.header = header.clone();
                converted
            }
            None => image,
        };

        let mut info = self.calibration.camera_info();
        if info.width == 0 || info.height == 0 {
            if !self.calibration_warned.swap(true, Ordering::AcqRel) {
                warn!(
                    channel = self.index,
                    width = self.sensor.width,
                    height = self.sensor.height,
                    "camera calibration does not state the image size, using the region of interest"
                );
            }
            info.width = self.sensor.width;
            info.height = self.sensor.height;
        }

        let seq = header.seq;
        self.sink.publish(image, info.clone());
        self.published.fetch_add(1, Ordering::Relaxed);

        self.publish_telemetry(header, info);
        DispatchOutcome::Published(seq)
    }

    fn publish_telemetry(&self, header: Header, camera_info: CameraInfo) {
        let context = &self.context;

        if let (Some(reader), Some(sink)) = (&context.extended_info, &self.extended_sink) {
            let mut extended = {
                let _selectors = context.device.lock_selectors();
                if context.device.is_gv() {
                    context.device.select_stream_channel(self.index);
                }
                reader.read(&context.device, header)
            };
            extended.camera_info = camera_info;
            sink.publish(extended);
        }

        if context.use_ptp_timestamp {
            ptp::check_and_reset(&context.device);
        }
    }

    fn log_status(&self, status: BufferStatus, frame_id: u64) {
        if let Some(suppressed) = self.status_log.lock().check(status, Instant::now()) {
            warn!(
                channel = self.index,
                frame_id,
                %status,
                suppressed,
                "buffer completed with bad status, frame dropped"
            );
        }
    }
}

impl fmt::Debug for StreamChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamChannel")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("frame_id", &self.frame_id)
            .field("sensor", &self.sensor)
            .field("pool", &self.pool)
            .finish()
    }
}
