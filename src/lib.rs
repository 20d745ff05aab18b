// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst GenICam Library
//!
//! Acquisition bridge between GenICam cameras and a publish/subscribe
//! middleware. A camera is opened, configured and streamed through
//! [`lifecycle::Camera`]; every completed frame is stamped, optionally
//! converted and handed to an [`sink::ImageSink`] together with its
//! calibration.
//!
//! ## Features
//!
//! - **Feature Discovery**: walk the camera's GenICam feature tree once and
//!   record which features are implemented and available.
//! - **Buffer Pool**: recycle stream buffers through image wrappers whose
//!   drop returns the memory to the stream.
//! - **Stream Dispatch**: per-frame timestamping, pixel format conversion,
//!   calibration and telemetry, with bad frames dropped at the source.
//! - **PTP Supervision**: reset a camera's IEEE 1588 clock when it stops
//!   synchronising.
//! - **Zenoh Publishing**: CDR `sensor_msgs/Image` and
//!   `sensor_msgs/CameraInfo` through [`publish::ZenohSinks`].
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_genicam::{
//!     lifecycle::{Camera, CameraSettings, SinkFactory},
//!     mock::{MockDevice, MockProvider},
//!     sink::{CollectingMessages, CollectingSink, ImageSink, MessageSink, SubscriberChangeFn},
//!     telemetry::{AutoParameters, ExtendedCameraInfo},
//! };
//! use std::{sync::Arc, time::Duration};
//!
//! struct Collect;
//!
//! impl SinkFactory for Collect {
//!     fn image_sink(&self, _: usize, _: &str, _: SubscriberChangeFn) -> Arc<dyn ImageSink> {
//!         CollectingSink::new(1)
//!     }
//!     fn extended_info_sink(&self, _: usize, _: &str) -> Arc<dyn MessageSink<ExtendedCameraInfo>> {
//!         CollectingMessages::new()
//!     }
//!     fn auto_sink(&self) -> Arc<dyn MessageSink<AutoParameters>> {
//!         CollectingMessages::new()
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = MockProvider::single(MockDevice::simulated());
//! let camera = Camera::open(&provider, CameraSettings::default(), Arc::new(Collect))?;
//! camera.wait_streaming(Duration::from_secs(1));
//! camera.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod control;
pub mod convert;
pub mod device;
pub mod dispatch;
pub mod features;
pub mod genicam;
pub mod image;
pub mod lifecycle;
pub mod mock;
pub mod pool;
pub mod ptp;
pub mod publish;
pub mod sink;
pub mod stream;
pub mod telemetry;
