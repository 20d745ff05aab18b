// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_genicam::{
    control::{parse_string_args, ControlError, FeatureTable},
    device::UsbMode,
    lifecycle::CameraSettings,
    publish::Topics,
};
use serde_json::json;
use std::path::PathBuf;
use zenoh::config::{Config, WhatAmI};

/// Command-line arguments for the EdgeFirst GenICam publisher.
///
/// Every option can also be given through the environment variable named
/// next to it.
///
/// # Example
///
/// ```bash
/// # Publish the first camera found, two channels with their own formats
/// edgefirst-genicam --channel-names left,right --pixel-formats BayerRG8,Mono8
///
/// # Via environment variables
/// export GUID=Basler-12345678
/// export USE_PTP_TIMESTAMP=true
/// edgefirst-genicam
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera to open, the first camera found when absent
    #[arg(short, long, env = "GUID")]
    pub guid: Option<String>,

    /// Comma separated stream channel names
    #[arg(long, env = "CHANNEL_NAMES", default_value = "")]
    pub channel_names: String,

    /// Comma separated pixel format per channel, empty keeps the camera's
    #[arg(long, env = "PIXEL_FORMATS", default_value = "")]
    pub pixel_formats: String,

    /// Comma separated calibration url per channel, empty uses
    /// <serial>.json
    #[arg(long, env = "CAMERA_INFO_URLS", default_value = "")]
    pub camera_info_urls: String,

    /// Frame id stamped on every header
    #[arg(long, env = "FRAME_ID", default_value = "camera")]
    pub frame_id: String,

    /// Stamp frames with the camera's PTP clock instead of host time
    #[arg(long, env = "USE_PTP_TIMESTAMP")]
    pub use_ptp_timestamp: bool,

    /// Publish exposure, gain, black level, white balance and temperature
    /// with every frame
    #[arg(long, env = "EXTENDED_CAMERA_INFO")]
    pub extended_camera_info: bool,

    /// USB3 Vision transfer mode (default, sync or async)
    #[arg(long, env = "USB_MODE", default_value = "default")]
    pub usb_mode: String,

    /// Trigger the camera in software at this rate in Hz
    #[arg(long, env = "SOFTWARE_TRIGGER_RATE")]
    pub software_trigger_rate: Option<f64>,

    /// JSON file of features written at startup
    #[arg(long, env = "FEATURES_FILE")]
    pub features_file: Option<PathBuf>,

    /// Publish this camera's auto exposure, gain and white balance
    #[arg(long, env = "AUTO_MASTER")]
    pub auto_master: bool,

    /// Follow the auto parameters published by a master camera
    #[arg(long, env = "AUTO_SLAVE", conflicts_with = "auto_master")]
    pub auto_slave: bool,

    /// Zenoh topic for images (sensor_msgs/Image)
    #[arg(long, env = "IMAGE_TOPIC", default_value = "rt/camera/image")]
    pub image_topic: String,

    /// Zenoh topic for camera calibration info (sensor_msgs/CameraInfo)
    #[arg(long, env = "INFO_TOPIC", default_value = "rt/camera/info")]
    pub info_topic: String,

    /// Zenoh topic for extended camera info (JSON)
    #[arg(
        long,
        env = "EXTENDED_INFO_TOPIC",
        default_value = "rt/camera/extended_info"
    )]
    pub extended_info_topic: String,

    /// Zenoh topic for auto parameters (JSON)
    #[arg(long, env = "AUTO_TOPIC", default_value = "rt/camera/auto")]
    pub auto_topic: String,

    /// Frames waiting to be published per channel before new frames are
    /// dropped
    #[arg(long, env = "PUBLISH_QUEUE", default_value = "2")]
    pub publish_queue: usize,

    /// Use the built-in simulated camera
    #[arg(long, env = "SIMULATE")]
    pub simulate: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,

    /// Zenoh participant mode (peer, client, or router)
    #[arg(long, env = "MODE", default_value = "peer")]
    mode: WhatAmI,

    /// Zenoh endpoints to connect to (can specify multiple)
    #[arg(long, env = "CONNECT")]
    connect: Vec<String>,

    /// Zenoh endpoints to listen on (can specify multiple)
    #[arg(long, env = "LISTEN")]
    listen: Vec<String>,

    /// Disable Zenoh multicast peer discovery
    #[arg(long, env = "NO_MULTICAST_SCOUTING")]
    no_multicast_scouting: bool,
}

impl Args {
    pub fn topics(&self) -> Topics {
        Topics {
            image: self.image_topic.clone(),
            info: self.info_topic.clone(),
            extended_info: self.extended_info_topic.clone(),
            auto: self.auto_topic.clone(),
        }
    }

    /// Camera settings for these arguments. Fails when the features file
    /// cannot be read.
    pub fn camera_settings(&self) -> Result<CameraSettings, ControlError> {
        let feature_table = match &self.features_file {
            Some(path) => FeatureTable::load(path)?,
            None => FeatureTable::default(),
        };

        Ok(CameraSettings {
            guid: self.guid.clone().filter(|guid| !guid.is_empty()),
            channel_names: parse_string_args(&self.channel_names),
            pixel_formats: parse_string_args(&self.pixel_formats),
            camera_info_urls: parse_string_args(&self.camera_info_urls),
            frame_id: self.frame_id.clone(),
            use_ptp_timestamp: self.use_ptp_timestamp,
            extended_camera_info: self.extended_camera_info,
            usb_mode: UsbMode::from_arg(&self.usb_mode),
            software_trigger_rate: self.software_trigger_rate,
            feature_table,
            auto_master: self.auto_master,
            auto_slave: self.auto_slave,
            ..Default::default()
        })
    }
}

impl TryFrom<&Args> for Config {
    type Error = zenoh::Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let mut config = Config::default();

        config.insert_json5("mode", &json!(args.mode).to_string())?;

        if !args.connect.is_empty() {
            config.insert_json5("connect/endpoints", &json!(args.connect).to_string())?;
        }

        if !args.listen.is_empty() {
            config.insert_json5("listen/endpoints", &json!(args.listen).to_string())?;
        }

        if args.no_multicast_scouting {
            config.insert_json5("scouting/multicast/enabled", &json!(false).to_string())?;
        }

        Ok(config)
    }
}
