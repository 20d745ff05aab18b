// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Camera calibration collaborator.
//!
//! A [`CalibrationManager`] loads one channel's calibration from a JSON file
//! when the channel is configured. The dispatcher reads it once per frame
//! through [`CalibrationProvider`].
//!
//! Two layouts are accepted. The ROS camera calibration layout:
//!
//! ```json
//! {
//!   "image_width": 1920, "image_height": 1080,
//!   "distortion_model": "plumb_bob",
//!   "camera_matrix": { "rows": 3, "cols": 3, "data": [ ... ] },
//!   "distortion_coefficients": { "rows": 1, "cols": 5, "data": [ ... ] },
//!   "rectification_matrix": { "rows": 3, "cols": 3, "data": [ ... ] },
//!   "projection_matrix": { "rows": 3, "cols": 4, "data": [ ... ] }
//! }
//! ```
//!
//! and the ISP dewarp layout, `{"dewarpConfigArray": [{"camera_matrix": [..9],
//! "distortion_coeff": [..]}]}`, which carries no image size.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};
use thiserror::Error;
use tracing::{debug, info, warn};

const IDENTITY: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("unsupported calibration url {0}")]
    UnsupportedUrl(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Intrinsic calibration of one channel. A width or height of zero means
/// the calibration does not state the image size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub width: u32,
    pub height: u32,
    pub distortion_model: String,
    pub d: Vec<f64>,
    pub k: [f64; 9],
    pub r: [f64; 9],
    pub p: [f64; 12],
    pub binning_x: u32,
    pub binning_y: u32,
}

impl Default for CameraInfo {
    fn default() -> Self {
        CameraInfo {
            width: 0,
            height: 0,
            distortion_model: String::new(),
            d: Vec::new(),
            k: [0.0; 9],
            r: [0.0; 9],
            p: [0.0; 12],
            binning_x: 0,
            binning_y: 0,
        }
    }
}

impl CameraInfo {
    /// Reads a calibration document in either supported layout.
    pub fn from_json(json: &serde_json::Value) -> Result<CameraInfo, CalibrationError> {
        if json.get("dewarpConfigArray").is_some() {
            return Self::from_dewarp(json);
        }

        let doc: RosCalibration = serde_json::from_value(json.clone())
            .map_err(|e| CalibrationError::Invalid(e.to_string()))?;
        Ok(CameraInfo {
            width: doc.image_width,
            height: doc.image_height,
            distortion_model: doc.distortion_model,
            d: doc.distortion_coefficients.data,
            k: fixed(&doc.camera_matrix.data, "camera_matrix")?,
            r: match doc.rectification_matrix {
                Some(r) => fixed(&r.data, "rectification_matrix")?,
                None => IDENTITY,
            },
            p: match doc.projection_matrix {
                Some(p) => fixed(&p.data, "projection_matrix")?,
                None => projection(&fixed(&doc.camera_matrix.data, "camera_matrix")?),
            },
            binning_x: 1,
            binning_y: 1,
        })
    }

    fn from_dewarp(json: &serde_json::Value) -> Result<CameraInfo, CalibrationError> {
        let Some(config) = json["dewarpConfigArray"].as_array().and_then(|a| a.first()) else {
            return Err(CalibrationError::Invalid(
                "did not find dewarpConfigArray as an array".to_string(),
            ));
        };

        let d = numbers(&config["distortion_coeff"])
            .ok_or_else(|| CalibrationError::Invalid("did not find distortion_coeff".to_string()))?;
        let k = numbers(&config["camera_matrix"])
            .ok_or_else(|| CalibrationError::Invalid("did not find camera_matrix".to_string()))?;
        let k = fixed(&k, "camera_matrix")?;

        Ok(CameraInfo {
            width: 0,
            height: 0,
            distortion_model: "plumb_bob".to_string(),
            d,
            k,
            r: IDENTITY,
            p: projection(&k),
            binning_x: 1,
            binning_y: 1,
        })
    }

    /// Reads the calibration at `url`, a plain path or a `file://` url.
    pub fn load(url: &str) -> Result<CameraInfo, CalibrationError> {
        let path = match url.strip_prefix("file://") {
            Some(path) => path,
            None if url.contains("://") => {
                return Err(CalibrationError::UnsupportedUrl(url.to_owned()))
            }
            None => url,
        };

        let file = File::open(Path::new(path)).map_err(|source| CalibrationError::Io {
            path: path.to_owned(),
            source,
        })?;
        let json: serde_json::Value =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                CalibrationError::Json {
                    path: path.to_owned(),
                    source,
                }
            })?;
        Self::from_json(&json)
    }
}

#[derive(Deserialize)]
struct Matrix {
    data: Vec<f64>,
}

#[derive(Deserialize)]
struct RosCalibration {
    #[serde(default)]
    image_width: u32,
    #[serde(default)]
    image_height: u32,
    #[serde(default = "plumb_bob")]
    distortion_model: String,
    camera_matrix: Matrix,
    distortion_coefficients: Matrix,
    rectification_matrix: Option<Matrix>,
    projection_matrix: Option<Matrix>,
}

fn plumb_bob() -> String {
    "plumb_bob".to_string()
}

fn numbers(value: &serde_json::Value) -> Option<Vec<f64>> {
    value
        .as_array()
        .map(|v| v.iter().map(|x| x.as_f64().unwrap_or(0.0)).collect())
}

fn fixed<const N: usize>(data: &[f64], name: &str) -> Result<[f64; N], CalibrationError> {
    data.try_into().map_err(|_| {
        CalibrationError::Invalid(format!(
            "expected exactly {N} elements in {name} but found {}",
            data.len()
        ))
    })
}

fn projection(k: &[f64; 9]) -> [f64; 12] {
    [
        k[0], k[1], k[2], 0.0, k[3], k[4], k[5], 0.0, k[6], k[7], k[8], 0.0,
    ]
}

/// Source of the current calibration of one channel.
pub trait CalibrationProvider: Send + Sync {
    fn camera_info(&self) -> CameraInfo;
}

/// File backed calibration of one channel.
pub struct CalibrationManager {
    channel: String,
    url: String,
    info: Mutex<CameraInfo>,
}

impl CalibrationManager {
    /// Loads the calibration at `url`. A failed load is logged and leaves
    /// the channel with an empty calibration.
    pub fn new(channel: &str, url: &str) -> Self {
        let info = match CameraInfo::load(url) {
            Ok(info) => {
                info!(channel, url, "loaded camera calibration");
                info
            }
            Err(error) => {
                warn!(channel, url, %error, "camera calibration not loaded, publishing uncalibrated");
                CameraInfo::default()
            }
        };

        CalibrationManager {
            channel: channel.to_owned(),
            url: url.to_owned(),
            info: Mutex::new(info),
        }
    }

    /// A manager holding `info` without touching the filesystem.
    pub fn with_info(channel: &str, info: CameraInfo) -> Self {
        CalibrationManager {
            channel: channel.to_owned(),
            url: String::new(),
            info: Mutex::new(info),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_camera_info(&self, info: CameraInfo) {
        debug!(channel = self.channel, "camera calibration replaced");
        *self.info.lock() = info;
    }
}

impl CalibrationProvider for CalibrationManager {
    fn camera_info(&self) -> CameraInfo {
        self.info.lock().clone()
    }
}

/// Default calibration url when none is configured: `<serial>.json`, or
/// `<device id>.json` when the device reports no serial number.
pub fn default_url(serial_number: &str, device_id: &str) -> String {
    if serial_number.is_empty() {
        format!("{device_id}.json")
    } else {
        format!("{serial_number}.json")
    }
}
