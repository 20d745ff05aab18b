// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Typed access to a GenICam device.
//!
//! [`Device`] is the capability layer a transport backend provides: typed
//! feature get/set, bounds, region, payload size, stream creation and named
//! commands. Every call reports failure as a [`DeviceError`] value.
//!
//! [`DeviceHandle`] is what the rest of the crate holds. It never fails:
//! errors are logged with the feature name, the attempted value and the
//! device error text, and the call returns the type's default. Higher level
//! flows (open, stream creation, discovery) check for empty results and
//! branch instead.

use crate::{genicam::FeatureTree, stream::Stream};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors reported by the device capability layer.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("feature {0} not found")]
    NotFound(String),

    #[error("feature {feature} is {actual}, not {expected}")]
    TypeMismatch {
        feature: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("feature {0} is not writable")]
    ReadOnly(String),

    #[error("value {value} is out of range for {feature}")]
    OutOfRange { feature: String, value: String },

    #[error("{domain} error {code}: {message}")]
    Sdk {
        domain: String,
        code: i32,
        message: String,
    },

    #[error("no device matching {0}")]
    NoDevice(String),

    #[error("control of the device was lost")]
    ControlLost,
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// A typed feature value as read from or written to a device.
///
/// Deserializes untagged so that a JSON feature table maps `true` to
/// [`FeatureValue::Boolean`], `2` to [`FeatureValue::Integer`], `2.0` to
/// [`FeatureValue::Float`] and `"Off"` to [`FeatureValue::String`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl FeatureValue {
    /// Name of the value's GenICam interface type.
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureValue::Boolean(_) => "boolean",
            FeatureValue::Integer(_) => "integer",
            FeatureValue::Float(_) => "float",
            FeatureValue::String(_) => "string",
        }
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Boolean(value)
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        FeatureValue::Integer(value)
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Float(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::String(value.to_owned())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::String(value)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Boolean(v) => write!(f, "{v}"),
            FeatureValue::Integer(v) => write!(f, "{v}"),
            FeatureValue::Float(v) => write!(f, "{v}"),
            FeatureValue::String(v) => f.write_str(v),
        }
    }
}

/// Physical transport used by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// GigE Vision, network streaming with packet resend.
    GigEVision,
    /// USB3 Vision.
    Usb3Vision,
    Other,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::GigEVision => "GigEVision",
            Transport::Usb3Vision => "USB3Vision",
            Transport::Other => "Other",
        })
    }
}

/// USB3 Vision transfer mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UsbMode {
    #[default]
    Default,
    Sync,
    Async,
}

impl UsbMode {
    /// Parses an operator supplied mode from its first letter, case
    /// insensitive. Anything unrecognised selects [`UsbMode::Default`].
    pub fn from_arg(arg: &str) -> UsbMode {
        match arg.chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('s') => UsbMode::Sync,
            Some('a') => UsbMode::Async,
            Some('d') => UsbMode::Default,
            Some(_) => {
                warn!(
                    mode = arg,
                    "unrecognized USB mode (recognized modes: sync, async and default), using default"
                );
                UsbMode::Default
            }
            None => {
                warn!("empty USB mode (recognized modes: sync, async and default), using default");
                UsbMode::Default
            }
        }
    }
}

/// Active sensor region of interest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}, {}", self.x, self.y, self.width, self.height)
    }
}

/// Inclusive range reported for an integer or float feature.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

/// Callback invoked from the device layer when control of the device is
/// lost. Runs on a device owned thread.
pub type ControlLostFn = Arc<dyn Fn() + Send + Sync>;

/// Capability layer implemented by a GenICam transport backend.
///
/// Implementations must be callable from several threads at once: stream
/// callbacks, the software trigger thread and the control plane all share one
/// device.
pub trait Device: Send + Sync {
    fn transport(&self) -> Transport;

    /// The device's self-describing feature tree, if it could be loaded.
    fn feature_tree(&self) -> Option<Arc<dyn FeatureTree>>;

    fn get_boolean(&self, feature: &str) -> Result<bool>;
    fn set_boolean(&self, feature: &str, value: bool) -> Result<()>;
    fn get_integer(&self, feature: &str) -> Result<i64>;
    fn set_integer(&self, feature: &str, value: i64) -> Result<()>;
    fn get_float(&self, feature: &str) -> Result<f64>;
    fn set_float(&self, feature: &str, value: f64) -> Result<()>;
    fn get_string(&self, feature: &str) -> Result<String>;
    fn set_string(&self, feature: &str, value: &str) -> Result<()>;

    fn integer_bounds(&self, feature: &str) -> Result<Bounds<i64>>;
    fn float_bounds(&self, feature: &str) -> Result<Bounds<f64>>;

    /// Executes a GenICam command feature such as `AcquisitionStart`.
    fn execute_command(&self, feature: &str) -> Result<()>;

    fn region(&self) -> Result<Region>;
    fn set_region(&self, region: Region) -> Result<()>;

    /// Full sensor width and height in pixels.
    fn sensor_size(&self) -> Result<(i64, i64)>;

    /// Bytes per frame on the currently selected stream channel.
    fn payload_size(&self) -> Result<usize>;

    /// Selects the stream channel subsequent stream calls apply to. Only
    /// meaningful on GigE Vision devices.
    fn select_stream_channel(&self, channel: usize) -> Result<()>;

    /// Creates a stream on the currently selected channel.
    fn create_stream(&self) -> Result<Arc<dyn Stream>>;

    fn set_usb_mode(&self, mode: UsbMode) -> Result<()>;

    /// Registers the control-lost listener, replacing any previous one.
    fn on_control_lost(&self, callback: ControlLostFn);
}

/// Shared, error-translating handle to an opened [`Device`].
///
/// Clones share the device and the selector lock. The selector lock must be
/// held across any select-then-read or select-then-write sequence, since a
/// selector feature is global device state shared by every channel.
#[derive(Clone)]
pub struct DeviceHandle {
    device: Arc<dyn Device>,
    selectors: Arc<Mutex<()>>,
}

impl DeviceHandle {
    pub fn new(device: Arc<dyn Device>) -> Self {
        DeviceHandle {
            device,
            selectors: Arc::new(Mutex::new(())),
        }
    }

    /// The underlying capability layer.
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn transport(&self) -> Transport {
        self.device.transport()
    }

    pub fn is_gv(&self) -> bool {
        self.transport() == Transport::GigEVision
    }

    pub fn is_uv(&self) -> bool {
        self.transport() == Transport::Usb3Vision
    }

    /// Locks the device's selector critical section.
    pub fn lock_selectors(&self) -> MutexGuard<'_, ()> {
        self.selectors.lock()
    }

    pub fn feature_tree(&self) -> Option<Arc<dyn FeatureTree>> {
        self.device.feature_tree()
    }

    pub fn vendor_name(&self) -> String {
        self.get_string("DeviceVendorName")
    }

    pub fn get_boolean(&self, feature: &str) -> bool {
        read(feature, self.device.get_boolean(feature))
    }

    pub fn set_boolean(&self, feature: &str, value: bool) -> bool {
        write(feature, value, self.device.set_boolean(feature, value))
    }

    pub fn get_integer(&self, feature: &str) -> i64 {
        read(feature, self.device.get_integer(feature))
    }

    pub fn set_integer(&self, feature: &str, value: i64) -> bool {
        write(feature, value, self.device.set_integer(feature, value))
    }

    pub fn get_float(&self, feature: &str) -> f64 {
        read(feature, self.device.get_float(feature))
    }

    pub fn set_float(&self, feature: &str, value: f64) -> bool {
        write(feature, value, self.device.set_float(feature, value))
    }

    pub fn get_string(&self, feature: &str) -> String {
        read(feature, self.device.get_string(feature))
    }

    pub fn set_string(&self, feature: &str, value: &str) -> bool {
        write(feature, value, self.device.set_string(feature, value))
    }

    /// Writes a value through the setter matching its type.
    pub fn set_value(&self, feature: &str, value: &FeatureValue) -> bool {
        match value {
            FeatureValue::Boolean(v) => self.set_boolean(feature, *v),
            FeatureValue::Integer(v) => self.set_integer(feature, *v),
            FeatureValue::Float(v) => self.set_float(feature, *v),
            FeatureValue::String(v) => self.set_string(feature, v),
        }
    }

    pub fn integer_bounds(&self, feature: &str) -> Bounds<i64> {
        read(feature, self.device.integer_bounds(feature))
    }

    pub fn float_bounds(&self, feature: &str) -> Bounds<f64> {
        read(feature, self.device.float_bounds(feature))
    }

    pub fn execute_command(&self, feature: &str) -> bool {
        match self.device.execute_command(feature) {
            Ok(()) => {
                debug!(feature, "command executed");
                true
            }
            Err(error) => {
                warn!(feature, %error, "command failed");
                false
            }
        }
    }

    pub fn region(&self) -> Region {
        read("Region", self.device.region())
    }

    pub fn set_region(&self, region: Region) -> bool {
        write("Region", region, self.device.set_region(region))
    }

    pub fn sensor_size(&self) -> (i64, i64) {
        read("SensorSize", self.device.sensor_size())
    }

    pub fn payload_size(&self) -> usize {
        read("PayloadSize", self.device.payload_size())
    }

    pub fn select_stream_channel(&self, channel: usize) -> bool {
        write(
            "GevStreamChannelSelector",
            channel,
            self.device.select_stream_channel(channel),
        )
    }

    /// Creates a stream on the selected channel, or `None` if the device
    /// refused.
    pub fn create_stream(&self) -> Option<Arc<dyn Stream>> {
        match self.device.create_stream() {
            Ok(stream) => Some(stream),
            Err(error) => {
                warn!(%error, "stream creation failed");
                None
            }
        }
    }

    pub fn set_usb_mode(&self, mode: UsbMode) -> bool {
        write(
            "UsbMode",
            format!("{mode:?}"),
            self.device.set_usb_mode(mode),
        )
    }

    pub fn on_control_lost(&self, callback: ControlLostFn) {
        self.device.on_control_lost(callback)
    }
}

fn read<T: Default>(feature: &str, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            warn!(feature, %error, "feature read failed");
            T::default()
        }
    }
}

fn write(feature: &str, value: impl fmt::Display, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(error) => {
            warn!(feature, %value, %error, "feature write failed");
            false
        }
    }
}

/// Enumerates and opens devices on a transport backend.
pub trait DeviceProvider: Send + Sync {
    /// Identifiers of the devices currently visible.
    fn device_ids(&self) -> Vec<String>;

    /// Opens the device with the given identifier, or the first device when
    /// `id` is `None`.
    fn open(&self, id: Option<&str>) -> Result<Arc<dyn Device>>;
}
