// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-frame camera telemetry.
//!
//! [`ExtendedInfoReader`] reads exposure, gain, black level, white balance
//! and temperature. Vendors expose these under different feature names, so
//! readings are resolved once per channel against a strategy table: vendor
//! specific candidates come first, then the standard (SFNC) names. The first
//! candidate whose features are usable wins; a field with no usable
//! candidate reads as NaN.
//!
//! [`AutoController`] keeps the auto-parameter snapshot used to mirror one
//! camera's automatic exposure, gain and white balance onto another.
//!
//! Selector-dependent reads and writes must run under
//! [`DeviceHandle::lock_selectors`]. [`ExtendedInfoReader::read`] expects the
//! caller to hold the lock; [`AutoController`] takes it itself.

use crate::{
    calibration::CameraInfo,
    device::DeviceHandle,
    features::FeatureMap,
    genicam::{self, legacy},
    image::Header,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const VENDOR_BASLER: &str = "Basler";
pub const VENDOR_JAI: &str = "JAI Corporation";
pub const VENDOR_TIS: &str = "The Imaging Source Europe GmbH";

const GAIN_AUTO_BALANCE: &str = "GainAutoBalance";
const BLACK_LEVEL_AUTO: &str = "BlackLevelAuto";
const BLACK_LEVEL_AUTO_BALANCE: &str = "BlackLevelAutoBalance";
const BALANCE_WHITE_AUTO: &str = "BalanceWhiteAuto";
const TIS_WHITE_BALANCE: [&str; 3] = [
    "WhiteBalanceRedRegister",
    "WhiteBalanceGreenRegister",
    "WhiteBalanceBlueRegister",
];
const TIS_WHITE_BALANCE_SCALE: f64 = 255.0;

/// Telemetry published alongside each frame, with the calibration published
/// for the same frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExtendedCameraInfo {
    pub header: Header,
    pub camera_info: CameraInfo,
    pub exposure_time: f64,
    pub gain: f64,
    pub black_level: f64,
    pub white_balance_red: f64,
    pub white_balance_green: f64,
    pub white_balance_blue: f64,
    pub temperature: f64,
}

impl ExtendedCameraInfo {
    fn empty(header: Header) -> Self {
        ExtendedCameraInfo {
            header,
            camera_info: CameraInfo::default(),
            exposure_time: f64::NAN,
            gain: f64::NAN,
            black_level: f64::NAN,
            white_balance_red: f64::NAN,
            white_balance_green: f64::NAN,
            white_balance_blue: f64::NAN,
            temperature: f64::NAN,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    ExposureTime,
    Gain,
    BlackLevel,
    WhiteBalanceRed,
    WhiteBalanceGreen,
    WhiteBalanceBlue,
    Temperature,
}

const FIELDS: [Field; 7] = [
    Field::ExposureTime,
    Field::Gain,
    Field::BlackLevel,
    Field::WhiteBalanceRed,
    Field::WhiteBalanceGreen,
    Field::WhiteBalanceBlue,
    Field::Temperature,
];

/// Where a reading comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Source {
    /// A float feature.
    Float(&'static str),
    /// An integer feature divided by `scale`.
    Integer {
        feature: &'static str,
        scale: f64,
    },
    /// A feature read after writing `selection` to `selector`.
    Selected {
        feature: &'static str,
        selector: &'static str,
        selection: &'static str,
        integer: bool,
    },
    /// A fixed value, used where reading is too slow for the frame rate.
    Constant(f64),
}

impl Source {
    fn is_usable(&self, features: &FeatureMap) -> bool {
        match self {
            Source::Float(feature) | Source::Integer { feature, .. } => {
                features.is_usable(feature)
            }
            Source::Selected {
                feature, selector, ..
            } => features.all_usable(&[*feature, *selector]),
            Source::Constant(_) => true,
        }
    }

    fn read(&self, device: &DeviceHandle) -> f64 {
        match *self {
            Source::Float(feature) => device.get_float(feature),
            Source::Integer { feature, scale } => device.get_integer(feature) as f64 / scale,
            Source::Selected {
                feature,
                selector,
                selection,
                integer,
            } => {
                device.set_string(selector, selection);
                if integer {
                    device.get_integer(feature) as f64
                } else {
                    device.get_float(feature)
                }
            }
            Source::Constant(value) => value,
        }
    }
}

/// One entry of the strategy table. `vendor: None` entries are the standard
/// names every vendor falls back to.
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub vendor: Option<&'static str>,
    pub field: Field,
    pub source: Source,
}

const fn vendor(vendor: &'static str, field: Field, source: Source) -> Candidate {
    Candidate {
        vendor: Some(vendor),
        field,
        source,
    }
}

const fn standard(field: Field, source: Source) -> Candidate {
    Candidate {
        vendor: None,
        field,
        source,
    }
}

const fn selected(
    feature: &'static str,
    selector: &'static str,
    selection: &'static str,
) -> Source {
    Source::Selected {
        feature,
        selector,
        selection,
        integer: false,
    }
}

pub const CANDIDATES: &[Candidate] = &[
    vendor(VENDOR_BASLER, Field::ExposureTime, Source::Float(legacy::EXPOSURE_TIME_ABS)),
    vendor(
        VENDOR_BASLER,
        Field::Gain,
        Source::Integer {
            feature: "GainRaw",
            scale: 1.0,
        },
    ),
    vendor(
        VENDOR_BASLER,
        Field::BlackLevel,
        Source::Selected {
            feature: "BlackLevelRaw",
            selector: genicam::BLACK_LEVEL_SELECTOR,
            selection: "All",
            integer: true,
        },
    ),
    vendor(
        VENDOR_BASLER,
        Field::WhiteBalanceRed,
        selected("BalanceRatioAbs", genicam::BALANCE_RATIO_SELECTOR, "Red"),
    ),
    vendor(
        VENDOR_BASLER,
        Field::WhiteBalanceGreen,
        selected("BalanceRatioAbs", genicam::BALANCE_RATIO_SELECTOR, "Green"),
    ),
    vendor(
        VENDOR_BASLER,
        Field::WhiteBalanceBlue,
        selected("BalanceRatioAbs", genicam::BALANCE_RATIO_SELECTOR, "Blue"),
    ),
    vendor(VENDOR_BASLER, Field::Temperature, Source::Float("TemperatureAbs")),
    // Reading these registers on JAI cameras drops the frame rate below 10 fps.
    vendor(VENDOR_JAI, Field::BlackLevel, Source::Constant(0.0)),
    vendor(VENDOR_JAI, Field::WhiteBalanceRed, Source::Constant(1.0)),
    vendor(VENDOR_JAI, Field::WhiteBalanceGreen, Source::Constant(1.0)),
    vendor(VENDOR_JAI, Field::WhiteBalanceBlue, Source::Constant(1.0)),
    vendor(
        VENDOR_TIS,
        Field::WhiteBalanceRed,
        Source::Integer {
            feature: TIS_WHITE_BALANCE[0],
            scale: TIS_WHITE_BALANCE_SCALE,
        },
    ),
    vendor(
        VENDOR_TIS,
        Field::WhiteBalanceGreen,
        Source::Integer {
            feature: TIS_WHITE_BALANCE[1],
            scale: TIS_WHITE_BALANCE_SCALE,
        },
    ),
    vendor(
        VENDOR_TIS,
        Field::WhiteBalanceBlue,
        Source::Integer {
            feature: TIS_WHITE_BALANCE[2],
            scale: TIS_WHITE_BALANCE_SCALE,
        },
    ),
    standard(Field::ExposureTime, Source::Float(genicam::EXPOSURE_TIME)),
    standard(Field::Gain, Source::Float(genicam::GAIN)),
    standard(
        Field::BlackLevel,
        selected(genicam::BLACK_LEVEL, genicam::BLACK_LEVEL_SELECTOR, "All"),
    ),
    standard(Field::BlackLevel, Source::Float(genicam::BLACK_LEVEL)),
    standard(
        Field::WhiteBalanceRed,
        selected(genicam::BALANCE_RATIO, genicam::BALANCE_RATIO_SELECTOR, "Red"),
    ),
    standard(
        Field::WhiteBalanceGreen,
        selected(genicam::BALANCE_RATIO, genicam::BALANCE_RATIO_SELECTOR, "Green"),
    ),
    standard(
        Field::WhiteBalanceBlue,
        selected(genicam::BALANCE_RATIO, genicam::BALANCE_RATIO_SELECTOR, "Blue"),
    ),
    standard(Field::Temperature, Source::Float(genicam::DEVICE_TEMPERATURE)),
];

/// Extended camera info reader resolved for one device.
#[derive(Clone, Debug)]
pub struct ExtendedInfoReader {
    plan: Vec<(Field, Source)>,
}

impl ExtendedInfoReader {
    /// Resolves the strategy table for `vendor` against the device's usable
    /// features.
    pub fn new(vendor: &str, features: &FeatureMap) -> Self {
        Self::with_candidates(vendor, features, CANDIDATES)
    }

    pub fn with_candidates(vendor: &str, features: &FeatureMap, candidates: &[Candidate]) -> Self {
        let vendor_first = candidates
            .iter()
            .filter(|c| c.vendor == Some(vendor))
            .chain(candidates.iter().filter(|c| c.vendor.is_none()));

        let mut plan: Vec<(Field, Source)> = Vec::new();
        for candidate in vendor_first {
            if plan.iter().any(|(field, _)| *field == candidate.field) {
                continue;
            }
            if candidate.source.is_usable(features) {
                plan.push((candidate.field, candidate.source));
            }
        }
        plan.sort_by_key(|(field, _)| FIELDS.iter().position(|f| f == field));

        debug!(vendor, readings = plan.len(), "extended camera info resolved");
        ExtendedInfoReader { plan }
    }

    /// The resolved source of each field, in field order.
    pub fn plan(&self) -> &[(Field, Source)] {
        &self.plan
    }

    /// Reads the current values. The caller must hold the selector lock.
    pub fn read(&self, device: &DeviceHandle, header: Header) -> ExtendedCameraInfo {
        let mut info = ExtendedCameraInfo::empty(header);
        for (field, source) in &self.plan {
            let value = source.read(device);
            match field {
                Field::ExposureTime => info.exposure_time = value,
                Field::Gain => info.gain = value,
                Field::BlackLevel => info.black_level = value,
                Field::WhiteBalanceRed => info.white_balance_red = value,
                Field::WhiteBalanceGreen => info.white_balance_green = value,
                Field::WhiteBalanceBlue => info.white_balance_blue = value,
                Field::Temperature => info.temperature = value,
            }
        }
        info
    }
}

/// Snapshot of the automatically controlled camera parameters. Values the
/// camera does not provide are NaN.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AutoParameters {
    pub exposure_time: f64,
    pub gain: f64,
    pub gain_red: f64,
    pub gain_green: f64,
    pub gain_blue: f64,
    pub black_level: f64,
    pub bl_red: f64,
    pub bl_green: f64,
    pub bl_blue: f64,
    pub wb_red: f64,
    pub wb_green: f64,
    pub wb_blue: f64,
}

impl Default for AutoParameters {
    fn default() -> Self {
        AutoParameters {
            exposure_time: f64::NAN,
            gain: f64::NAN,
            gain_red: f64::NAN,
            gain_green: f64::NAN,
            gain_blue: f64::NAN,
            black_level: f64::NAN,
            bl_red: f64::NAN,
            bl_green: f64::NAN,
            bl_blue: f64::NAN,
            wb_red: f64::NAN,
            wb_green: f64::NAN,
            wb_blue: f64::NAN,
        }
    }
}

/// Whether `master` should be written over `current`. NaN on the master
/// side means the master camera has no such value.
fn changed(current: f64, master: f64) -> bool {
    !master.is_nan() && current != master
}

/// Reads and mirrors auto parameters on one device.
pub struct AutoController {
    device: DeviceHandle,
    features: Arc<FeatureMap>,
    tis: bool,
    current: Mutex<AutoParameters>,
}

impl AutoController {
    pub fn new(device: DeviceHandle, features: Arc<FeatureMap>) -> Self {
        let tis = device.vendor_name() == VENDOR_TIS;
        AutoController {
            device,
            features,
            tis,
            current: Mutex::new(AutoParameters::default()),
        }
    }

    /// The last synced or applied snapshot.
    pub fn current(&self) -> AutoParameters {
        *self.current.lock()
    }

    /// Reads the auto parameters from the device and stores them as the
    /// current snapshot.
    pub fn sync(&self) -> AutoParameters {
        let params = {
            let _selectors = self.device.lock_selectors();
            self.read()
        };
        *self.current.lock() = params;
        params
    }

    fn read(&self) -> AutoParameters {
        let device = &self.device;
        let features = &self.features;
        let mut params = AutoParameters::default();

        if features.is_usable(genicam::EXPOSURE_TIME) {
            params.exposure_time = device.get_float(genicam::EXPOSURE_TIME);
        }

        if features.is_usable(genicam::GAIN) {
            let selectable = features.is_usable(genicam::GAIN_SELECTOR);
            if selectable {
                device.set_string(genicam::GAIN_SELECTOR, "All");
            }
            params.gain = device.get_float(genicam::GAIN);
            if selectable {
                let [r, g, b] = self.read_rgb(genicam::GAIN_SELECTOR, genicam::GAIN);
                (params.gain_red, params.gain_green, params.gain_blue) = (r, g, b);
            }
        }

        if features.is_usable(genicam::BLACK_LEVEL) {
            let selectable = features.is_usable(genicam::BLACK_LEVEL_SELECTOR);
            if selectable {
                device.set_string(genicam::BLACK_LEVEL_SELECTOR, "All");
            }
            params.black_level = device.get_float(genicam::BLACK_LEVEL);
            if selectable {
                let [r, g, b] = self.read_rgb(genicam::BLACK_LEVEL_SELECTOR, genicam::BLACK_LEVEL);
                (params.bl_red, params.bl_green, params.bl_blue) = (r, g, b);
            }
        }

        if self.tis {
            let [r, g, b] =
                TIS_WHITE_BALANCE.map(|reg| device.get_integer(reg) as f64 / TIS_WHITE_BALANCE_SCALE);
            (params.wb_red, params.wb_green, params.wb_blue) = (r, g, b);
        } else if features.all_usable(&[genicam::BALANCE_RATIO, genicam::BALANCE_RATIO_SELECTOR]) {
            let [r, g, b] = self.read_rgb(genicam::BALANCE_RATIO_SELECTOR, genicam::BALANCE_RATIO);
            (params.wb_red, params.wb_green, params.wb_blue) = (r, g, b);
        }

        params
    }

    fn read_rgb(&self, selector: &str, feature: &str) -> [f64; 3] {
        ["Red", "Green", "Blue"].map(|selection| {
            self.device.set_string(selector, selection);
            self.device.get_float(feature)
        })
    }

    /// Turns off every automatic control so the device can follow a master,
    /// then syncs the snapshot.
    pub fn make_slave(&self) -> AutoParameters {
        for feature in [
            genicam::EXPOSURE_AUTO,
            genicam::GAIN_AUTO,
            GAIN_AUTO_BALANCE,
            BLACK_LEVEL_AUTO,
            BLACK_LEVEL_AUTO_BALANCE,
            BALANCE_WHITE_AUTO,
        ] {
            if self.features.is_usable(feature) {
                self.device.set_string(feature, "Off");
            }
        }
        info!("auto functions disabled, following auto master");
        self.sync()
    }

    /// Writes every value of the master snapshot that differs from the
    /// current one, then adopts the master snapshot.
    pub fn apply(&self, master: &AutoParameters) {
        let mut current = self.current.lock();
        let device = &self.device;
        let features = &self.features;
        let _selectors = device.lock_selectors();

        if features.is_usable(genicam::EXPOSURE_TIME)
            && changed(current.exposure_time, master.exposure_time)
        {
            device.set_float(genicam::EXPOSURE_TIME, master.exposure_time);
        }

        if features.is_usable(genicam::GAIN) {
            let selectable = features.is_usable(genicam::GAIN_SELECTOR);
            if changed(current.gain, master.gain) {
                if selectable {
                    device.set_string(genicam::GAIN_SELECTOR, "All");
                }
                device.set_float(genicam::GAIN, master.gain);
            }
            if selectable {
                self.write_rgb(
                    genicam::GAIN_SELECTOR,
                    genicam::GAIN,
                    [current.gain_red, current.gain_green, current.gain_blue],
                    [master.gain_red, master.gain_green, master.gain_blue],
                );
            }
        }

        if features.is_usable(genicam::BLACK_LEVEL) {
            let selectable = features.is_usable(genicam::BLACK_LEVEL_SELECTOR);
            if changed(current.black_level, master.black_level) {
                if selectable {
                    device.set_string(genicam::BLACK_LEVEL_SELECTOR, "All");
                }
                device.set_float(genicam::BLACK_LEVEL, master.black_level);
            }
            if selectable {
                self.write_rgb(
                    genicam::BLACK_LEVEL_SELECTOR,
                    genicam::BLACK_LEVEL,
                    [current.bl_red, current.bl_green, current.bl_blue],
                    [master.bl_red, master.bl_green, master.bl_blue],
                );
            }
        }

        let master_wb = [master.wb_red, master.wb_green, master.wb_blue];
        if self.tis {
            for (register, wb) in TIS_WHITE_BALANCE.iter().zip(master_wb) {
                if !wb.is_nan() {
                    device.set_integer(register, (wb * TIS_WHITE_BALANCE_SCALE) as i64);
                }
            }
        } else if features.all_usable(&[genicam::BALANCE_RATIO, genicam::BALANCE_RATIO_SELECTOR]) {
            self.write_rgb(
                genicam::BALANCE_RATIO_SELECTOR,
                genicam::BALANCE_RATIO,
                [current.wb_red, current.wb_green, current.wb_blue],
                master_wb,
            );
        }

        *current = *master;
    }

    fn write_rgb(&self, selector: &str, feature: &str, current: [f64; 3], master: [f64; 3]) {
        for ((selection, now), want) in ["Red", "Green", "Blue"].iter().zip(current).zip(master) {
            if changed(now, want) {
                self.device.set_string(selector, selection);
                self.device.set_float(feature, want);
            }
        }
    }
}
