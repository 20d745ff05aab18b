// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_genicam::{
    device::{DeviceHandle, FeatureValue, Transport},
    features::{discover_features, FeatureMap},
    genicam::{self, legacy},
    image::Header,
    mock::MockDevice,
    ptp,
    telemetry::{
        AutoController, AutoParameters, ExtendedInfoReader, Field, Source, VENDOR_BASLER,
        VENDOR_JAI, VENDOR_TIS,
    },
};
use std::{error::Error, sync::Arc};

fn open(device: &Arc<MockDevice>) -> (DeviceHandle, Arc<FeatureMap>) {
    let handle = DeviceHandle::new(device.clone());
    let features = Arc::new(discover_features(&handle));
    (handle, features)
}

fn header(seq: u64) -> Header {
    Header {
        stamp_ns: 1_000,
        seq,
        frame_id: "camera".to_string(),
    }
}

#[test]
fn test_basler_readings() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .vendor(VENDOR_BASLER)
        .feature(legacy::EXPOSURE_TIME_ABS, 5_000.0)
        .feature("GainRaw", 36i64)
        .feature(genicam::BLACK_LEVEL_SELECTOR, "All")
        .feature("BlackLevelRaw", 32i64)
        .feature(genicam::BALANCE_RATIO_SELECTOR, "Red")
        .feature("BalanceRatioAbs", 1.0)
        .selected(
            "BalanceRatioAbs",
            genicam::BALANCE_RATIO_SELECTOR,
            &[
                ("Red", 2.0.into()),
                ("Green", 1.0.into()),
                ("Blue", 1.5.into()),
            ],
        )
        .feature("TemperatureAbs", 38.0)
        .feature(genicam::DEVICE_TEMPERATURE, 50.0)
        .build();
    let (handle, features) = open(&device);

    let reader = ExtendedInfoReader::new(VENDOR_BASLER, &features);
    let plan = reader.plan();
    assert_eq!(plan.len(), 7);
    assert_eq!(
        plan[0],
        (Field::ExposureTime, Source::Float(legacy::EXPOSURE_TIME_ABS))
    );
    // The vendor name wins over the standard one when both are usable.
    assert_eq!(plan[6], (Field::Temperature, Source::Float("TemperatureAbs")));

    let info = {
        let _selectors = handle.lock_selectors();
        reader.read(&handle, header(3))
    };
    assert_eq!(info.header, header(3));
    assert_eq!(info.exposure_time, 5_000.0);
    assert_eq!(info.gain, 36.0);
    assert_eq!(info.black_level, 32.0);
    assert_eq!(
        (info.white_balance_red, info.white_balance_green, info.white_balance_blue),
        (2.0, 1.0, 1.5)
    );
    assert_eq!(info.temperature, 38.0);
    Ok(())
}

#[test]
fn test_jai_constants() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .standard_features()
        .vendor(VENDOR_JAI)
        .build();
    let (handle, features) = open(&device);

    let reader = ExtendedInfoReader::new(VENDOR_JAI, &features);
    assert!(reader
        .plan()
        .contains(&(Field::BlackLevel, Source::Constant(0.0))));

    let info = reader.read(&handle, header(1));
    assert_eq!(info.exposure_time, 10_000.0);
    assert_eq!(info.black_level, 0.0);
    assert_eq!(
        (info.white_balance_red, info.white_balance_green, info.white_balance_blue),
        (1.0, 1.0, 1.0)
    );
    assert_eq!(info.temperature, 41.5);

    // Constant readings never touch the selectors.
    assert!(device.writes_to(genicam::BALANCE_RATIO_SELECTOR).is_empty());
    assert!(device.writes_to(genicam::BLACK_LEVEL_SELECTOR).is_empty());
    Ok(())
}

#[test]
fn test_missing_readings() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .feature(genicam::EXPOSURE_TIME, 800.0)
        .build();
    let (handle, features) = open(&device);

    let reader = ExtendedInfoReader::new("Unknown Vendor", &features);
    assert_eq!(reader.plan().len(), 1);

    let info = reader.read(&handle, header(1));
    assert_eq!(info.exposure_time, 800.0);
    for value in [
        info.gain,
        info.black_level,
        info.white_balance_red,
        info.white_balance_green,
        info.white_balance_blue,
        info.temperature,
    ] {
        assert!(value.is_nan());
    }
    Ok(())
}

#[test]
fn test_auto_sync() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let (handle, features) = open(&device);
    let controller = AutoController::new(handle, features);

    assert!(controller.current().exposure_time.is_nan());
    let params = controller.sync();
    assert_eq!(params.exposure_time, 10_000.0);
    assert_eq!(params.gain, 0.0);
    assert_eq!((params.gain_red, params.gain_green, params.gain_blue), (1.0, 0.0, 1.5));
    assert_eq!(params.black_level, 4.0);
    assert_eq!((params.wb_red, params.wb_green, params.wb_blue), (1.8, 1.0, 1.4));
    assert_eq!(controller.current().wb_red, 1.8);
    Ok(())
}

#[test]
fn test_make_slave() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let (handle, features) = open(&device);
    let controller = AutoController::new(handle, features);

    controller.make_slave();
    for feature in [genicam::EXPOSURE_AUTO, genicam::GAIN_AUTO, "BalanceWhiteAuto"] {
        assert_eq!(device.writes_to(feature), [FeatureValue::from("Off")], "{feature}");
    }
    // Absent on this camera.
    assert!(device.writes_to("GainAutoBalance").is_empty());
    assert!(device.writes_to("BlackLevelAuto").is_empty());
    assert_eq!(controller.current().exposure_time, 10_000.0);
    Ok(())
}

#[test]
fn test_apply_changed_values() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let (handle, features) = open(&device);
    let controller = AutoController::new(handle, features);
    controller.sync();
    device.clear_writes();

    let master = AutoParameters {
        exposure_time: 2_000.0,
        gain: f64::NAN,
        wb_blue: 2.0,
        ..controller.current()
    };
    controller.apply(&master);

    assert_eq!(
        device.writes_to(genicam::EXPOSURE_TIME),
        [FeatureValue::Float(2_000.0)]
    );
    assert!(device.writes_to(genicam::GAIN).is_empty());
    assert!(device.writes_to(genicam::BLACK_LEVEL).is_empty());
    assert_eq!(
        device.writes_to(genicam::BALANCE_RATIO_SELECTOR),
        [FeatureValue::from("Blue")]
    );
    assert_eq!(
        device.writes_to(genicam::BALANCE_RATIO),
        [FeatureValue::Float(2.0)]
    );
    assert_eq!(controller.current().exposure_time, 2_000.0);

    // Nothing left to change.
    device.clear_writes();
    controller.apply(&master);
    assert!(device.writes().is_empty());
    Ok(())
}

#[test]
fn test_apply_tis_registers() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .vendor(VENDOR_TIS)
        .feature("WhiteBalanceRedRegister", 255i64)
        .feature("WhiteBalanceGreenRegister", 255i64)
        .feature("WhiteBalanceBlueRegister", 510i64)
        .build();
    let (handle, features) = open(&device);
    let controller = AutoController::new(handle, features);

    let params = controller.sync();
    assert_eq!((params.wb_red, params.wb_green, params.wb_blue), (1.0, 1.0, 2.0));

    controller.apply(&AutoParameters {
        wb_red: 1.5,
        wb_blue: 2.0,
        ..Default::default()
    });
    assert_eq!(
        device.writes_to("WhiteBalanceRedRegister"),
        [FeatureValue::Integer(382)]
    );
    assert!(device.writes_to("WhiteBalanceGreenRegister").is_empty());
    assert_eq!(
        device.writes_to("WhiteBalanceBlueRegister"),
        [FeatureValue::Integer(510)]
    );
    Ok(())
}

#[test]
fn test_ptp_reset() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder().standard_features().build();
    let (handle, _) = open(&device);

    assert!(!ptp::check_and_reset(&handle));
    assert!(device.writes().is_empty());

    for status in ["Listening", "Uncalibrated", "Master"] {
        device.poke(ptp::PTP_STATUS, status);
        assert!(!ptp::check_and_reset(&handle), "{status}");
    }
    assert!(device.writes().is_empty());

    device.poke(ptp::PTP_STATUS, "Disabled");
    assert!(ptp::check_and_reset(&handle));
    assert_eq!(
        device.writes_to(ptp::PTP_ENABLE),
        [FeatureValue::Boolean(false), FeatureValue::Boolean(true)]
    );

    // A camera without PTP reads an empty status and is left alone.
    let usb = MockDevice::builder()
        .transport(Transport::Usb3Vision)
        .standard_features()
        .build();
    let (handle, _) = open(&usb);
    assert!(!ptp::check_and_reset(&handle));
    assert!(usb.writes().is_empty());
    Ok(())
}
