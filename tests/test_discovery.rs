// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_genicam::{
    device::{DeviceHandle, Transport},
    features::{discover_features, FeatureMap},
    genicam::{self, GenicamDocument},
    mock::MockDevice,
};
use std::error::Error;

#[test]
fn test_simulated_device() -> Result<(), Box<dyn Error>> {
    let device = MockDevice::builder()
        .transport(Transport::Usb3Vision)
        .standard_features()
        .unimplemented("ReverseX")
        .build();
    let features = discover_features(&DeviceHandle::new(device));

    for name in [
        genicam::WIDTH,
        genicam::HEIGHT,
        genicam::PIXEL_FORMAT,
        genicam::GAIN_SELECTOR,
        genicam::BALANCE_RATIO,
        genicam::TRIGGER_SOFTWARE,
        genicam::ACQUISITION_START,
    ] {
        assert!(features.is_usable(name), "{name} should be usable");
    }

    // Present but not implemented.
    assert!(features.contains("ReverseX"));
    assert!(!features.is_usable("ReverseX"));

    // Unknown names default to unusable.
    assert!(!features.contains("GevSCPSPacketSize"));
    assert!(!features.is_usable("GevSCPSPacketSize"));
    assert!(!features.all_usable(&[genicam::WIDTH, "NoSuchFeature"]));
    Ok(())
}

#[test]
fn test_indirection_cycle() -> Result<(), Box<dyn Error>> {
    let mut doc = GenicamDocument::new();
    doc.add_category("Root", &["ImageFormat"]);
    doc.add_category("ImageFormat", &["Width", "Height"]);

    let width = doc.add_feature("Integer", "Width");
    doc.add_element(width, "pValue", Some("WidthReg"));
    let width_reg = doc.add_feature("IntReg", "WidthReg");
    doc.add_element(width_reg, "pPort", Some("Loop"));

    // Two indirections naming each other.
    let a = doc.add_feature("IntSwissKnife", "Loop");
    doc.add_element(a, "pVariable", Some("LoopBack"));
    let b = doc.add_feature("IntSwissKnife", "LoopBack");
    doc.add_element(b, "pVariable", Some("Loop"));

    let height = doc.add_feature("Integer", "Height");
    doc.set_availability(height, false, true);

    let features = FeatureMap::discover(&doc);

    for name in ["Root", "ImageFormat", "Width", "WidthReg", "Loop", "LoopBack"] {
        assert!(features.is_usable(name), "{name} should be usable");
    }
    assert!(features.contains("Height"));
    assert!(!features.is_usable("Height"));
    assert_eq!(features.len(), 7);

    // Idempotent on an unchanged tree.
    assert_eq!(FeatureMap::discover(&doc), features);
    Ok(())
}

#[test]
fn test_invalidator_not_followed() -> Result<(), Box<dyn Error>> {
    let mut doc = GenicamDocument::new();
    doc.add_category("Root", &["Gain"]);
    let gain = doc.add_feature("Float", "Gain");
    doc.add_element(gain, genicam::INVALIDATOR, Some("GainRaw"));
    doc.add_feature("Integer", "GainRaw");

    let features = FeatureMap::discover(&doc);
    assert!(features.is_usable("Gain"));
    assert!(!features.contains("GainRaw"));
    Ok(())
}

#[test]
fn test_category_overrides_children() -> Result<(), Box<dyn Error>> {
    let mut doc = GenicamDocument::new();
    let root = doc.add_category("Root", &["Declared"]);
    doc.add_feature("Integer", "Declared");
    let hidden = doc.add_feature("Integer", "Hidden");
    doc.link(root, hidden);

    let features = FeatureMap::discover(&doc);
    assert!(features.is_usable("Declared"));
    assert!(!features.contains("Hidden"));
    Ok(())
}

#[test]
fn test_unresolved_references_dropped() -> Result<(), Box<dyn Error>> {
    let mut doc = GenicamDocument::new();
    doc.add_category("Root", &["Width", "Missing"]);
    let width = doc.add_feature("Integer", "Width");
    doc.add_element(width, "pValue", Some("NoSuchRegister"));

    let features = FeatureMap::discover(&doc);
    assert!(features.is_usable("Width"));
    assert!(!features.contains("Missing"));
    assert_eq!(features.len(), 2);
    Ok(())
}

#[test]
fn test_no_root() -> Result<(), Box<dyn Error>> {
    let mut doc = GenicamDocument::new();
    doc.add_feature("Integer", "Width");
    assert!(FeatureMap::discover(&doc).is_empty());

    let device = MockDevice::builder()
        .standard_features()
        .without_tree()
        .build();
    let features = discover_features(&DeviceHandle::new(device));
    assert!(features.is_empty());
    assert!(!features.is_usable(genicam::WIDTH));
    Ok(())
}
