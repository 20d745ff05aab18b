// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use serde::Serialize;

/// Mono 8-bit pixel format (PFNC `Mono8`)
pub const MONO8: i64 = 0x0108_0001;

/// Mono 16-bit pixel format (PFNC `Mono16`)
pub const MONO16: i64 = 0x0110_0007;

/// Mono 12-bit packed pixel format, two pixels in three bytes (`Mono12Packed`)
pub const MONO12_PACKED: i64 = 0x010C_0006;

/// Bayer RGGB 8-bit pixel format (PFNC `BayerRG8`)
pub const BAYER_RG8: i64 = 0x0108_0009;

/// Bayer GRBG 8-bit pixel format (PFNC `BayerGR8`)
pub const BAYER_GR8: i64 = 0x0108_0008;

/// Bayer GBRG 8-bit pixel format (PFNC `BayerGB8`)
pub const BAYER_GB8: i64 = 0x0108_000A;

/// Bayer BGGR 8-bit pixel format (PFNC `BayerBG8`)
pub const BAYER_BG8: i64 = 0x0108_000B;

pub const BAYER_GR16: i64 = 0x0110_002E;
pub const BAYER_RG16: i64 = 0x0110_002F;
pub const BAYER_GB16: i64 = 0x0110_0030;
pub const BAYER_BG16: i64 = 0x0110_0031;

/// RGB 24-bit pixel format (PFNC `RGB8`)
pub const RGB8: i64 = 0x0218_0014;

/// BGR 24-bit pixel format (PFNC `BGR8`)
pub const BGR8: i64 = 0x0218_0015;

/// RGBA 32-bit pixel format (PFNC `RGBa8`)
pub const RGBA8: i64 = 0x0220_0016;

/// BGRA 32-bit pixel format (PFNC `BGRa8`)
pub const BGRA8: i64 = 0x0220_0017;

/// YUV 4:2:2 packed pixel format, UYVY order (PFNC `YUV422_8_UYVY`)
pub const YUV422_8_UYVY: i64 = 0x0210_001F;

const PIXEL_FORMATS: &[(&str, i64)] = &[
    ("Mono8", MONO8),
    ("Mono16", MONO16),
    ("Mono12Packed", MONO12_PACKED),
    ("BayerRG8", BAYER_RG8),
    ("BayerGR8", BAYER_GR8),
    ("BayerGB8", BAYER_GB8),
    ("BayerBG8", BAYER_BG8),
    ("BayerRG16", BAYER_RG16),
    ("BayerGR16", BAYER_GR16),
    ("BayerGB16", BAYER_GB16),
    ("BayerBG16", BAYER_BG16),
    ("RGB8", RGB8),
    ("BGR8", BGR8),
    ("RGBa8", RGBA8),
    ("BGRa8", BGRA8),
    ("YUV422_8_UYVY", YUV422_8_UYVY),
];

/// Looks up the PFNC value of a pixel format by name.
pub fn pixel_format_value(name: &str) -> Option<i64> {
    PIXEL_FORMATS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}

/// Returns the bits per pixel encoded in a PFNC pixel format value.
///
/// PFNC stores the effective pixel size in bits 16 to 23 of the format
/// identifier.
///
/// # Example
///
/// ```
/// use edgefirst_genicam::image::{pfnc_bits_per_pixel, MONO12_PACKED, RGB8};
///
/// assert_eq!(pfnc_bits_per_pixel(RGB8), 24);
/// assert_eq!(pfnc_bits_per_pixel(MONO12_PACKED), 12);
/// ```
pub fn pfnc_bits_per_pixel(pixel_format: i64) -> u32 {
    ((pixel_format >> 16) & 0xff) as u32
}

/// Row stride in bytes for `width` pixels of `bits_per_pixel` each.
pub fn row_stride(width: u32, bits_per_pixel: u32) -> u32 {
    (width as u64 * bits_per_pixel as u64 / 8) as u32
}

/// Metadata stamped on every published frame and its calibration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Header {
    /// Acquisition time in nanoseconds, device time when PTP stamping is
    /// enabled, host receipt time otherwise.
    pub stamp_ns: u64,
    /// Frame sequence number as reported by the device.
    pub seq: u64,
    /// Frame identifier, `frame_id/channel` for named channels.
    pub frame_id: String,
}

impl Header {
    pub fn sec(&self) -> i32 {
        (self.stamp_ns / 1_000_000_000) as i32
    }

    pub fn nanosec(&self) -> u32 {
        (self.stamp_ns % 1_000_000_000) as u32
    }
}

/// Negotiated image geometry and pixel format of one stream channel.
///
/// Written once while configuring the channel and read by every frame
/// dispatched on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SensorDescription {
    pub width: u32,
    pub height: u32,
    /// Pixel format name as reported by the device, e.g. `BayerRG8`.
    pub pixel_format: String,
    pub bits_per_pixel: u32,
}

impl SensorDescription {
    /// Bytes per row of a native frame.
    pub fn step(&self) -> u32 {
        row_stride(self.width, self.bits_per_pixel)
    }

    /// Bytes per native frame.
    pub fn size(&self) -> usize {
        self.step() as usize * self.height as usize
    }
}

impl fmt::Display for SensorDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} ({} bpp)",
            self.width, self.height, self.pixel_format, self.bits_per_pixel
        )
    }
}
