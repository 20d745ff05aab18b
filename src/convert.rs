// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel format conversion registry.
//!
//! Conversions are keyed by the device's pixel format name. A conversion
//! writes the destination's pixels and encoding; the dispatcher owns every
//! other header field. The default registry only carries relabel
//! conversions for formats whose memory layout already matches a standard
//! image encoding.

use crate::pool::RecyclableImage;
use std::{collections::HashMap, fmt, sync::Arc};

/// Conversion from a wrapped native image into a spare image.
pub type ConversionFn = Arc<dyn Fn(&RecyclableImage, &mut RecyclableImage) + Send + Sync>;

const RELABELS: &[(&str, &str)] = &[
    ("Mono8", "mono8"),
    ("Mono16", "mono16"),
    ("RGB8", "rgb8"),
    ("BGR8", "bgr8"),
    ("RGBa8", "rgba8"),
    ("BGRa8", "bgra8"),
    ("BayerRG8", "bayer_rggb8"),
    ("BayerBG8", "bayer_bggr8"),
    ("BayerGB8", "bayer_gbrg8"),
    ("BayerGR8", "bayer_grbg8"),
    ("BayerRG16", "bayer_rggb16"),
    ("BayerBG16", "bayer_bggr16"),
    ("BayerGB16", "bayer_gbrg16"),
    ("BayerGR16", "bayer_grbg16"),
    ("YUV422_8_UYVY", "yuv422"),
];

/// Registry of conversions keyed by source pixel format.
#[derive(Clone)]
pub struct ConversionRegistry {
    conversions: HashMap<String, ConversionFn>,
}

impl ConversionRegistry {
    /// A registry with no conversions at all.
    pub fn empty() -> Self {
        ConversionRegistry {
            conversions: HashMap::new(),
        }
    }

    /// Registers `conversion` for `pixel_format`, replacing any previous one.
    pub fn register(&mut self, pixel_format: &str, conversion: ConversionFn) {
        self.conversions.insert(pixel_format.to_owned(), conversion);
    }

    pub fn lookup(&self, pixel_format: &str) -> Option<ConversionFn> {
        self.conversions.get(pixel_format).cloned()
    }

    pub fn len(&self) -> usize {
        self.conversions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for (pixel_format, encoding) in RELABELS {
            registry.register(pixel_format, relabel(encoding));
        }
        registry
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<&str> = self.conversions.keys().map(String::as_str).collect();
        formats.sort_unstable();
        f.debug_struct("ConversionRegistry")
            .field("formats", &formats)
            .finish()
    }
}

/// Copies the pixels unchanged and sets the destination encoding.
pub fn relabel(encoding: &'static str) -> ConversionFn {
    Arc::new(move |src: &RecyclableImage, dst: &mut RecyclableImage| {
        match dst.spare_data_mut() {
            Some(data) => {
                data.clear();
                data.extend_from_slice(src.data());
            }
            None => {
                let len = src.data().len().min(dst.data().len());
                dst.data_mut()[..len].copy_from_slice(&src.data()[..len]);
            }
        }
        dst.encoding = encoding.to_owned();
    })
}
