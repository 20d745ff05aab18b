// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Feature control.
//!
//! [`FeatureControl`] is the pass-through used for operator driven feature
//! access: typed get and set, selector scoped writes and named commands.
//! Feature reads and writes hold the device's selector lock, so they never
//! interleave with per-frame telemetry reads.
//!
//! [`FeatureTable`] is the bulk feature configuration applied at startup.

use crate::{
    device::{DeviceHandle, FeatureValue},
    features::FeatureMap,
};
use serde::Deserialize;
use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to read feature table {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse feature table {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Features to write at startup.
///
/// ```json
/// {
///   "load_order": ["TriggerSelector", "TriggerMode"],
///   "features": { "TriggerSelector": "FrameStart", "TriggerMode": "Off", "Gain": 2.5 }
/// }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FeatureTable {
    /// Keys written first, in this order.
    #[serde(default)]
    pub load_order: Vec<String>,
    #[serde(default)]
    pub features: BTreeMap<String, serde_json::Value>,
}

impl FeatureTable {
    pub fn load(path: &Path) -> Result<FeatureTable, ControlError> {
        let file = File::open(path).map_err(|source| ControlError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ControlError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Typed entries in application order: `load_order` keys first, then
    /// keys naming a selector, then the rest. Values that are not a
    /// boolean, number or string are skipped.
    pub fn ordered(&self) -> Vec<(&str, FeatureValue)> {
        let mut keys: Vec<&str> = Vec::with_capacity(self.features.len());

        for key in &self.load_order {
            if self.features.contains_key(key) && !keys.contains(&key.as_str()) {
                keys.push(key);
            } else if !self.features.contains_key(key) {
                debug!(feature = key, "load order names a feature with no value");
            }
        }
        let rest: Vec<&str> = self
            .features
            .keys()
            .map(String::as_str)
            .filter(|key| !keys.contains(key))
            .collect();
        keys.extend(rest.iter().filter(|key| key.contains("Selector")));
        keys.extend(rest.iter().filter(|key| !key.contains("Selector")));

        keys.into_iter()
            .filter_map(|key| match self.features.get(key).and_then(typed) {
                Some(value) => Some((key, value)),
                None => {
                    warn!(feature = key, "unsupported feature value type, skipped");
                    None
                }
            })
            .collect()
    }
}

fn typed(value: &serde_json::Value) -> Option<FeatureValue> {
    match value {
        serde_json::Value::Bool(v) => Some(FeatureValue::Boolean(*v)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(FeatureValue::Integer)
            .or_else(|| n.as_f64().map(FeatureValue::Float)),
        serde_json::Value::String(v) => Some(FeatureValue::String(v.clone())),
        _ => None,
    }
}

/// Splits a comma separated argument, trimming each entry. An empty
/// argument yields no entries.
pub fn parse_string_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    arg.split(',').map(|s| s.trim().to_owned()).collect()
}

/// Serialized feature access for one device.
#[derive(Clone)]
pub struct FeatureControl {
    device: DeviceHandle,
    features: Arc<FeatureMap>,
}

impl FeatureControl {
    pub fn new(device: DeviceHandle, features: Arc<FeatureMap>) -> Self {
        FeatureControl { device, features }
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn features(&self) -> &Arc<FeatureMap> {
        &self.features
    }

    pub fn get_boolean(&self, feature: &str) -> bool {
        let _selectors = self.device.lock_selectors();
        self.device.get_boolean(feature)
    }

    pub fn get_integer(&self, feature: &str) -> i64 {
        let _selectors = self.device.lock_selectors();
        self.device.get_integer(feature)
    }

    pub fn get_float(&self, feature: &str) -> f64 {
        let _selectors = self.device.lock_selectors();
        self.device.get_float(feature)
    }

    pub fn get_string(&self, feature: &str) -> String {
        let _selectors = self.device.lock_selectors();
        self.device.get_string(feature)
    }

    /// Writes `value` through the setter matching its type.
    pub fn set(&self, feature: &str, value: &FeatureValue) -> bool {
        let _selectors = self.device.lock_selectors();
        self.device.set_value(feature, value)
    }

    /// Selects `selection` on `selector`, then writes `feature`, as one
    /// critical section.
    pub fn set_selected(
        &self,
        selector: &str,
        selection: &str,
        feature: &str,
        value: &FeatureValue,
    ) -> bool {
        let _selectors = self.device.lock_selectors();
        self.device.set_string(selector, selection) && self.device.set_value(feature, value)
    }

    /// Runs `f` with the selector lock held.
    pub fn with_selectors<T>(&self, f: impl FnOnce(&DeviceHandle) -> T) -> T {
        let _selectors = self.device.lock_selectors();
        f(&self.device)
    }

    /// Executes a command. Commands do not depend on selectors, so the
    /// lock is not taken and a command may complete a frame synchronously.
    pub fn execute(&self, command: &str) -> bool {
        self.device.execute_command(command)
    }

    /// Writes every usable feature of `table` in application order. Returns
    /// the number of successful writes.
    pub fn apply_table(&self, table: &FeatureTable) -> usize {
        let mut applied = 0;
        let _selectors = self.device.lock_selectors();

        for (feature, value) in table.ordered() {
            if !self.features.is_usable(feature) {
                warn!(feature, %value, "feature not implemented on this camera, skipped");
                continue;
            }
            if self.device.set_value(feature, &value) {
                debug!(feature, %value, "feature written");
                applied += 1;
            }
        }

        if applied > 0 {
            info!(applied, "feature table applied");
        }
        applied
    }
}
