// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Feature discovery.
//!
//! Walks the device's feature tree once after open and records, for every
//! reachable feature, whether it is usable (available and implemented).

use crate::{
    device::DeviceHandle,
    genicam::{FeatureTree, NodeId, INVALIDATOR},
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

/// Feature name to usable flag, built once per device open.
///
/// Unknown names are not usable, so callers never need to distinguish a
/// missing feature from a disabled one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureMap {
    features: HashMap<String, bool>,
}

impl FeatureMap {
    /// Traverses `tree` from its root.
    ///
    /// Indirection elements (tags starting with `p`, except
    /// `pInvalidator`) are replaced by the node they name. Categories expand
    /// to their declared features instead of their DOM children. Every other
    /// node expands to its children. The visited set makes the walk terminate
    /// on cyclic trees. Unresolvable references are dropped.
    pub fn discover(tree: &dyn FeatureTree) -> FeatureMap {
        let mut features = HashMap::new();

        let Some(root) = tree.root() else {
            warn!("feature tree has no root, no features discovered");
            return FeatureMap { features };
        };

        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut todo: Vec<NodeId> = vec![root];

        while let Some(node) = todo.pop() {
            if !visited.insert(node) {
                continue;
            }

            let tag = tree.tag(node);
            if tag.starts_with('p') {
                if tag != INVALIDATOR {
                    match tree.text(node).and_then(|name| tree.lookup(name)) {
                        Some(target) => todo.push(target),
                        None => trace!(tag, target = ?tree.text(node), "unresolved indirection"),
                    }
                }
                continue;
            }

            if let Some(feature) = tree.feature(node) {
                let usable = feature.is_usable();
                trace!(feature = feature.name, usable, "discovered feature");
                features
                    .entry(feature.name.to_owned())
                    .or_insert(usable);
            }

            if let Some(names) = tree.category_features(node) {
                todo.extend(names.iter().filter_map(|name| tree.lookup(name)));
                continue;
            }

            todo.extend(tree.children(node));
        }

        let map = FeatureMap { features };
        debug!(
            features = map.len(),
            usable = map.usable_count(),
            "feature discovery complete"
        );
        map
    }

    /// Returns whether `name` was discovered and is usable.
    pub fn is_usable(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// Returns whether every feature in `names` is usable.
    pub fn all_usable(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.is_usable(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn usable_count(&self) -> usize {
        self.features.values().filter(|usable| **usable).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.features.iter().map(|(name, usable)| (name.as_str(), *usable))
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        FeatureMap {
            features: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Discovers the features of an opened device. A device without a feature
/// tree yields an empty map.
pub fn discover_features(device: &DeviceHandle) -> FeatureMap {
    match device.feature_tree() {
        Some(tree) => FeatureMap::discover(tree.as_ref()),
        None => {
            warn!("device exposes no feature tree, no features discovered");
            FeatureMap::default()
        }
    }
}
