// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! GenICam feature tree model.
//!
//! A device describes itself as a DOM-like tree. Three kinds of nodes matter
//! when walking it:
//!
//! - feature nodes (`<Integer Name="Width">`, `<Category Name="Root">`, ...)
//!   carry a feature name and availability flags;
//! - category nodes list the names of the features they group;
//! - indirection elements (`<pValue>WidthReg</pValue>`) name another node by
//!   its feature name.
//!
//! [`FeatureTree`] is the read-only view discovery needs. [`GenicamDocument`]
//! is an in-memory implementation used by the simulated device and tests.

use std::collections::HashMap;

/// Standard feature names (SFNC) used throughout the crate.
pub const ROOT: &str = "Root";
pub const ACQUISITION_FRAME_RATE: &str = "AcquisitionFrameRate";
pub const ACQUISITION_FRAME_RATE_ENABLE: &str = "AcquisitionFrameRateEnable";
pub const ACQUISITION_MODE: &str = "AcquisitionMode";
pub const ACQUISITION_START: &str = "AcquisitionStart";
pub const ACQUISITION_STOP: &str = "AcquisitionStop";
pub const BALANCE_RATIO: &str = "BalanceRatio";
pub const BALANCE_RATIO_SELECTOR: &str = "BalanceRatioSelector";
pub const BLACK_LEVEL: &str = "BlackLevel";
pub const BLACK_LEVEL_SELECTOR: &str = "BlackLevelSelector";
pub const DEVICE_ID: &str = "DeviceID";
pub const DEVICE_MODEL_NAME: &str = "DeviceModelName";
pub const DEVICE_SERIAL_NUMBER: &str = "DeviceSerialNumber";
pub const DEVICE_STREAM_CHANNEL_COUNT: &str = "DeviceStreamChannelCount";
pub const DEVICE_TEMPERATURE: &str = "DeviceTemperature";
pub const DEVICE_USER_ID: &str = "DeviceUserID";
pub const DEVICE_VENDOR_NAME: &str = "DeviceVendorName";
pub const EXPOSURE_AUTO: &str = "ExposureAuto";
pub const EXPOSURE_TIME: &str = "ExposureTime";
pub const GAIN: &str = "Gain";
pub const GAIN_AUTO: &str = "GainAuto";
pub const GAIN_SELECTOR: &str = "GainSelector";
pub const GEV_SCPS_PACKET_SIZE: &str = "GevSCPSPacketSize";
pub const GEV_STREAM_CHANNEL_COUNT: &str = "GevStreamChannelCount";
pub const HEIGHT: &str = "Height";
pub const PIXEL_FORMAT: &str = "PixelFormat";
pub const SOURCE_SELECTOR: &str = "SourceSelector";
pub const TRIGGER_MODE: &str = "TriggerMode";
pub const TRIGGER_SELECTOR: &str = "TriggerSelector";
pub const TRIGGER_SOFTWARE: &str = "TriggerSoftware";
pub const TRIGGER_SOURCE: &str = "TriggerSource";
pub const WIDTH: &str = "Width";

/// Legacy feature names still found on older devices.
pub mod legacy {
    pub const EXPOSURE_TIME_ABS: &str = "ExposureTimeAbs";
}

/// Indirection element name meaning "no target".
pub const INVALIDATOR: &str = "pInvalidator";

/// Identity of a node within one tree.
pub type NodeId = usize;

/// Feature information carried by a feature node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureNode<'a> {
    pub name: &'a str,
    pub available: bool,
    pub implemented: bool,
}

impl FeatureNode<'_> {
    /// A feature is usable when it is both available and implemented.
    pub fn is_usable(&self) -> bool {
        self.available && self.implemented
    }
}

/// Read-only view of a device's feature tree.
pub trait FeatureTree: Send + Sync {
    /// The `Root` category, if present.
    fn root(&self) -> Option<NodeId> {
        self.lookup(ROOT)
    }

    /// Resolves a node by its feature name.
    fn lookup(&self, name: &str) -> Option<NodeId>;

    /// DOM element name, e.g. `Integer`, `Category` or `pValue`.
    fn tag(&self, node: NodeId) -> &str;

    /// Text content of the node. For indirection elements this is the
    /// referenced feature name.
    fn text(&self, node: NodeId) -> Option<&str>;

    /// Direct DOM children.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Feature information when the node is a feature node.
    fn feature(&self, node: NodeId) -> Option<FeatureNode<'_>>;

    /// Declared feature names when the node is a category.
    fn category_features(&self, node: NodeId) -> Option<Vec<String>>;
}

#[derive(Clone, Debug)]
struct Node {
    tag: String,
    name: Option<String>,
    text: Option<String>,
    children: Vec<NodeId>,
    available: bool,
    implemented: bool,
    category: Option<Vec<String>>,
}

/// In-memory feature tree.
///
/// # Example
///
/// ```
/// use edgefirst_genicam::genicam::{FeatureTree, GenicamDocument};
///
/// let mut doc = GenicamDocument::new();
/// doc.add_category("Root", &["Width"]);
/// let width = doc.add_feature("Integer", "Width");
/// doc.add_element(width, "pValue", Some("WidthReg"));
/// doc.add_feature("IntReg", "WidthReg");
///
/// assert_eq!(doc.root(), doc.lookup("Root"));
/// assert_eq!(doc.children(width).len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct GenicamDocument {
    nodes: Vec<Node>,
    names: HashMap<String, NodeId>,
}

impl GenicamDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a feature node, available and implemented by default. A name
    /// already in use is rebound to the new node.
    pub fn add_feature(&mut self, tag: &str, name: &str) -> NodeId {
        let id = self.push(Node {
            tag: tag.to_owned(),
            name: Some(name.to_owned()),
            text: None,
            children: Vec::new(),
            available: true,
            implemented: true,
            category: None,
        });
        self.names.insert(name.to_owned(), id);
        id
    }

    /// Adds a `Category` node grouping the named features.
    pub fn add_category(&mut self, name: &str, features: &[&str]) -> NodeId {
        let id = self.add_feature("Category", name);
        self.nodes[id].category = Some(features.iter().map(|f| f.to_string()).collect());
        id
    }

    /// Adds an unnamed element under `parent`. Elements whose tag starts
    /// with `p` are indirections to the feature named by `text`.
    pub fn add_element(&mut self, parent: NodeId, tag: &str, text: Option<&str>) -> NodeId {
        let id = self.push(Node {
            tag: tag.to_owned(),
            name: None,
            text: text.map(str::to_owned),
            children: Vec::new(),
            available: true,
            implemented: true,
            category: None,
        });
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(id);
        }
        id
    }

    /// Adds an existing node as a child of `parent`.
    pub fn link(&mut self, parent: NodeId, child: NodeId) {
        if child < self.nodes.len() {
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children.push(child);
            }
        }
    }

    pub fn set_availability(&mut self, node: NodeId, available: bool, implemented: bool) {
        if let Some(node) = self.nodes.get_mut(node) {
            node.available = available;
            node.implemented = implemented;
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

impl FeatureTree for GenicamDocument {
    fn lookup(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    fn tag(&self, node: NodeId) -> &str {
        self.nodes.get(node).map(|n| n.tag.as_str()).unwrap_or("")
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).and_then(|n| n.text.as_deref())
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn feature(&self, node: NodeId) -> Option<FeatureNode<'_>> {
        let node = self.nodes.get(node)?;
        let name = node.name.as_deref()?;
        Some(FeatureNode {
            name,
            available: node.available,
            implemented: node.implemented,
        })
    }

    fn category_features(&self, node: NodeId) -> Option<Vec<String>> {
        self.nodes.get(node).and_then(|n| n.category.clone())
    }
}
