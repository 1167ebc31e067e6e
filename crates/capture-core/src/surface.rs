use serde::{Deserialize, Serialize};

/// Attributes whose changes on a tracked surface trigger an inventory report.
pub const OBSERVED_ATTRIBUTES: [&str; 3] = ["id", "width", "height"];

/// Opaque handle to a document node supplied by the host.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Current attribute values of one surface.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceAttributes {
    pub identifier: String,
    pub width: u32,
    pub height: u32,
}

/// One entry of an inventory report.
///
/// `dom_position` is the ordinal inside the report it came from and is not
/// stable across reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceRecord {
    pub identifier: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub dom_position: usize,
}

impl SurfaceRecord {
    pub fn new(dom_position: usize, attributes: SurfaceAttributes) -> Self {
        Self {
            identifier: attributes.identifier,
            width: attributes.width,
            height: attributes.height,
            dom_position,
        }
    }
}

/// Client-space bounding box of a surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
    pub x: f64,
    pub y: f64,
}

impl Rect {
    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
            width,
            height,
            x,
            y,
        }
    }
}

/// A node added to or removed from the document, with every surface in its
/// subtree (the node itself included when it is a surface).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutatedNode {
    pub node: NodeId,
    pub surfaces: Vec<NodeId>,
}

impl MutatedNode {
    pub fn surface(node: NodeId) -> Self {
        Self {
            node,
            surfaces: vec![node],
        }
    }

    pub fn is_surface_bearing(&self) -> bool {
        !self.surfaces.is_empty()
    }
}

/// One record of a host-delivered mutation batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationRecord {
    ChildList {
        added: Vec<MutatedNode>,
        removed: Vec<MutatedNode>,
    },
    Attributes {
        target: NodeId,
        attribute: String,
    },
}

impl MutationRecord {
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::ChildList { .. })
    }

    /// Attribute record for one of the observed attribute names.
    pub fn is_observed_attribute(&self) -> bool {
        match self {
            Self::Attributes { attribute, .. } => OBSERVED_ATTRIBUTES.contains(&attribute.as_str()),
            Self::ChildList { .. } => false,
        }
    }
}
