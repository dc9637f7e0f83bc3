//! Layer tree node types

use layer_types::{NodeType, ProjectNode};
use serde::{Deserialize, Serialize};

/// Slot address inside a [`super::LayerTree`] arena
///
/// Only valid for the tree that produced it; a wholesale replacement hands
/// out new keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(pub(crate) usize);

impl NodeKey {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Group,
    Layer,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group => write!(f, "group"),
            Self::Layer => write!(f, "layer"),
        }
    }
}

/// Where a layer's data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Feature data (QGIS vector layer)
    Vector,
    /// Raster file (GeoTIFF)
    Raster,
    /// Remote tiled service (WMS layer)
    Tiled,
}

impl SourceKind {
    pub fn from_node_type(node_type: NodeType) -> Option<Self> {
        match node_type {
            NodeType::VectorLayer => Some(Self::Vector),
            NodeType::RasterLayer => Some(Self::Raster),
            NodeType::WmsLayer => Some(Self::Tiled),
            NodeType::Group | NodeType::Unknown => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Raster => write!(f, "raster"),
            Self::Tiled => write!(f, "tiled"),
        }
    }
}

/// One group or layer of the client-side project mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerNode {
    /// Backend layer id for layers, `group:<path>` for groups
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub visible: bool,
    /// 0.0 (transparent) to 1.0 (opaque)
    pub opacity: f32,
    pub source_kind: Option<SourceKind>,
    pub geometry: Option<String>,
    pub extent: Option<[f64; 4]>,
}

impl LayerNode {
    pub fn group(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::Group,
            visible: true,
            opacity: 1.0,
            source_kind: None,
            geometry: None,
            extent: None,
        }
    }

    pub fn layer(id: impl Into<String>, name: impl Into<String>, source_kind: SourceKind) -> Self {
        Self {
            kind: NodeKind::Layer,
            source_kind: Some(source_kind),
            ..Self::group(id, name)
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == NodeKind::Group
    }

    pub(crate) fn from_project(node: &ProjectNode, id: String) -> Self {
        let extent = match node.extent.as_slice() {
            [a, b, c, d] => Some([*a, *b, *c, *d]),
            _ => None,
        };
        Self {
            id,
            name: node.name.clone(),
            kind: if node.node_type.is_group() {
                NodeKind::Group
            } else {
                NodeKind::Layer
            },
            visible: node.visible,
            opacity: node
                .opacity
                .map(|o| (o / 255.0).clamp(0.0, 1.0) as f32)
                .unwrap_or(1.0),
            source_kind: SourceKind::from_node_type(node.node_type),
            geometry: node.geometry.clone(),
            extent,
        }
    }
}
