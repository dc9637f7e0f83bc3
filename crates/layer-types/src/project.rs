//! Project tree document (`tree.json`)
//!
//! Returned by `GET /api/projects/new/json?project=<name>`. Groups carry no
//! durable identifier; layers carry the QGIS layer id.

use serde::{Deserialize, Serialize};

// ============================================================================
// Node Types
// ============================================================================

/// `type` discriminator of a project tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "VectorLayer")]
    VectorLayer,
    #[serde(rename = "RasterLayer")]
    RasterLayer,
    #[serde(rename = "WMSLayer")]
    WmsLayer,
    /// Any layer type this client does not know yet
    #[serde(other)]
    Unknown,
}

impl NodeType {
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group => write!(f, "group"),
            Self::VectorLayer => write!(f, "VectorLayer"),
            Self::RasterLayer => write!(f, "RasterLayer"),
            Self::WmsLayer => write!(f, "WMSLayer"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One node of the project tree as the backend sends it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    /// QGIS layer id (layers only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Layer opacity on the backend's 0-255 scale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    /// `[minX, minY, maxX, maxY]`, may be empty for rasters and groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extent: Vec<f64>,
    /// Geometry type of vector layers (`Point`, `MultiPolygon`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ProjectNode>,
}

fn default_visible() -> bool {
    true
}

impl ProjectNode {
    pub fn group(name: impl Into<String>, children: Vec<ProjectNode>) -> Self {
        Self {
            node_type: NodeType::Group,
            name: name.into(),
            id: None,
            visible: true,
            opacity: None,
            extent: Vec::new(),
            geometry: None,
            children,
        }
    }

    pub fn vector(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_type: NodeType::VectorLayer,
            name: name.into(),
            id: Some(id.into()),
            visible: true,
            opacity: Some(255.0),
            extent: Vec::new(),
            geometry: None,
            children: Vec::new(),
        }
    }

    pub fn raster(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_type: NodeType::RasterLayer,
            ..Self::vector(id, name)
        }
    }

    pub fn with_geometry(mut self, geometry: impl Into<String>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn with_extent(mut self, extent: [f64; 4]) -> Self {
        self.extent = extent.to_vec();
        self
    }
}

/// Root of `tree.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectTree {
    #[serde(default)]
    pub children: Vec<ProjectNode>,
}

impl ProjectTree {
    pub fn new(children: Vec<ProjectNode>) -> Self {
        Self { children }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_backend_tree() {
        let json = r#"{
            "children": [
                {
                    "type": "group",
                    "name": "Base",
                    "visible": true,
                    "childrenVisible": true,
                    "extent": [],
                    "children": [
                        {
                            "type": "VectorLayer",
                            "id": "roads_5f1c",
                            "name": "Roads",
                            "visible": false,
                            "opacity": 128,
                            "geometry": "LineString",
                            "extent": [0.0, 1.0, 2.0, 3.0],
                            "labeling": ""
                        },
                        {
                            "type": "MeshLayer",
                            "id": "mesh_1",
                            "name": "Mesh"
                        }
                    ]
                }
            ]
        }"#;

        let tree: ProjectTree = serde_json::from_str(json).unwrap();
        let group = &tree.children[0];
        assert_eq!(group.node_type, NodeType::Group);
        assert!(group.id.is_none());

        let roads = &group.children[0];
        assert_eq!(roads.id.as_deref(), Some("roads_5f1c"));
        assert!(!roads.visible);
        assert_eq!(roads.opacity, Some(128.0));
        assert_eq!(roads.extent, vec![0.0, 1.0, 2.0, 3.0]);

        assert_eq!(group.children[1].node_type, NodeType::Unknown);
        assert!(group.children[1].visible);
    }

    #[test]
    fn test_node_type_display() {
        assert_eq!(NodeType::Group.to_string(), "group");
        assert_eq!(NodeType::WmsLayer.to_string(), "WMSLayer");
    }
}
