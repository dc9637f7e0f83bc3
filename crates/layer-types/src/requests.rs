//! Backend request and response bodies
//!
//! JSON bodies for the project backend's layer-tree endpoints. Multipart
//! import payloads are assembled by the client and have no type here.

use serde::{Deserialize, Serialize};

use crate::geojson::FeatureCollection;

/// How the order endpoint addresses the moved object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Layer,
    Group,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Layer => write!(f, "layer"),
            Self::Group => write!(f, "group"),
        }
    }
}

/// `POST /api/projects/tree/order`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeOrderRequest {
    pub project: String,
    pub object_type: ObjectType,
    /// Layer id for layers, group name for groups
    pub object_id: String,
    /// Empty string addresses the root
    pub new_parent_name: String,
    pub position: usize,
}

/// `POST /api/layer/selection`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSelectionRequest {
    pub project: String,
    pub layer_id: String,
    pub checked: bool,
    /// Must be non-empty; carries the toggled layer id
    pub layers: Vec<String>,
}

impl LayerSelectionRequest {
    pub fn new(project: impl Into<String>, layer_id: impl Into<String>, checked: bool) -> Self {
        let layer_id = layer_id.into();
        Self {
            project: project.into(),
            layers: vec![layer_id.clone()],
            layer_id,
            checked,
        }
    }
}

/// `POST /api/groups/layer/remove`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveNodesRequest {
    pub project: String,
    /// Group names
    pub groups: Vec<String>,
    /// Layer ids
    pub layers: Vec<String>,
    pub remove_from_database: bool,
}

/// Attribute column of a new empty layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub column_name: String,
    pub column_type: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            column_name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// `POST /api/layer/add`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddLayerRequest {
    pub project: String,
    pub name: String,
    /// Always `vector` for empty layers
    pub format: String,
    pub geometry_type: String,
    pub properties: Vec<ColumnSpec>,
    pub parent: String,
}

/// `POST /api/groups/add`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddGroupRequest {
    pub project: String,
    pub group_name: String,
    pub parent: String,
}

/// `POST /api/groups/name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameGroupRequest {
    pub project: String,
    pub group_name: String,
    pub new_name: String,
}

/// `POST /api/layer/features/selected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFeaturesRequest {
    pub project: String,
    pub layer_id: String,
    /// Feature ids (`ogc_fid`) as strings
    pub label: Vec<String>,
}

/// Envelope of `POST /api/layer/features/selected`
///
/// `data.bbox` is in EPSG:3857 when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedFeaturesResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: FeatureCollection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Generic backend envelope used for error reporting
///
/// Backends answer either `{"message": ...}` or `{"error": ...}`; `error` is
/// sometimes a boolean flag next to a `message`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl ApiMessage {
    /// Human-readable message, if the envelope carries one
    pub fn text(&self) -> Option<String> {
        if let Some(message) = self.message.as_deref().filter(|m| !m.trim().is_empty()) {
            return Some(message.to_string());
        }
        match &self.error {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_request_wire_shape() {
        let req = TreeOrderRequest {
            project: "demo".into(),
            object_type: ObjectType::Group,
            object_id: "Base".into(),
            new_parent_name: String::new(),
            position: 2,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["object_type"], "group");
        assert_eq!(value["new_parent_name"], "");
        assert_eq!(value["position"], 2);
    }

    #[test]
    fn test_selection_request_carries_layer_list() {
        let req = LayerSelectionRequest::new("demo", "roads_1", false);
        assert_eq!(req.layers, vec!["roads_1".to_string()]);
        assert!(!req.checked);
    }

    #[test]
    fn test_api_message_text() {
        let msg: ApiMessage = serde_json::from_str(r#"{"message": "Layer locked"}"#).unwrap();
        assert_eq!(msg.text().as_deref(), Some("Layer locked"));

        let err: ApiMessage = serde_json::from_str(r#"{"error": "No such group"}"#).unwrap();
        assert_eq!(err.text().as_deref(), Some("No such group"));

        let flag: ApiMessage = serde_json::from_str(r#"{"error": true, "message": ""}"#).unwrap();
        assert_eq!(flag.text(), None);
    }
}
