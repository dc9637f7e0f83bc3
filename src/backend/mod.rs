//! Project backend collaborator
//!
//! The authoritative store for the project tree (a QGIS/PostGIS service).
//! The sync engine only talks to it through [`ProjectBackend`].
//!
//! # Implementations
//!
//! - [`HttpProjectBackend`] - reqwest client, `Authorization: Token <t>`
//! - [`InMemoryProjectBackend`] - in-process double with call recording and
//!   injectable failures

mod http;
mod memory;

use async_trait::async_trait;
use layer_types::{
    AddGroupRequest, AddLayerRequest, FeatureCollection, LayerSelectionRequest, ProjectTree,
    RemoveNodesRequest, RenameGroupRequest, SelectedFeaturesRequest, TreeOrderRequest,
};
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;

pub use http::HttpProjectBackend;
pub use memory::{BackendCall, InMemoryProjectBackend};

// ============================================================================
// Import payloads
// ============================================================================

/// Import file format; selects the upload endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    GeoJson,
    Shapefile,
    Gml,
    GeoTiff,
}

impl ImportFormat {
    /// Path segment under `/api/layer/add/`
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::GeoJson => "geojson",
            Self::Shapefile => "shp",
            Self::Gml => "gml",
            Self::GeoTiff => "raster",
        }
    }
}

impl std::fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GeoJson => write!(f, "GeoJSON"),
            Self::Shapefile => write!(f, "Shapefile"),
            Self::Gml => write!(f, "GML"),
            Self::GeoTiff => write!(f, "GeoTIFF"),
        }
    }
}

/// One file part of a multipart import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFile {
    /// Multipart field name (`geojson`, `shp`, `dbf`, `tif`, ...)
    pub field: &'static str,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Validated multipart import, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPayload {
    pub format: ImportFormat,
    pub project: String,
    pub layer_name: String,
    /// Target group name, `""` for the root list
    pub parent: String,
    pub epsg: Option<u32>,
    pub encoding: Option<String>,
    pub files: Vec<PayloadFile>,
}

impl ImportPayload {
    pub fn file(&self, field: &str) -> Option<&PayloadFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// Text fields in send order
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("project", self.project.clone()),
            ("layer_name", self.layer_name.clone()),
            ("parent", self.parent.clone()),
        ];
        if let Some(epsg) = self.epsg {
            fields.push(("epsg", epsg.to_string()));
        }
        if let Some(encoding) = &self.encoding {
            fields.push(("encoding", encoding.clone()));
        }
        fields
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// Authoritative project store
///
/// # Implementation Notes
///
/// - Groups are addressed by name and layers by id; callers build requests
///   through `LayerTree::remote_identifier`
/// - Error bodies carry `{message}` or `{error}`; implementations surface that
///   text in [`crate::error::BackendError::Status`]
/// - All methods must be cancel-safe: the sync engine never holds the tree
///   lock across them
#[async_trait]
pub trait ProjectBackend: Send + Sync {
    /// `GET /api/projects/new/json?project=`
    async fn fetch_tree(&self, project: &str) -> BackendResult<ProjectTree>;

    /// `POST /api/projects/tree/order`
    async fn change_order(&self, request: &TreeOrderRequest) -> BackendResult<()>;

    /// `POST /api/layer/selection`
    async fn set_layer_visibility(&self, request: &LayerSelectionRequest) -> BackendResult<()>;

    /// `POST /api/groups/layer/remove`
    async fn remove_nodes(&self, request: &RemoveNodesRequest) -> BackendResult<()>;

    /// `POST /api/layer/add/{format}/` (multipart)
    async fn import_layer(&self, payload: &ImportPayload) -> BackendResult<()>;

    /// `POST /api/layer/add`
    async fn add_layer(&self, request: &AddLayerRequest) -> BackendResult<()>;

    /// `POST /api/groups/add`
    async fn add_group(&self, request: &AddGroupRequest) -> BackendResult<()>;

    /// `POST /api/groups/name`
    async fn rename_group(&self, request: &RenameGroupRequest) -> BackendResult<()>;

    /// `POST /api/layer/features/selected`; geometries and bbox in EPSG:3857
    async fn selected_features(
        &self,
        request: &SelectedFeaturesRequest,
    ) -> BackendResult<FeatureCollection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_fields_skip_unset_options() {
        let payload = ImportPayload {
            format: ImportFormat::GeoTiff,
            project: "demo".into(),
            layer_name: "ortho".into(),
            parent: String::new(),
            epsg: None,
            encoding: None,
            files: vec![],
        };
        let keys: Vec<_> = payload.text_fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["project", "layer_name", "parent"]);
        assert_eq!(payload.format.endpoint(), "raster");
    }
}
