//! Shared wire types for geolayers
//!
//! Pure data structures that cross the boundary between the client core and
//! its collaborators: the project backend (QGIS/PostGIS) and the protocol
//! services (WMS/WFS/tile cache).
//!
//! ## Architecture Levels
//!
//! ```text
//! Level 1: layer-types (this crate)
//!    └── serde, serde_json only
//!
//! Level 2: geolayers
//!    ├── sources   (WMS / WFS / MVT adapters, source manager)
//!    ├── geo       (coordinate transform, bbox)
//!    ├── tree      (layer tree arena)
//!    ├── backend   (project backend client)
//!    └── sync      (optimistic mutation engine)
//! ```
//!
//! ## Critical Rules
//!
//! 1. **No behavior** - types, constructors and trivial accessors only
//! 2. **Field names match the wire** - `snake_case` payloads are not renamed
//! 3. **Tolerant decoding** - unknown fields in backend documents are ignored,
//!    missing optional fields default

pub mod geojson;
pub mod project;
pub mod requests;

pub use geojson::{Feature, FeatureCollection, Geometry, Position};
pub use project::{NodeType, ProjectNode, ProjectTree};
pub use requests::{
    AddGroupRequest, AddLayerRequest, ApiMessage, ColumnSpec, LayerSelectionRequest, ObjectType,
    RemoveNodesRequest, RenameGroupRequest, SelectedFeaturesRequest, SelectedFeaturesResponse,
    TreeOrderRequest,
};
