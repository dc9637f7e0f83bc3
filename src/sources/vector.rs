//! Tiled-vector adapter (Mapbox Vector Tiles through GeoWebCache)
//!
//! Tiles are served by the tile cache's TMS endpoint. The tileset descriptor
//! is synthesized locally; the attribute schema is read best-effort from the
//! GeoServer REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GeoServerConfig;
use crate::error::SourceResult;
use crate::sources::capabilities;
use crate::sources::http::ServiceClient;
use crate::sources::{qualify, Capabilities, Protocol, SourceAdapter};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MIN_ZOOM: u8 = 0;
pub const DEFAULT_MAX_ZOOM: u8 = 18;
pub const DEFAULT_GRIDSET: &str = "EPSG:3857";

/// Web Mercator world extent in degrees
const WORLD_BOUNDS: [f64; 4] = [-180.0, -85.0511, 180.0, 85.0511];

/// Row numbering of a tile template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileScheme {
    /// Row 0 at the top (slippy map)
    Xyz,
    /// Row 0 at the bottom (TMS / GeoWebCache)
    #[default]
    Tms,
}

impl std::fmt::Display for TileScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xyz => write!(f, "xyz"),
            Self::Tms => write!(f, "tms"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorSourceOptions {
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
    /// Tile cache gridset, EPSG:3857 when unset
    pub gridset: Option<String>,
}

impl VectorSourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zoom_range(mut self, min: u8, max: u8) -> Self {
        self.min_zoom = Some(min);
        self.max_zoom = Some(max);
        self
    }

    pub fn with_gridset(mut self, gridset: impl Into<String>) -> Self {
        self.gridset = Some(gridset.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSourceConfig {
    /// Tile URL template with `{z}`, `{x}`, `{y}`
    pub url: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub scheme: TileScheme,
}

/// Layer inside a vector tileset with its attribute schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorLayerInfo {
    pub id: String,
    pub description: Option<String>,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Attribute name → type (`String`, `Number`, `Boolean`)
    pub fields: BTreeMap<String, String>,
}

/// TileJSON-style tileset descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilesetInfo {
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub scheme: TileScheme,
    pub tiles: Vec<String>,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// `[west, south, east, north]` in degrees
    pub bounds: [f64; 4],
    /// `[lng, lat, zoom]`
    pub center: [f64; 3],
    pub vector_layers: Vec<VectorLayerInfo>,
}

// GeoServer REST feature type description (subset)

#[derive(Debug, Deserialize)]
struct FeatureTypeEnvelope {
    #[serde(rename = "featureType")]
    feature_type: RestFeatureType,
}

#[derive(Debug, Deserialize)]
struct RestFeatureType {
    #[serde(default)]
    attributes: Option<RestAttributes>,
    #[serde(rename = "latLonBoundingBox", default)]
    lat_lon_bbox: Option<RestBoundingBox>,
}

#[derive(Debug, Deserialize)]
struct RestAttributes {
    attribute: OneOrMany<RestAttribute>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RestAttribute {
    name: String,
    #[serde(default)]
    binding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestBoundingBox {
    minx: f64,
    maxx: f64,
    miny: f64,
    maxy: f64,
}

#[derive(Debug, Default)]
struct LayerSchema {
    fields: BTreeMap<String, String>,
    bounds: Option<[f64; 4]>,
}

/// Map a Java binding class to a TileJSON field type; geometry is dropped
fn field_type(binding: &str) -> Option<&'static str> {
    let class = binding.rsplit('.').next().unwrap_or(binding);
    match class {
        "String" | "Character" | "UUID" => Some("String"),
        "Boolean" => Some("Boolean"),
        "Integer" | "Long" | "Short" | "Byte" | "Double" | "Float" | "BigDecimal"
        | "BigInteger" => Some("Number"),
        "Date" | "Timestamp" | "Time" => Some("String"),
        _ if binding.contains(".jts.geom.") => None,
        _ => Some("String"),
    }
}

/// MVT adapter
#[derive(Debug, Clone)]
pub struct MvtAdapter {
    client: ServiceClient,
    workspace: Option<String>,
}

impl MvtAdapter {
    pub fn new(config: &GeoServerConfig) -> SourceResult<Self> {
        Ok(Self {
            client: ServiceClient::new(Protocol::TiledVector, config, DEFAULT_TIMEOUT)?,
            workspace: config.workspace.clone(),
        })
    }

    /// TMS tile template for a layer; credentials never go into the URL
    pub fn generate_tile_url(&self, layer_name: &str, options: &VectorSourceOptions) -> String {
        let gridset = options.gridset.as_deref().unwrap_or(DEFAULT_GRIDSET);
        let path = format!(
            "gwc/service/tms/1.0.0/{}@{}@pbf/{{z}}/{{x}}/{{y}}.pbf",
            qualify(self.workspace.as_deref(), layer_name),
            gridset.replace(':', "%3A"),
        );
        self.client.endpoint(&path)
    }

    /// Synthesized tileset descriptor
    ///
    /// Field schema and bounds come from the REST feature type when it is
    /// reachable; otherwise fields are empty and bounds cover the world.
    pub async fn get_tileset_info(&self, layer_name: &str) -> SourceResult<TilesetInfo> {
        let source = self.generate_source_config(layer_name, &VectorSourceOptions::new());
        let schema = self.get_layer_schema(layer_name).await;
        let bounds = schema.bounds.unwrap_or(WORLD_BOUNDS);
        let center = [
            (bounds[0] + bounds[2]) / 2.0,
            (bounds[1] + bounds[3]) / 2.0,
            2.0,
        ];
        let local_name = layer_name.rsplit(':').next().unwrap_or(layer_name);

        Ok(TilesetInfo {
            name: qualify(self.workspace.as_deref(), layer_name),
            description: Some(format!("Vector tiles for {}", local_name)),
            version: "1.0.0".to_string(),
            scheme: source.scheme,
            tiles: vec![source.url],
            min_zoom: source.min_zoom,
            max_zoom: source.max_zoom,
            bounds,
            center,
            vector_layers: vec![VectorLayerInfo {
                id: local_name.to_string(),
                description: Some(format!("Vector layer for {}", local_name)),
                min_zoom: source.min_zoom,
                max_zoom: source.max_zoom,
                fields: schema.fields,
            }],
        })
    }

    async fn get_layer_schema(&self, layer_name: &str) -> LayerSchema {
        let (workspace, name) = match layer_name.split_once(':') {
            Some((ws, name)) => (Some(ws), name),
            None => (self.workspace.as_deref(), layer_name),
        };
        let Some(workspace) = workspace else {
            tracing::debug!(layer = layer_name, "no workspace, skipping schema lookup");
            return LayerSchema::default();
        };

        let url = self
            .client
            .endpoint(&format!("rest/workspaces/{}/featuretypes/{}.json", workspace, name));
        match self.client.get_json::<FeatureTypeEnvelope>(&url, &[]).await {
            Ok(envelope) => {
                let feature_type = envelope.feature_type;
                let fields = feature_type
                    .attributes
                    .map(|a| a.attribute.into_vec())
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|attr| {
                        let kind = field_type(attr.binding.as_deref().unwrap_or("String"))?;
                        Some((attr.name, kind.to_string()))
                    })
                    .collect();
                let bounds = feature_type
                    .lat_lon_bbox
                    .map(|b| [b.minx, b.miny, b.maxx, b.maxy]);
                LayerSchema { fields, bounds }
            }
            Err(err) => {
                tracing::warn!(layer = layer_name, error = %err, "could not read layer schema");
                LayerSchema::default()
            }
        }
    }

    /// HEAD probe for one XYZ tile coordinate
    pub async fn test_tile_availability(&self, layer_name: &str, z: u8, x: u32, y: u32) -> bool {
        if z > 30 || x >= (1u32 << z) || y >= (1u32 << z) {
            tracing::debug!(layer = layer_name, z, x, y, "tile coordinate out of range");
            return false;
        }

        let source = self.generate_source_config(layer_name, &VectorSourceOptions::new());
        let row = match source.scheme {
            TileScheme::Xyz => y,
            TileScheme::Tms => (1u32 << z) - 1 - y,
        };
        let url = source
            .url
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &row.to_string());

        match self.client.head(&url).await {
            Ok(status) => {
                tracing::debug!(layer = layer_name, z, x, y, %status, "tile probe");
                status.is_success()
            }
            Err(err) => {
                tracing::debug!(layer = layer_name, error = %err, "tile probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for MvtAdapter {
    type Options = VectorSourceOptions;
    type SourceConfig = VectorSourceConfig;

    fn protocol(&self) -> Protocol {
        Protocol::TiledVector
    }

    /// Vector layers advertised by the tile cache's WMTS document
    async fn get_capabilities(&self) -> SourceResult<Capabilities> {
        let query = [
            ("SERVICE", "WMTS".to_string()),
            ("VERSION", "1.0.0".to_string()),
            ("REQUEST", "GetCapabilities".to_string()),
        ];
        let url = self.client.endpoint("gwc/service/wmts");
        let xml = self.client.get_text(&url, &query).await?;
        let caps = capabilities::parse_wmts(&xml)?;
        tracing::debug!(layers = caps.layers.len(), "parsed WMTS capabilities");
        Ok(caps)
    }

    fn generate_source_config(
        &self,
        layer_name: &str,
        options: &VectorSourceOptions,
    ) -> VectorSourceConfig {
        VectorSourceConfig {
            url: self.generate_tile_url(layer_name, options),
            min_zoom: options.min_zoom.unwrap_or(DEFAULT_MIN_ZOOM),
            max_zoom: options.max_zoom.unwrap_or(DEFAULT_MAX_ZOOM),
            scheme: TileScheme::Tms,
        }
    }
}
