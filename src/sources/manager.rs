//! Layer Source Manager
//!
//! Orchestrates the three protocol adapters: aggregate discovery, unified
//! source and layer configuration for the renderer, and health checks.
//! Aggregate calls degrade per adapter; single-target calls propagate.

use layer_types::FeatureCollection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::GeoServerConfig;
use crate::error::SourceResult;
use crate::sources::{
    Capabilities, FeatureQuery, FeatureSourceOptions, MvtAdapter, Protocol, RasterSourceOptions, SourceAdapter,
    SourceDescriptor, TileScheme, TilesetInfo, VectorSourceOptions, WfsAdapter, WmsAdapter,
};

// =============================================================================
// Result Types
// =============================================================================

/// Layer names advertised per protocol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailableLayers {
    pub raster: Vec<String>,
    pub feature: Vec<String>,
    pub vector: Vec<String>,
}

impl AvailableLayers {
    pub fn for_protocol(&self, protocol: Protocol) -> &[String] {
        match protocol {
            Protocol::TiledRaster => &self.raster,
            Protocol::FeatureQuery => &self.feature,
            Protocol::TiledVector => &self.vector,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raster.is_empty() && self.feature.is_empty() && self.vector.is_empty()
    }
}

/// Reachability per protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub raster: bool,
    pub feature: bool,
    pub vector: bool,
}

impl ConnectionReport {
    pub fn all_ok(&self) -> bool {
        self.raster && self.feature && self.vector
    }
}

/// Renderer source, one shape per protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Raster {
        id: String,
        tiles: Vec<String>,
        #[serde(rename = "tileSize")]
        tile_size: u32,
    },
    GeoJson {
        id: String,
        data: FeatureCollection,
    },
    Vector {
        id: String,
        tiles: Vec<String>,
        #[serde(rename = "minzoom")]
        min_zoom: u8,
        #[serde(rename = "maxzoom")]
        max_zoom: u8,
        scheme: TileScheme,
    },
}

impl SourceConfig {
    pub fn id(&self) -> &str {
        match self {
            Self::Raster { id, .. } | Self::GeoJson { id, .. } | Self::Vector { id, .. } => id,
        }
    }
}

/// Per-protocol options for [`LayerSourceManager::create_source_config`]
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub raster: RasterSourceOptions,
    pub feature: FeatureSourceOptions,
    /// Query used to load the in-memory feature collection
    pub query: FeatureQuery,
    pub vector: VectorSourceOptions,
}

impl SourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raster(mut self, options: RasterSourceOptions) -> Self {
        self.raster = options;
        self
    }

    pub fn with_query(mut self, query: FeatureQuery) -> Self {
        self.query = query;
        self
    }

    pub fn with_vector(mut self, options: VectorSourceOptions) -> Self {
        self.vector = options;
        self
    }
}

/// Renderer layer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderType {
    Fill,
    Line,
    Circle,
    Symbol,
    Raster,
}

impl RenderType {
    /// Render type for a geometry type name (`MultiPolygon`, `LineString`, ...)
    pub fn for_geometry(geometry: &str) -> Self {
        let geometry = geometry.to_ascii_lowercase();
        if geometry.contains("polygon") {
            Self::Fill
        } else if geometry.contains("line") || geometry.contains("curve") {
            Self::Line
        } else if geometry.contains("point") {
            Self::Circle
        } else {
            Self::Fill
        }
    }

    /// Default paint properties
    pub fn default_paint(&self) -> Map<String, Value> {
        let paint = match self {
            Self::Fill => json!({
                "fill-color": "#3388ff",
                "fill-opacity": 0.6,
                "fill-outline-color": "#ffffff",
            }),
            Self::Line => json!({
                "line-color": "#3388ff",
                "line-width": 2,
                "line-opacity": 0.8,
            }),
            Self::Circle => json!({
                "circle-color": "#3388ff",
                "circle-radius": 5,
                "circle-opacity": 0.8,
                "circle-stroke-color": "#ffffff",
                "circle-stroke-width": 1,
            }),
            Self::Symbol => json!({
                "text-color": "#000000",
                "text-halo-color": "#ffffff",
                "text-halo-width": 1,
            }),
            Self::Raster => json!({ "raster-opacity": 1 }),
        };
        match paint {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Caller styling for [`LayerSourceManager::create_layer_config`]
#[derive(Debug, Clone, Default)]
pub struct LayerStyleOptions {
    /// Explicit render type; derived from `geometry` when unset
    pub layer_type: Option<RenderType>,
    /// Geometry type of the source data
    pub geometry: Option<String>,
    pub paint: Map<String, Value>,
    pub layout: Map<String, Value>,
    pub filter: Option<Value>,
}

impl LayerStyleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, layer_type: RenderType) -> Self {
        self.layer_type = Some(layer_type);
        self
    }

    pub fn with_geometry(mut self, geometry: impl Into<String>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    pub fn with_paint(mut self, key: impl Into<String>, value: Value) -> Self {
        self.paint.insert(key.into(), value);
        self
    }

    pub fn with_layout(mut self, key: impl Into<String>, value: Value) -> Self {
        self.layout.insert(key.into(), value);
        self
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Renderer layer definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: RenderType,
    pub source: String,
    /// Layer inside the vector tile to draw from
    #[serde(rename = "source-layer", skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    pub layout: Map<String, Value>,
    pub paint: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

/// Metadata for one layer, shaped by protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerInfo {
    Descriptor(SourceDescriptor),
    Tileset(TilesetInfo),
}

// =============================================================================
// Manager
// =============================================================================

/// Runs the WMS, WFS and MVT adapters against one GeoServer
#[derive(Debug, Clone)]
pub struct LayerSourceManager {
    wms: WmsAdapter,
    wfs: WfsAdapter,
    mvt: MvtAdapter,
}

impl LayerSourceManager {
    pub fn new(config: &GeoServerConfig) -> SourceResult<Self> {
        Ok(Self {
            wms: WmsAdapter::new(config)?,
            wfs: WfsAdapter::new(config)?,
            mvt: MvtAdapter::new(config)?,
        })
    }

    pub fn wms(&self) -> &WmsAdapter {
        &self.wms
    }

    pub fn wfs(&self) -> &WfsAdapter {
        &self.wfs
    }

    pub fn mvt(&self) -> &MvtAdapter {
        &self.mvt
    }

    /// Discover layers on all three services concurrently
    ///
    /// A failed or timed-out service contributes an empty list.
    pub async fn get_available_layers(&self) -> AvailableLayers {
        let (raster, feature, vector) = tokio::join!(
            self.wms.get_capabilities(),
            self.wfs.get_capabilities(),
            self.mvt.get_capabilities(),
        );

        let names = |result: SourceResult<Capabilities>| match result {
            Ok(caps) => caps.layer_names(),
            Err(err) => {
                tracing::warn!(protocol = %err.protocol, error = %err, "capability discovery failed");
                Vec::new()
            }
        };

        let layers = AvailableLayers {
            raster: names(raster),
            feature: names(feature),
            vector: names(vector),
        };
        tracing::info!(
            raster = layers.raster.len(),
            feature = layers.feature.len(),
            vector = layers.vector.len(),
            "available layers"
        );
        layers
    }

    /// Renderer source for a layer
    ///
    /// Feature-query sources load their data eagerly; the other two are
    /// URL templates.
    pub async fn create_source_config(
        &self,
        layer_name: &str,
        protocol: Protocol,
        options: &SourceOptions,
    ) -> SourceResult<SourceConfig> {
        let id = source_id(layer_name, protocol);
        let config = match protocol {
            Protocol::TiledRaster => {
                let source = self.wms.generate_source_config(layer_name, &options.raster);
                SourceConfig::Raster {
                    id,
                    tiles: vec![self.wms.generate_tile_url(layer_name, &options.raster)],
                    tile_size: source.tile_size,
                }
            }
            Protocol::FeatureQuery => {
                let source = self.wfs.generate_source_config(layer_name, &options.feature);
                let mut query = options.query.clone();
                if query.max_features.is_none() {
                    query.max_features = Some(source.max_features);
                }
                if query.crs.is_none() {
                    query.crs = Some(source.crs);
                }
                let data = self.wfs.get_features(layer_name, &query).await?;
                SourceConfig::GeoJson { id, data }
            }
            Protocol::TiledVector => {
                let source = self.mvt.generate_source_config(layer_name, &options.vector);
                SourceConfig::Vector {
                    id,
                    tiles: vec![source.url],
                    min_zoom: source.min_zoom,
                    max_zoom: source.max_zoom,
                    scheme: source.scheme,
                }
            }
        };
        Ok(config)
    }

    /// Renderer layer for a source, default paint merged with overrides
    pub fn create_layer_config(
        &self,
        layer_name: &str,
        source: &str,
        protocol: Protocol,
        options: &LayerStyleOptions,
    ) -> LayerConfig {
        let layer_type = match protocol {
            Protocol::TiledRaster => RenderType::Raster,
            _ => options
                .layer_type
                .or_else(|| options.geometry.as_deref().map(RenderType::for_geometry))
                .unwrap_or(RenderType::Fill),
        };

        let mut layout = Map::new();
        layout.insert("visibility".to_string(), json!("visible"));
        layout.extend(options.layout.clone());

        let mut paint = layer_type.default_paint();
        paint.extend(options.paint.clone());

        let source_layer = (protocol == Protocol::TiledVector)
            .then(|| layer_name.rsplit(':').next().unwrap_or(layer_name).to_string());

        LayerConfig {
            id: source_id(layer_name, protocol),
            layer_type,
            source: source.to_string(),
            source_layer,
            layout,
            paint,
            filter: options.filter.clone(),
        }
    }

    /// Metadata for one layer on one service
    ///
    /// `Ok(None)` when the service does not know the layer.
    pub async fn get_layer_info(
        &self,
        layer_name: &str,
        protocol: Protocol,
    ) -> SourceResult<Option<LayerInfo>> {
        match protocol {
            Protocol::TiledRaster => Ok(self
                .wms
                .get_layer_info(layer_name)
                .await?
                .map(LayerInfo::Descriptor)),
            Protocol::FeatureQuery => Ok(self
                .wfs
                .get_feature_type(layer_name)
                .await?
                .map(LayerInfo::Descriptor)),
            Protocol::TiledVector => Ok(Some(LayerInfo::Tileset(
                self.mvt.get_tileset_info(layer_name).await?,
            ))),
        }
    }

    /// Probe all three services concurrently
    pub async fn test_connections(&self) -> ConnectionReport {
        let (raster, feature, vector) = tokio::join!(
            self.wms.test_connection(),
            self.wfs.test_connection(),
            self.mvt.test_connection(),
        );
        let report = ConnectionReport {
            raster,
            feature,
            vector,
        };
        tracing::info!(?report, "connection test");
        report
    }

    /// WMS point query
    #[allow(clippy::too_many_arguments)]
    pub async fn get_feature_info(
        &self,
        layer_name: &str,
        bbox: [f64; 4],
        width: u32,
        height: u32,
        pixel_x: u32,
        pixel_y: u32,
    ) -> SourceResult<Option<FeatureCollection>> {
        self.wms
            .get_feature_info(
                layer_name,
                bbox,
                width,
                height,
                pixel_x,
                pixel_y,
                &RasterSourceOptions::new(),
            )
            .await
    }

    /// WFS feature retrieval
    pub async fn get_features(
        &self,
        layer_name: &str,
        query: &FeatureQuery,
    ) -> SourceResult<FeatureCollection> {
        self.wfs.get_features(layer_name, query).await
    }
}

/// `<layer>-<wms|wfs|mvt>`
pub fn source_id(layer_name: &str, protocol: Protocol) -> String {
    format!("{}-{}", layer_name, protocol.suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LayerSourceManager {
        LayerSourceManager::new(&GeoServerConfig::new("http://gs.local/geoserver").with_workspace("city"))
            .unwrap()
    }

    #[test]
    fn test_render_type_for_geometry() {
        assert_eq!(RenderType::for_geometry("MultiPolygon"), RenderType::Fill);
        assert_eq!(RenderType::for_geometry("LineString"), RenderType::Line);
        assert_eq!(RenderType::for_geometry("MultiLineString"), RenderType::Line);
        assert_eq!(RenderType::for_geometry("Point"), RenderType::Circle);
        assert_eq!(RenderType::for_geometry("Unknown"), RenderType::Fill);
    }

    #[test]
    fn test_layer_config_merges_paint() {
        let options = LayerStyleOptions::new()
            .with_geometry("MultiLineString")
            .with_paint("line-color", json!("#ff0000"))
            .with_filter(json!(["==", "kind", "road"]));
        let layer = manager().create_layer_config("roads", "roads-wfs", Protocol::FeatureQuery, &options);

        assert_eq!(layer.id, "roads-wfs");
        assert_eq!(layer.layer_type, RenderType::Line);
        assert_eq!(layer.paint["line-color"], json!("#ff0000"));
        assert_eq!(layer.paint["line-width"], json!(2));
        assert_eq!(layer.layout["visibility"], json!("visible"));
        assert!(layer.source_layer.is_none());
        assert!(layer.filter.is_some());
    }

    #[test]
    fn test_layer_id_is_independent_of_source_name() {
        let layer = manager().create_layer_config(
            "roads",
            "shared-basemap",
            Protocol::FeatureQuery,
            &LayerStyleOptions::new(),
        );
        assert_eq!(layer.id, "roads-wfs");
        assert_eq!(layer.source, "shared-basemap");
    }

    #[test]
    fn test_vector_layer_records_source_layer() {
        let layer = manager().create_layer_config(
            "city:parcels",
            "city:parcels-mvt",
            Protocol::TiledVector,
            &LayerStyleOptions::new(),
        );
        assert_eq!(layer.source_layer.as_deref(), Some("parcels"));
        assert_eq!(layer.layer_type, RenderType::Fill);

        let value = serde_json::to_value(&layer).unwrap();
        assert_eq!(value["source-layer"], "parcels");
        assert_eq!(value["type"], "fill");
    }

    #[test]
    fn test_raster_layer_ignores_requested_type() {
        let layer = manager().create_layer_config(
            "ortho",
            "ortho-wms",
            Protocol::TiledRaster,
            &LayerStyleOptions::new().with_type(RenderType::Circle),
        );
        assert_eq!(layer.layer_type, RenderType::Raster);
        assert_eq!(layer.paint["raster-opacity"], json!(1));
    }

    #[tokio::test]
    async fn test_template_sources_need_no_network() {
        let manager = manager();
        let raster = manager
            .create_source_config("ortho", Protocol::TiledRaster, &SourceOptions::new())
            .await
            .unwrap();
        assert_eq!(raster.id(), "ortho-wms");
        let value = serde_json::to_value(&raster).unwrap();
        assert_eq!(value["type"], "raster");
        assert_eq!(value["tileSize"], 256);

        let vector = manager
            .create_source_config("parcels", Protocol::TiledVector, &SourceOptions::new())
            .await
            .unwrap();
        match vector {
            SourceConfig::Vector { id, tiles, min_zoom, max_zoom, scheme } => {
                assert_eq!(id, "parcels-mvt");
                assert_eq!(tiles.len(), 1);
                assert_eq!((min_zoom, max_zoom), (0, 18));
                assert_eq!(scheme, TileScheme::Tms);
            }
            other => panic!("expected vector source, got {:?}", other),
        }
    }
}
