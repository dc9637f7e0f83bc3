//! Tiled-raster adapter (WMS 1.3.0)
//!
//! Builds GetMap tile templates for the renderer and runs GetFeatureInfo
//! point queries. The bounding box of each tile is left as the
//! `{bbox-epsg-3857}` placeholder, filled in by the map engine per tile.

use std::time::Duration;

use async_trait::async_trait;
use layer_types::FeatureCollection;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::config::GeoServerConfig;
use crate::error::SourceResult;
use crate::sources::capabilities;
use crate::sources::http::ServiceClient;
use crate::sources::{qualify, Capabilities, Protocol, SourceAdapter};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Placeholder the renderer substitutes with each tile's EPSG:3857 bbox
pub const BBOX_PLACEHOLDER: &str = "{bbox-epsg-3857}";

/// Caller overrides for a raster source
#[derive(Debug, Clone, Default)]
pub struct RasterSourceOptions {
    pub styles: Option<String>,
    pub format: Option<String>,
    pub transparent: Option<bool>,
    pub version: Option<String>,
    pub crs: Option<String>,
    pub tile_size: Option<u32>,
}

impl RasterSourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_styles(mut self, styles: impl Into<String>) -> Self {
        self.styles = Some(styles.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn opaque(mut self) -> Self {
        self.transparent = Some(false);
        self
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn with_tile_size(mut self, size: u32) -> Self {
        self.tile_size = Some(size);
        self
    }
}

/// Fully resolved WMS source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterSourceConfig {
    /// WMS endpoint (`<root>/wms`)
    pub url: String,
    /// Workspace-qualified layer name
    pub layers: String,
    pub styles: String,
    pub format: String,
    pub transparent: bool,
    pub version: String,
    pub crs: String,
    pub tile_size: u32,
}

/// WMS adapter
#[derive(Debug, Clone)]
pub struct WmsAdapter {
    client: ServiceClient,
    workspace: Option<String>,
}

impl WmsAdapter {
    pub fn new(config: &GeoServerConfig) -> SourceResult<Self> {
        Ok(Self {
            client: ServiceClient::new(Protocol::TiledRaster, config, DEFAULT_TIMEOUT)?,
            workspace: config.workspace.clone(),
        })
    }

    fn endpoint(&self) -> String {
        self.client.endpoint("wms")
    }

    /// GetMap URL template for one layer
    pub fn generate_tile_url(&self, layer_name: &str, options: &RasterSourceOptions) -> String {
        let source = self.generate_source_config(layer_name, options);
        let size = source.tile_size.to_string();

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("service", "WMS")
            .append_pair("version", &source.version)
            .append_pair("request", "GetMap")
            .append_pair("layers", &source.layers)
            .append_pair("styles", &source.styles)
            .append_pair("format", &source.format)
            .append_pair("transparent", if source.transparent { "true" } else { "false" })
            .append_pair("crs", &source.crs)
            .append_pair("width", &size)
            .append_pair("height", &size)
            .finish();

        // The placeholder must survive unencoded for the renderer to find it.
        format!("{}?{}&bbox={}", source.url, query, BBOX_PLACEHOLDER)
    }

    /// GetFeatureInfo point query
    ///
    /// `bbox` is the rendered view in the source CRS; `pixel_x`/`pixel_y` are
    /// the query point inside a `width` x `height` image. Returns `None` when
    /// no feature is hit.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_feature_info(
        &self,
        layer_name: &str,
        bbox: [f64; 4],
        width: u32,
        height: u32,
        pixel_x: u32,
        pixel_y: u32,
        options: &RasterSourceOptions,
    ) -> SourceResult<Option<FeatureCollection>> {
        let source = self.generate_source_config(layer_name, options);
        let bbox = bbox
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let query = [
            ("service", "WMS".to_string()),
            ("version", source.version.clone()),
            ("request", "GetFeatureInfo".to_string()),
            ("layers", source.layers.clone()),
            ("query_layers", source.layers.clone()),
            ("styles", source.styles.clone()),
            ("format", source.format.clone()),
            ("info_format", "application/json".to_string()),
            ("crs", source.crs.clone()),
            ("width", width.to_string()),
            ("height", height.to_string()),
            ("bbox", bbox),
            ("i", pixel_x.to_string()),
            ("j", pixel_y.to_string()),
            ("x", pixel_x.to_string()),
            ("y", pixel_y.to_string()),
        ];

        tracing::debug!(layer = %source.layers, pixel_x, pixel_y, "WMS GetFeatureInfo");
        let collection: FeatureCollection = self.client.get_json(&source.url, &query).await?;
        if collection.is_empty() {
            Ok(None)
        } else {
            Ok(Some(collection))
        }
    }
}

#[async_trait]
impl SourceAdapter for WmsAdapter {
    type Options = RasterSourceOptions;
    type SourceConfig = RasterSourceConfig;

    fn protocol(&self) -> Protocol {
        Protocol::TiledRaster
    }

    async fn get_capabilities(&self) -> SourceResult<Capabilities> {
        let query = [
            ("service", "WMS".to_string()),
            ("version", "1.3.0".to_string()),
            ("request", "GetCapabilities".to_string()),
        ];
        let xml = self.client.get_text(&self.endpoint(), &query).await?;
        let caps = capabilities::parse_wms(&xml)?;
        tracing::debug!(layers = caps.layers.len(), "parsed WMS capabilities");
        Ok(caps)
    }

    fn generate_source_config(
        &self,
        layer_name: &str,
        options: &RasterSourceOptions,
    ) -> RasterSourceConfig {
        RasterSourceConfig {
            url: self.endpoint(),
            layers: qualify(self.workspace.as_deref(), layer_name),
            styles: options.styles.clone().unwrap_or_default(),
            format: options
                .format
                .clone()
                .unwrap_or_else(|| "image/png".to_string()),
            transparent: options.transparent.unwrap_or(true),
            version: options
                .version
                .clone()
                .unwrap_or_else(|| "1.3.0".to_string()),
            crs: options
                .crs
                .clone()
                .unwrap_or_else(|| "EPSG:3857".to_string()),
            tile_size: options.tile_size.unwrap_or(256),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> WmsAdapter {
        let config = GeoServerConfig::new("http://gs.local/geoserver/").with_workspace("city");
        WmsAdapter::new(&config).unwrap()
    }

    #[test]
    fn test_source_config_defaults() {
        let source = adapter().generate_source_config("parcels", &RasterSourceOptions::new());
        assert_eq!(source.url, "http://gs.local/geoserver/wms");
        assert_eq!(source.layers, "city:parcels");
        assert_eq!(source.styles, "");
        assert_eq!(source.format, "image/png");
        assert!(source.transparent);
        assert_eq!(source.version, "1.3.0");
        assert_eq!(source.crs, "EPSG:3857");
        assert_eq!(source.tile_size, 256);
    }

    #[test]
    fn test_source_config_overrides() {
        let options = RasterSourceOptions::new()
            .with_format("image/jpeg")
            .opaque()
            .with_tile_size(512);
        let source = adapter().generate_source_config("other:ortho", &options);
        assert_eq!(source.layers, "other:ortho");
        assert_eq!(source.format, "image/jpeg");
        assert!(!source.transparent);
        assert_eq!(source.tile_size, 512);
    }

    #[test]
    fn test_tile_url_keeps_bbox_placeholder() {
        let url = adapter().generate_tile_url("parcels", &RasterSourceOptions::new());
        assert!(url.starts_with("http://gs.local/geoserver/wms?service=WMS&version=1.3.0&request=GetMap"));
        assert!(url.contains("layers=city%3Aparcels"));
        assert!(url.contains("format=image%2Fpng"));
        assert!(url.contains("width=256&height=256"));
        assert!(url.ends_with("&bbox={bbox-epsg-3857}"));
    }
}
