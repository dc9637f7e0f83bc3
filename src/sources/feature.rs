//! Feature-query adapter (WFS 2.0.0)

use std::time::Duration;

use async_trait::async_trait;
use layer_types::FeatureCollection;
use serde::{Deserialize, Serialize};

use crate::config::GeoServerConfig;
use crate::error::SourceResult;
use crate::sources::capabilities;
use crate::sources::http::ServiceClient;
use crate::sources::{qualify, Capabilities, Protocol, SourceAdapter, SourceDescriptor};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_FEATURES: u32 = 1000;
pub const DEFAULT_CRS: &str = "EPSG:4326";

const GEOJSON_FORMAT: &str = "application/json";
const GML_FORMAT: &str = "application/gml+xml; version=3.2";

/// GetFeature parameters
#[derive(Debug, Clone, Default)]
pub struct FeatureQuery {
    pub max_features: Option<u32>,
    /// `[minx, miny, maxx, maxy]` in `crs`
    pub bbox: Option<[f64; 4]>,
    /// Output reference system, EPSG:4326 when unset
    pub crs: Option<String>,
    pub property_names: Vec<String>,
    /// Encoded OGC filter (XML)
    pub filter: Option<String>,
}

impl FeatureQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_features(mut self, max: u32) -> Self {
        self.max_features = Some(max);
        self
    }

    pub fn with_bbox(mut self, bbox: [f64; 4]) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn with_properties(mut self, names: Vec<String>) -> Self {
        self.property_names = names;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn crs(&self) -> &str {
        self.crs.as_deref().unwrap_or(DEFAULT_CRS)
    }
}

/// Caller overrides for a feature source
#[derive(Debug, Clone, Default)]
pub struct FeatureSourceOptions {
    pub max_features: Option<u32>,
    pub crs: Option<String>,
    pub output_format: Option<String>,
}

impl FeatureSourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_features(mut self, max: u32) -> Self {
        self.max_features = Some(max);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSourceConfig {
    /// WFS endpoint (`<root>/wfs`)
    pub url: String,
    pub type_name: String,
    pub version: String,
    pub output_format: String,
    pub max_features: u32,
    pub crs: String,
}

/// WFS adapter
#[derive(Debug, Clone)]
pub struct WfsAdapter {
    client: ServiceClient,
    workspace: Option<String>,
}

impl WfsAdapter {
    pub fn new(config: &GeoServerConfig) -> SourceResult<Self> {
        Ok(Self {
            client: ServiceClient::new(Protocol::FeatureQuery, config, DEFAULT_TIMEOUT)?,
            workspace: config.workspace.clone(),
        })
    }

    fn endpoint(&self) -> String {
        self.client.endpoint("wfs")
    }

    fn get_feature_params(
        &self,
        type_name: &str,
        query: &FeatureQuery,
        output_format: &str,
    ) -> Vec<(&'static str, String)> {
        let crs = query.crs();
        let mut params = vec![
            ("service", "WFS".to_string()),
            ("version", "2.0.0".to_string()),
            ("request", "GetFeature".to_string()),
            ("typeNames", qualify(self.workspace.as_deref(), type_name)),
            ("outputFormat", output_format.to_string()),
            ("srsName", crs.to_string()),
        ];

        if let Some(max) = query.max_features {
            params.push(("count", max.to_string()));
        }
        // FILTER and BBOX are mutually exclusive in WFS 2.0.
        match (&query.filter, query.bbox) {
            (Some(filter), _) => params.push(("filter", filter.clone())),
            (None, Some(bbox)) => params.push((
                "bbox",
                format!("{},{},{},{},{}", bbox[0], bbox[1], bbox[2], bbox[3], crs),
            )),
            (None, None) => {}
        }
        if !query.property_names.is_empty() {
            params.push(("propertyName", query.property_names.join(",")));
        }
        params
    }

    /// GetFeature as GeoJSON in the requested CRS
    pub async fn get_features(
        &self,
        type_name: &str,
        query: &FeatureQuery,
    ) -> SourceResult<FeatureCollection> {
        let params = self.get_feature_params(type_name, query, GEOJSON_FORMAT);
        tracing::debug!(type_name, crs = query.crs(), "WFS GetFeature");
        let collection: FeatureCollection = self.client.get_json(&self.endpoint(), &params).await?;
        tracing::debug!(type_name, features = collection.features.len(), "WFS GetFeature complete");
        Ok(collection)
    }

    /// GetFeature as GML 3.2 text, for clients that need the legacy format
    pub async fn get_features_markup(
        &self,
        type_name: &str,
        query: &FeatureQuery,
    ) -> SourceResult<String> {
        let params = self.get_feature_params(type_name, query, GML_FORMAT);
        self.client.get_text(&self.endpoint(), &params).await
    }

    /// Resolve one feature type from the capability listing
    ///
    /// Matches the exact name or a workspace-qualified `ws:name`.
    pub async fn get_feature_type(&self, type_name: &str) -> SourceResult<Option<SourceDescriptor>> {
        self.get_layer_info(type_name).await
    }
}

#[async_trait]
impl SourceAdapter for WfsAdapter {
    type Options = FeatureSourceOptions;
    type SourceConfig = FeatureSourceConfig;

    fn protocol(&self) -> Protocol {
        Protocol::FeatureQuery
    }

    async fn get_capabilities(&self) -> SourceResult<Capabilities> {
        let query = [
            ("service", "WFS".to_string()),
            ("version", "2.0.0".to_string()),
            ("request", "GetCapabilities".to_string()),
        ];
        let xml = self.client.get_text(&self.endpoint(), &query).await?;
        let caps = capabilities::parse_wfs(&xml)?;
        tracing::debug!(feature_types = caps.layers.len(), "parsed WFS capabilities");
        Ok(caps)
    }

    fn generate_source_config(
        &self,
        type_name: &str,
        options: &FeatureSourceOptions,
    ) -> FeatureSourceConfig {
        FeatureSourceConfig {
            url: self.endpoint(),
            type_name: qualify(self.workspace.as_deref(), type_name),
            version: "2.0.0".to_string(),
            output_format: options
                .output_format
                .clone()
                .unwrap_or_else(|| GEOJSON_FORMAT.to_string()),
            max_features: options.max_features.unwrap_or(DEFAULT_MAX_FEATURES),
            crs: options.crs.clone().unwrap_or_else(|| DEFAULT_CRS.to_string()),
        }
    }
}
