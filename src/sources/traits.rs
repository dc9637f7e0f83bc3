//! SourceAdapter trait and related types
//!
//! The common shape of the three protocol adapters. Each adapter turns a
//! generic layer name plus options into protocol-specific requests and
//! parses the service's capability document into [`SourceDescriptor`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SourceResult;
use crate::geo::BoundingBox;

/// Service protocols a layer can be sourced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Pre-rendered imagery (WMS GetMap)
    TiledRaster,
    /// Individually queryable features (WFS GetFeature)
    FeatureQuery,
    /// Pre-tiled vector data (MVT through the tile cache)
    TiledVector,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Self::TiledRaster, Self::FeatureQuery, Self::TiledVector];

    /// Suffix used for source and layer ids (`roads-wms`)
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::TiledRaster => "wms",
            Self::FeatureQuery => "wfs",
            Self::TiledVector => "mvt",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TiledRaster => write!(f, "WMS"),
            Self::FeatureQuery => write!(f, "WFS"),
            Self::TiledVector => write!(f, "MVT"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wms" | "tiled-raster" | "raster" => Ok(Self::TiledRaster),
            "wfs" | "feature-query" | "feature" => Ok(Self::FeatureQuery),
            "mvt" | "tiled-vector" | "vector" => Ok(Self::TiledVector),
            other => Err(format!("unknown protocol: {}", other)),
        }
    }
}

// =============================================================================
// Capability Types
// =============================================================================

/// A named style offered for a layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleInfo {
    pub name: String,
    pub title: Option<String>,
    pub legend_url: Option<String>,
}

/// Capability metadata for one remote layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub protocol: Protocol,
    /// Remote name, workspace-qualified when the server qualifies it
    pub name: String,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Vec<String>,
    /// Supported reference systems, default first
    pub crs: Vec<String>,
    pub bbox: Option<BoundingBox>,
    pub styles: Vec<StyleInfo>,
    pub queryable: bool,
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
    pub output_formats: Vec<String>,
}

impl SourceDescriptor {
    pub fn new(protocol: Protocol, name: impl Into<String>) -> Self {
        Self {
            protocol,
            name: name.into(),
            title: None,
            abstract_text: None,
            keywords: Vec::new(),
            crs: Vec::new(),
            bbox: None,
            styles: Vec::new(),
            queryable: false,
            min_zoom: None,
            max_zoom: None,
            output_formats: Vec::new(),
        }
    }

    /// Name without the workspace prefix
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// True if `name` addresses this layer, qualified or not
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || (!name.contains(':') && self.local_name() == name)
    }

    pub fn default_crs(&self) -> Option<&str> {
        self.crs.first().map(String::as_str)
    }
}

/// Parsed service capability document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol: Protocol,
    pub version: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    /// Operations the service advertises (`GetMap`, `GetFeature`, ...)
    pub operations: Vec<String>,
    pub layers: Vec<SourceDescriptor>,
}

impl Capabilities {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            version: None,
            title: None,
            abstract_text: None,
            operations: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name.clone()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&SourceDescriptor> {
        self.layers
            .iter()
            .find(|l| l.name == name)
            .or_else(|| self.layers.iter().find(|l| l.matches(name)))
    }

    pub fn supports(&self, operation: &str) -> bool {
        self.operations.iter().any(|op| op == operation)
    }
}

// =============================================================================
// Trait Definition
// =============================================================================

/// Trait for protocol adapters
///
/// # Implementation Notes
///
/// - Every error returned carries the adapter's [`Protocol`]
/// - `generate_source_config` is pure: no network, no side effects
/// - `test_connection` never fails; it reports reachability as a bool
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Caller options for source configuration
    type Options: Send + Sync;

    /// Protocol-specific source configuration handed to the renderer
    type SourceConfig: Send;

    fn protocol(&self) -> Protocol;

    /// Fetch and parse the service capability document
    async fn get_capabilities(&self) -> SourceResult<Capabilities>;

    /// Build the renderer-facing source configuration for a layer
    fn generate_source_config(&self, layer_name: &str, options: &Self::Options)
        -> Self::SourceConfig;

    /// Resolve one layer's metadata
    ///
    /// `Ok(None)` when the service does not advertise the layer.
    async fn get_layer_info(&self, layer_name: &str) -> SourceResult<Option<SourceDescriptor>> {
        let capabilities = self.get_capabilities().await?;
        Ok(capabilities.find(layer_name).cloned())
    }

    /// Health probe
    async fn test_connection(&self) -> bool {
        match self.get_capabilities().await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(protocol = %self.protocol(), error = %err, "connection test failed");
                false
            }
        }
    }
}
