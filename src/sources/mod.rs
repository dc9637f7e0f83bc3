//! Protocol adapters and the layer source manager
//!
//! Three adapters share one trait ([`SourceAdapter`]) and one HTTP client
//! ([`http::ServiceClient`]):
//!
//! | Protocol | Adapter | Service |
//! |----------|---------|---------|
//! | tiled-raster | [`WmsAdapter`] | WMS 1.3.0 GetMap / GetFeatureInfo |
//! | feature-query | [`WfsAdapter`] | WFS 2.0.0 GetFeature |
//! | tiled-vector | [`MvtAdapter`] | GeoWebCache TMS, `pbf` tiles |
//!
//! [`LayerSourceManager`] runs them side by side.

pub(crate) mod capabilities;
pub mod feature;
pub mod http;
pub mod manager;
pub mod raster;
pub mod traits;
pub mod vector;

pub use feature::{FeatureQuery, FeatureSourceConfig, FeatureSourceOptions, WfsAdapter};
pub use manager::{
    AvailableLayers, ConnectionReport, LayerConfig, LayerInfo, LayerSourceManager,
    LayerStyleOptions, RenderType, SourceConfig, SourceOptions,
};
pub use raster::{RasterSourceConfig, RasterSourceOptions, WmsAdapter};
pub use traits::{Capabilities, Protocol, SourceAdapter, SourceDescriptor, StyleInfo};
pub use vector::{MvtAdapter, TileScheme, TilesetInfo, VectorSourceConfig, VectorSourceOptions};

/// Prefix an unqualified layer name with the configured workspace
pub(crate) fn qualify(workspace: Option<&str>, layer_name: &str) -> String {
    match workspace {
        Some(ws) if !ws.is_empty() && !layer_name.contains(':') => format!("{}:{}", ws, layer_name),
        _ => layer_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify() {
        assert_eq!(qualify(Some("city"), "parcels"), "city:parcels");
        assert_eq!(qualify(Some("city"), "other:parcels"), "other:parcels");
        assert_eq!(qualify(Some(""), "parcels"), "parcels");
        assert_eq!(qualify(None, "parcels"), "parcels");
    }
}
