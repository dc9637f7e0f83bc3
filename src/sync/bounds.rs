//! Viewport-fit command for zoom-to-feature

use layer_types::FeatureCollection;
use serde::Serialize;

use crate::geo::{self, BoundingBox, Direction, Frame};

/// Padding around the fitted features, in pixels
pub const FIT_PADDING: u32 = 100;
/// Closest zoom a fit may reach, so small features are not over-magnified
pub const FIT_MAX_ZOOM: f64 = 18.0;
pub const FIT_DURATION_MS: u64 = 1000;

/// Camera command handed to the rendering collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitBounds {
    /// Geographic frame
    pub bounds: BoundingBox,
    pub padding: u32,
    pub max_zoom: f64,
    pub duration_ms: u64,
    /// Matched features in the geographic frame, for highlighting
    pub features: FeatureCollection,
}

impl FitBounds {
    /// `[[west, south], [east, north]]`
    pub fn corners(&self) -> [[f64; 2]; 2] {
        [
            [self.bounds.min_x, self.bounds.min_y],
            [self.bounds.max_x, self.bounds.max_y],
        ]
    }
}

/// Fit command for a backend selection (EPSG:3857)
///
/// Prefers the backend-supplied `bbox` and falls back to the union of the
/// feature geometries. `None` when nothing was matched.
pub fn fit_selection(selection: &FeatureCollection) -> Option<FitBounds> {
    if selection.is_empty() {
        return None;
    }
    let projected = selection
        .bbox
        .as_deref()
        .and_then(|b| BoundingBox::from_slice(b, Frame::Projected))
        .or_else(|| {
            geo::feature_collection_bbox(selection)
                .map(|[a, b, c, d]| BoundingBox::new(a, b, c, d, Frame::Projected))
        })?;

    Some(FitBounds {
        bounds: projected.to_geographic(),
        padding: FIT_PADDING,
        max_zoom: FIT_MAX_ZOOM,
        duration_ms: FIT_DURATION_MS,
        features: geo::transform_feature_collection(selection, Direction::ToGeographic),
    })
}

#[cfg(test)]
mod tests {
    use layer_types::{Feature, Geometry};

    use super::*;

    fn square(min: f64, max: f64) -> Feature {
        Feature::new(Geometry::Polygon {
            coordinates: vec![vec![
                vec![min, min],
                vec![min, max],
                vec![max, max],
                vec![max, min],
                vec![min, min],
            ]],
        })
    }

    #[test]
    fn test_backend_bbox_wins() {
        let mut selection = FeatureCollection::new(vec![square(1000.0, 2000.0)]);
        selection.bbox = Some(vec![0.0, 0.0, geo::MAX_EXTENT, 0.0]);
        let fit = fit_selection(&selection).unwrap();
        assert!((fit.bounds.max_x - 180.0).abs() < 1e-9);
        assert_eq!(fit.bounds.frame, Frame::Geographic);
        assert_eq!(fit.padding, FIT_PADDING);
    }

    #[test]
    fn test_bbox_from_geometry() {
        let selection = FeatureCollection::new(vec![square(1_000_000.0, 2_000_000.0)]);
        let fit = fit_selection(&selection).unwrap();
        let (lng, lat) = geo::to_geographic(1_000_000.0, 1_000_000.0);
        assert!((fit.bounds.min_x - lng).abs() < 1e-9);
        assert!((fit.bounds.min_y - lat).abs() < 1e-9);
        assert!(fit.bounds.max_x > fit.bounds.min_x);
    }

    #[test]
    fn test_empty_selection() {
        assert!(fit_selection(&FeatureCollection::default()).is_none());
    }
}
