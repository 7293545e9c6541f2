use cluster::{ClusterConfig, FrontierCluster, MarkerImage, PlacemarkSet};
use foundation::math::Vec2;

use crate::layer::{Layer, LayerId};

/// Rendering hints for a placemark layer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MarkerStyle {
    pub visible: bool,
    /// Host image handle drawn for single markers; `None` lets the renderer
    /// fall back to its built-in shape.
    pub image: Option<MarkerImage>,
    /// Single-marker size in pixels.
    pub point_size_px: f32,
    /// Cluster badge size in pixels.
    pub cluster_size_px: f32,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            visible: true,
            image: None,
            point_size_px: 50.0,
            cluster_size_px: 50.0,
        }
    }
}

/// What a placemark layer hands to the renderer for one frame: visible
/// single markers, visible cluster badges, and the style to draw them with.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlacemarksSnapshot {
    pub points: Vec<Vec2>,
    pub clusters: Vec<FrontierCluster>,
    pub style: MarkerStyle,
}

/// Layer of clustered placemarks.
///
/// A thin shell around a `PlacemarkSet`: mutations go through
/// `placemarks_mut`, rendering reads an extracted snapshot.
#[derive(Debug, Clone)]
pub struct PlacemarksLayer {
    id: LayerId,
    pub style: MarkerStyle,
    placemarks: PlacemarkSet,
}

impl PlacemarksLayer {
    pub fn new(id: u64, config: ClusterConfig) -> Self {
        let style = MarkerStyle {
            image: config.marker_image,
            ..MarkerStyle::default()
        };
        Self {
            id: LayerId(id),
            style,
            placemarks: PlacemarkSet::new(config),
        }
    }

    pub fn placemarks(&self) -> &PlacemarkSet {
        &self.placemarks
    }

    pub fn placemarks_mut(&mut self) -> &mut PlacemarkSet {
        &mut self.placemarks
    }

    /// Extracts the frame snapshot at `camera_scale`. A hidden layer yields
    /// an empty snapshot.
    pub fn extract(&self, camera_scale: f64) -> PlacemarksSnapshot {
        if !self.style.visible {
            return PlacemarksSnapshot {
                style: self.style,
                ..PlacemarksSnapshot::default()
            };
        }

        let frontier = self.placemarks.frontier(camera_scale);
        PlacemarksSnapshot {
            points: frontier.points,
            clusters: frontier.clusters,
            style: self.style,
        }
    }
}

impl Layer for PlacemarksLayer {
    fn id(&self) -> LayerId {
        self.id
    }
}
