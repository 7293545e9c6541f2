use foundation::math::Vec2;
use foundation::math::mercator;

/// Geographic position in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoPos {
    pub lat_deg: f64,
    pub lon_deg: f64,
}

impl GeoPos {
    pub const fn new(lat_deg: f64, lon_deg: f64) -> Self {
        Self { lat_deg, lon_deg }
    }
}

/// Capability the clustering engine consumes to move between geographic and
/// projected coordinates and to read the camera scale.
///
/// Notes:
/// - `geo_to_proj` must be deterministic and total on the valid lat/lon
///   rectangle; `proj_to_geo` is its inverse within the projection bounds.
/// - `current_scale` is strictly positive; larger means more zoomed in.
pub trait Projection {
    fn geo_to_proj(&self, geo: GeoPos) -> Vec2;
    fn proj_to_geo(&self, proj: Vec2) -> GeoPos;
    fn current_scale(&self) -> f64;
}

/// Web Mercator projection with a host-updated camera scale.
#[derive(Debug, Clone, PartialEq)]
pub struct WebMercator {
    scale: f64,
}

impl WebMercator {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }
}

impl Projection for WebMercator {
    fn geo_to_proj(&self, geo: GeoPos) -> Vec2 {
        mercator::geo_to_world(geo.lat_deg, geo.lon_deg)
    }

    fn proj_to_geo(&self, proj: Vec2) -> GeoPos {
        let (lat_deg, lon_deg) = mercator::world_to_geo(proj);
        GeoPos::new(lat_deg, lon_deg)
    }

    fn current_scale(&self) -> f64 {
        self.scale
    }
}

/// Identity plane mapping: longitude is `x`, latitude is `y`.
///
/// For pre-projected data and for tests that want literal projected
/// coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarProjection {
    scale: f64,
}

impl PlanarProjection {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }
}

impl Projection for PlanarProjection {
    fn geo_to_proj(&self, geo: GeoPos) -> Vec2 {
        Vec2::new(geo.lon_deg, geo.lat_deg)
    }

    fn proj_to_geo(&self, proj: Vec2) -> GeoPos {
        GeoPos::new(proj.y, proj.x)
    }

    fn current_scale(&self) -> f64 {
        self.scale
    }
}
