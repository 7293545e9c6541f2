use super::Vec2;

/// Side length of the projected world square.
pub const WORLD_SIZE: f64 = 256.0;
/// Latitude bound of the Web Mercator plane (degrees).
pub const MAX_LATITUDE_DEG: f64 = 85.051_128_779_806_59;

/// Forward Web Mercator: (lat, lon) degrees to the projected world square.
///
/// `x` grows eastward, `y` grows southward (screen convention). Latitude is
/// clamped to the representable band.
pub fn geo_to_world(lat_deg: f64, lon_deg: f64) -> Vec2 {
    let lat = lat_deg.clamp(-MAX_LATITUDE_DEG, MAX_LATITUDE_DEG);
    let lat_rad = lat.to_radians();

    let x = (lon_deg + 180.0) / 360.0;
    let y = 0.5 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / (2.0 * std::f64::consts::PI);

    Vec2::new(x * WORLD_SIZE, y * WORLD_SIZE)
}

/// Inverse Web Mercator: world-square coordinates back to (lat, lon) degrees.
pub fn world_to_geo(p: Vec2) -> (f64, f64) {
    let x = p.x / WORLD_SIZE;
    let y = p.y / WORLD_SIZE;

    let lon_deg = x * 360.0 - 180.0;
    let n = std::f64::consts::PI * (1.0 - 2.0 * y);
    let lat_deg = n.sinh().atan().to_degrees();

    (lat_deg, lon_deg)
}

/// Map a camera scale to a zoom level: `round(17 - log2(1 / scale))`.
///
/// Larger scales (more zoomed in) yield larger zoom levels. The result is
/// unclamped; callers clip it to their level range.
pub fn scale_to_zoom(scale: f64) -> i32 {
    let scale_change = 1.0 / scale;
    (17.0 - scale_change.ln() * std::f64::consts::LOG2_E).round() as i32
}

#[cfg(test)]
mod tests {
    use super::{MAX_LATITUDE_DEG, WORLD_SIZE, geo_to_world, scale_to_zoom, world_to_geo};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn origin_maps_to_world_center() {
        let p = geo_to_world(0.0, 0.0);
        assert_close(p.x, WORLD_SIZE * 0.5, 1e-9);
        assert_close(p.y, WORLD_SIZE * 0.5, 1e-9);
    }

    #[test]
    fn longitude_is_linear() {
        assert_close(geo_to_world(0.0, -180.0).x, 0.0, 1e-9);
        assert_close(geo_to_world(0.0, 180.0).x, WORLD_SIZE, 1e-9);
        assert_close(geo_to_world(0.0, 90.0).x, WORLD_SIZE * 0.75, 1e-9);
    }

    #[test]
    fn latitude_is_clamped() {
        let top = geo_to_world(90.0, 0.0);
        let band = geo_to_world(MAX_LATITUDE_DEG, 0.0);
        assert_close(top.y, band.y, 1e-9);
        assert_close(band.y, 0.0, 1e-9);
    }

    #[test]
    fn round_trip_geo_world() {
        let (lat, lon) = (43.288_498, -0.400_979);
        let p = geo_to_world(lat, lon);
        let (lat_rt, lon_rt) = world_to_geo(p);
        assert_close(lat_rt, lat, 1e-9);
        assert_close(lon_rt, lon, 1e-9);
    }

    #[test]
    fn scale_to_zoom_matches_powers_of_two() {
        assert_eq!(scale_to_zoom(1.0), 17);
        assert_eq!(scale_to_zoom(0.5), 16);
        assert_eq!(scale_to_zoom(0.25), 15);
        assert_eq!(scale_to_zoom(2.0), 18);
    }
}
