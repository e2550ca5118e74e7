//! Geographic helpers

use std::f64::consts::PI;

use geo::{CoordsIter, Geometry, LineString};

mod distances;

pub use distances::{calculate_distance_matrix, DistanceMetric};

/// Average Earth radius in meters
const EARTH_RADIUS: f64 = 6_371_000.0;

/// Great circle distance between two WGS84 coordinates, in meters
pub fn haversine_dist(lon_1: f64, lat_1: f64, lon_2: f64, lat_2: f64) -> f64 {
    let (lon_1, lat_1, lon_2, lat_2) = (
        lon_1.to_radians(),
        lat_1.to_radians(),
        lon_2.to_radians(),
        lat_2.to_radians(),
    );

    let dlon = lon_2 - lon_1;
    let dlat = lat_2 - lat_1;

    let a = (dlat / 2.0).sin().powi(2) + lat_1.cos() * lat_2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS * a.sqrt().asin()
}

/// Approximation of `meters` in decimal degrees at `latitude`
pub fn meters_to_decimal_degrees(meters: f64, latitude: f64) -> f64 {
    meters / (111.32 * 1000.0 * (latitude * (PI / 180.0)).cos())
}

/// Length of a WGS84 line, in meters
pub fn haversine_length(line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|l| haversine_dist(l.start.x, l.start.y, l.end.x, l.end.y))
        .sum()
}

/// Name of the geometry type, as in WKT
pub fn geom_type(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Structural validity: finite coordinates, lines with two distinct
/// vertices and closed polygon rings
pub fn is_valid(geometry: &Geometry<f64>) -> bool {
    let finite = geometry
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !finite {
        return false;
    }

    match geometry {
        Geometry::LineString(ls) => valid_line(ls),
        Geometry::MultiLineString(mls) => mls.0.iter().all(valid_line),
        Geometry::Polygon(p) => valid_ring(p.exterior()) && p.interiors().iter().all(valid_ring),
        Geometry::MultiPolygon(mp) => mp
            .0
            .iter()
            .all(|p| valid_ring(p.exterior()) && p.interiors().iter().all(valid_ring)),
        Geometry::GeometryCollection(gc) => gc.0.iter().all(is_valid),
        _ => true,
    }
}

fn valid_line(line: &LineString<f64>) -> bool {
    match line.0.first() {
        Some(first) => line.0.iter().any(|c| c != first),
        None => false,
    }
}

fn valid_ring(ring: &LineString<f64>) -> bool {
    ring.0.len() >= 4 && ring.is_closed()
}

#[cfg(test)]
mod tests {
    use geo::{line_string, point, polygon};

    use super::*;

    #[test]
    fn haversine() {
        let d = haversine_dist(8.5, 47.3, 8.7, 47.2);
        assert!((d - 18749.056277719905).abs() < 1e-6);

        assert_eq!(0.0, haversine_dist(8.5, 47.3, 8.5, 47.3));
    }

    #[test]
    fn degrees_at_equator() {
        let deg = meters_to_decimal_degrees(111_320.0, 0.0);
        assert!((deg - 1.0).abs() < 1e-12);
    }

    #[test]
    fn line_length() {
        let ls = line_string![(x: 8.5, y: 47.3), (x: 8.7, y: 47.2), (x: 8.5, y: 47.3)];
        let expected = 2.0 * haversine_dist(8.5, 47.3, 8.7, 47.2);
        assert!((haversine_length(&ls) - expected).abs() < 1e-6);
    }

    #[test]
    fn validity() {
        let ls: Geometry<f64> = line_string![(x: 0., y: 0.), (x: 1., y: 1.)].into();
        assert!(is_valid(&ls));
        assert_eq!("LineString", geom_type(&ls));

        let degenerate: Geometry<f64> = line_string![(x: 1., y: 1.), (x: 1., y: 1.)].into();
        assert!(!is_valid(&degenerate));

        let nan: Geometry<f64> = point!(x: f64::NAN, y: 0.).into();
        assert!(!is_valid(&nan));
        assert_eq!("Point", geom_type(&nan));

        let poly: Geometry<f64> =
            polygon![(x: 0., y: 0.), (x: 1., y: 0.), (x: 1., y: 1.), (x: 0., y: 0.)].into();
        assert!(is_valid(&poly));
    }
}
