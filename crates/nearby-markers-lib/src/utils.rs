//! Utility functions for coordinate validation and spherical distances

use crate::Coordinate;

/// Mean Earth radius in meters used by the spherical approximation
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Latitude bounds in degrees
pub const MAX_LATITUDE: f64 = 90.0;
/// Longitude bounds in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

/// Check that a latitude/longitude pair is finite and within WGS84 bounds
#[inline(always)]
pub fn is_valid_wgs84(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat)
        && (-MAX_LONGITUDE..=MAX_LONGITUDE).contains(&lon)
}

/// Great-circle distance between two coordinates in meters
///
/// Uses the Haversine formula on a sphere of radius [`EARTH_RADIUS_METERS`]. Accurate to
/// within tens of meters at the distances proximity checks care about.
#[inline]
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let delta_lat = (b.latitude() - a.latitude()).to_radians();
    let delta_lon = (b.longitude() - a.longitude()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h slightly outside [0, 1] for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Coordinate reached by travelling `distance` meters from `origin` along `bearing_degrees`
///
/// Inverse of [`haversine_distance`] on the same sphere; handy for placing test fixtures
/// and simulated tracks at exact distances.
pub fn destination_point(origin: Coordinate, bearing_degrees: f64, distance: f64) -> Coordinate {
    let angular = distance / EARTH_RADIUS_METERS;
    let bearing = bearing_degrees.to_radians();
    let lat1 = origin.latitude().to_radians();
    let lon1 = origin.longitude().to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    // Normalize longitude back into [-180, 180]
    let lon2 = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    Coordinate::new_unchecked(lat2.to_degrees(), lon2)
}

/// Convert a GPX waypoint to a coordinate, if it lies within WGS84 bounds
#[inline(always)]
pub fn waypoint_to_coordinate(waypoint: &gpx::Waypoint) -> Option<Coordinate> {
    let point = waypoint.point();
    Coordinate::new(point.y(), point.x()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        for (lat, lon) in [(0.0, 0.0), (55.7558, 37.6173), (-89.9, 179.9), (90.0, -180.0)] {
            let a = coord(lat, lon);
            assert!(haversine_distance(a, a).abs() < 1e-6);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = coord(51.5074, -0.1278);
        let b = coord(48.8566, 2.3522);
        let ab = haversine_distance(a, b);
        let ba = haversine_distance(b, a);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_known_distance_london_paris() {
        let london = coord(51.5074, -0.1278);
        let paris = coord(48.8566, 2.3522);
        let distance = haversine_distance(london, paris);
        // Roughly 343.5 km on a spherical Earth
        assert!((distance - 343_500.0).abs() < 1_000.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let distance = haversine_distance(coord(0.0, 0.0), coord(1.0, 0.0));
        let expected = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;
        assert!((distance - expected).abs() < 1e-6);
    }

    #[test]
    fn test_antipodal_points_do_not_produce_nan() {
        let distance = haversine_distance(coord(0.0, 0.0), coord(0.0, 180.0));
        assert!(distance.is_finite());
        assert!((distance - EARTH_RADIUS_METERS * std::f64::consts::PI).abs() < 1.0);
    }

    #[test]
    fn test_monotonic_along_great_circle() {
        let origin = coord(55.7558, 37.6173);
        let mut previous = 0.0;
        for step in 1..=200 {
            let point = destination_point(origin, 42.0, step as f64 * 50.0);
            let distance = haversine_distance(origin, point);
            assert!(distance > previous);
            previous = distance;
        }
    }

    #[test]
    fn test_destination_point_roundtrip() {
        let origin = coord(55.7558, 37.6173);
        for distance in [1.0, 30.0, 50.0, 100.0, 500.0, 10_000.0] {
            let target = destination_point(origin, 90.0, distance);
            assert!((haversine_distance(origin, target) - distance).abs() < 1e-3);
        }
    }

    #[test]
    fn test_destination_point_wraps_longitude() {
        let origin = coord(0.0, 179.9999);
        let target = destination_point(origin, 90.0, 1_000.0);
        assert!(target.validate().is_ok());
        assert!(target.longitude() < 0.0);
    }

    #[test]
    fn test_is_valid_wgs84() {
        assert!(is_valid_wgs84(0.0, 0.0));
        assert!(is_valid_wgs84(90.0, 180.0));
        assert!(is_valid_wgs84(-90.0, -180.0));
        assert!(!is_valid_wgs84(90.1, 0.0));
        assert!(!is_valid_wgs84(0.0, -180.1));
        assert!(!is_valid_wgs84(f64::NAN, 0.0));
        assert!(!is_valid_wgs84(0.0, f64::INFINITY));
    }

    #[test]
    fn test_waypoint_to_coordinate() {
        let waypoint = gpx::Waypoint::new(geo::Point::new(37.6173, 55.7558));
        let c = waypoint_to_coordinate(&waypoint).unwrap();
        assert_eq!(c.latitude(), 55.7558);
        assert_eq!(c.longitude(), 37.6173);

        let invalid = gpx::Waypoint::new(geo::Point::new(200.0, 10.0));
        assert!(waypoint_to_coordinate(&invalid).is_none());
    }
}
