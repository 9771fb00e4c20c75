//! Great-circle helpers for range checks and bearing/distance derivation

/// Mean earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Distance in meters and initial bearing in degrees true (0 = north)
    /// from `self` to `other`.
    pub fn distance_bearing(&self, other: &GeoPoint) -> (f64, f64) {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let dist = 2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt());

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);

        (dist, bearing)
    }

    /// Distance in meters
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        self.distance_bearing(other).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = GeoPoint::new(42.0, -83.0);
        assert!(p.distance_to(&p) < 1e-6);
    }

    #[test]
    fn test_one_degree_latitude() {
        let a = GeoPoint::new(42.0, -83.0);
        let b = GeoPoint::new(43.0, -83.0);
        let (dist, bearing) = a.distance_bearing(&b);

        // ~111.2 km per degree of latitude
        assert!((dist - 111_195.0).abs() < 100.0);
        assert!(bearing.abs() < 1e-6 || (bearing - 360.0).abs() < 1e-6);
    }

    #[test]
    fn test_bearing_east_and_south() {
        let origin = GeoPoint::new(0.0, 0.0);
        let (_, east) = origin.distance_bearing(&GeoPoint::new(0.0, 1.0));
        let (_, south) = origin.distance_bearing(&GeoPoint::new(-1.0, 0.0));

        assert!((east - 90.0).abs() < 1e-6);
        assert!((south - 180.0).abs() < 1e-6);
    }
}
