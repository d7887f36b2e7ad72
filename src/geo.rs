//! Great-circle distance between facility coordinates.

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Computes the Haversine distance in kilometers between two points given
/// in decimal degrees. Returns 0.0 for identical points; symmetric in its
/// argument pairs.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_points_are_zero() {
        assert_eq!(distance_km(43.608, 3.877, 43.608, 3.877), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let ab = distance_km(43.608, 3.877, 43.611, 3.882);
        let ba = distance_km(43.611, 3.882, 43.608, 3.877);
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn test_known_distance() {
        // Montpellier Comédie to the Odysseum district, roughly 3.5 km.
        let d = distance_km(43.6086, 3.8795, 43.6043, 3.9207);
        assert!(d > 3.0 && d < 4.0, "got {d}");
    }

    #[test]
    fn test_short_distances_stay_positive() {
        let d = distance_km(43.6086, 3.8795, 43.6087, 3.8796);
        assert!(d > 0.0 && d < 0.05);
    }
}
