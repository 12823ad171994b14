/// Mean Earth radius used for every distance check.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two points in decimal degrees,
/// using the haversine formula on a spherical Earth.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        assert!(haversine_km(52.52, 13.405, 52.52, 13.405).abs() < 1e-9);
    }

    #[test]
    fn test_known_distance() {
        // Berlin to Paris is roughly 878 km.
        let d = haversine_km(52.52, 13.405, 48.8566, 2.3522);
        assert!((d - 878.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 0.1, "got {d}");
    }

    #[test]
    fn test_symmetric() {
        let a = haversine_km(40.7128, -74.006, 34.0522, -118.2437);
        let b = haversine_km(34.0522, -118.2437, 40.7128, -74.006);
        assert!((a - b).abs() < 1e-9);
    }
}
