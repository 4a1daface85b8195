//! Impossible travel detection
//!
//! Pure computations over two geolocated logins: great-circle distance,
//! implied speed and the suspicious/not-suspicious verdict. Nothing in here
//! performs I/O.

use crate::models::Geo;

const EARTH_RADIUS_KM: f64 = 6371.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Geographic coordinates for IP location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Travel figures between two logins of the same account
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyVerdict {
    pub speed_kmh: f64,
    pub distance_km: f64,
    pub suspicious: bool,
}

/// Applies the speed-over-threshold rule with the radius-overlap exception
#[derive(Debug, Clone, Copy)]
pub struct TravelAnomalyDetector {
    /// Maximum plausible travel speed in km/h
    max_speed_kmh: f64,
}

impl TravelAnomalyDetector {
    pub fn new(max_speed_kmh: f64) -> Self {
        TravelAnomalyDetector { max_speed_kmh }
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_kmh
    }

    /// Compare the login at `current` with a neighboring login.
    ///
    /// Argument order does not matter for the magnitude of the result since
    /// elapsed time is taken as an absolute difference.
    pub fn evaluate(
        &self,
        current: &Geo,
        current_ts: i64,
        neighbor: &Geo,
        neighbor_ts: i64,
    ) -> AnomalyVerdict {
        let distance_km = haversine_distance(current.point(), neighbor.point());
        let speed_kmh = travel_speed(current.point(), current_ts, neighbor.point(), neighbor_ts);
        let suspicious = is_suspicious(
            speed_kmh,
            distance_km,
            current.radius_km,
            neighbor.radius_km,
            self.max_speed_kmh,
        );

        AnomalyVerdict {
            speed_kmh,
            distance_km,
            suspicious,
        }
    }
}

/// Calculate the great-circle distance between two points using the Haversine formula
/// Returns distance in kilometers
pub fn haversine_distance(loc1: GeoLocation, loc2: GeoLocation) -> f64 {
    let lat1_rad = loc1.latitude.to_radians();
    let lat2_rad = loc2.latitude.to_radians();
    let delta_lat = (loc2.latitude - loc1.latitude).to_radians();
    let delta_lon = (loc2.longitude - loc1.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points
    let c = 2.0 * a.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Speed in km/h needed to cover the distance between two logins.
///
/// Simultaneous logins yield 0 so they are never flagged on speed alone.
pub fn travel_speed(loc1: GeoLocation, ts1: i64, loc2: GeoLocation, ts2: i64) -> f64 {
    let elapsed_hours = ts1.abs_diff(ts2) as f64 / SECONDS_PER_HOUR;
    if elapsed_hours == 0.0 {
        return 0.0;
    }
    haversine_distance(loc1, loc2) / elapsed_hours
}

/// Decide whether travel between two logins is implausible.
///
/// Overlapping accuracy circles mean the two logins may share a location,
/// in which case the speed is not trusted and the travel is not flagged.
pub fn is_suspicious(
    speed_kmh: f64,
    distance_km: f64,
    radius1_km: u16,
    radius2_km: u16,
    max_speed_kmh: f64,
) -> bool {
    if distance_km < f64::from(radius1_km) + f64::from(radius2_km) {
        return false;
    }
    speed_kmh > max_speed_kmh
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAMPA: GeoLocation = GeoLocation { latitude: 27.95, longitude: -82.46 };
    const NYC: GeoLocation = GeoLocation { latitude: 40.71, longitude: -74.00 };

    #[test]
    fn test_haversine_distance() {
        // New York to Los Angeles: ~3936 km
        let nyc = GeoLocation { latitude: 40.7128, longitude: -74.0060 };
        let la = GeoLocation { latitude: 34.0522, longitude: -118.2437 };
        let distance = haversine_distance(nyc, la);
        assert!((distance - 3936.0).abs() < 10.0, "NYC to LA should be ~3936 km, got {}", distance);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            (TAMPA, NYC),
            (
                GeoLocation { latitude: 51.5074, longitude: -0.1278 },
                GeoLocation { latitude: -33.8688, longitude: 151.2093 },
            ),
            (
                GeoLocation { latitude: 0.0, longitude: 179.9 },
                GeoLocation { latitude: 0.0, longitude: -179.9 },
            ),
        ];
        for (a, b) in pairs {
            assert_eq!(haversine_distance(a, b), haversine_distance(b, a));
        }
    }

    #[test]
    fn test_same_point_has_zero_distance() {
        assert_eq!(haversine_distance(NYC, NYC), 0.0);
    }

    #[test]
    fn test_antipodal_distance_is_finite() {
        let north = GeoLocation { latitude: 90.0, longitude: 0.0 };
        let south = GeoLocation { latitude: -90.0, longitude: 0.0 };
        let distance = haversine_distance(north, south);
        assert!(distance.is_finite());
        assert!((distance - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1.0);
    }

    #[test]
    fn test_zero_duration_speed() {
        assert_eq!(travel_speed(TAMPA, 1000, NYC, 1000), 0.0);
    }

    #[test]
    fn test_speed_ignores_argument_order() {
        let forward = travel_speed(TAMPA, 1000, NYC, 1600);
        let backward = travel_speed(NYC, 1600, TAMPA, 1000);
        assert_eq!(forward, backward);
        assert!(forward > 9000.0, "expected ~9700 km/h, got {}", forward);
    }

    #[test]
    fn test_radius_overlap_suppresses_suspicion() {
        assert!(!is_suspicious(f64::MAX, 40.0, 25, 20, 500.0));
    }

    #[test]
    fn test_touching_radii_do_not_overlap() {
        assert!(is_suspicious(1000.0, 45.0, 25, 20, 500.0));
    }

    #[test]
    fn test_threshold_boundary() {
        assert!(!is_suspicious(500.0, 1000.0, 10, 10, 500.0));
        assert!(is_suspicious(501.0, 1000.0, 10, 10, 500.0));
    }

    #[test]
    fn test_detector_flags_impossible_travel() {
        let detector = TravelAnomalyDetector::new(900.0);
        let previous = Geo::new(27.95, -82.46, 50);
        let current = Geo::new(40.71, -74.00, 50);

        let verdict = detector.evaluate(&current, 1600, &previous, 1000);
        assert!((verdict.distance_km - 1615.6).abs() < 1.0);
        assert!((verdict.speed_kmh - 9693.8).abs() < 5.0);
        assert!(verdict.suspicious);
    }

    #[test]
    fn test_detector_allows_plausible_flight() {
        let detector = TravelAnomalyDetector::new(900.0);
        let previous = Geo::new(27.95, -82.46, 50);
        let current = Geo::new(40.71, -74.00, 50);

        // Tampa to New York in three hours
        let verdict = detector.evaluate(&current, 1000 + 3 * 3600, &previous, 1000);
        assert!(!verdict.suspicious);
        assert!(verdict.speed_kmh < 900.0);
    }

    #[test]
    fn test_detector_simultaneous_logins_not_flagged() {
        let detector = TravelAnomalyDetector::new(900.0);
        let london = Geo::new(51.5074, -0.1278, 5);
        let sydney = Geo::new(-33.8688, 151.2093, 5);

        let verdict = detector.evaluate(&london, 1700000000, &sydney, 1700000000);
        assert_eq!(verdict.speed_kmh, 0.0);
        assert!(verdict.distance_km > 10000.0);
        assert!(!verdict.suspicious);
    }
}
