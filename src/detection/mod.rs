pub mod travel;

pub use travel::{
    haversine_distance, is_suspicious, travel_speed, AnomalyVerdict, GeoLocation,
    TravelAnomalyDetector,
};
