use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detection::GeoLocation;

/// Resolved position of an address together with the provider's uncertainty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    /// Accuracy radius in kilometers
    #[serde(rename = "radius")]
    pub radius_km: u16,
}

impl Geo {
    pub fn new(latitude: f64, longitude: f64, radius_km: u16) -> Self {
        Geo {
            latitude,
            longitude,
            radius_km,
        }
    }

    pub fn point(&self) -> GeoLocation {
        GeoLocation {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// A login event as recorded by the event store.
///
/// At most one event is kept per `(account, ip)` pair; `id` is assigned by
/// the store on first insert and is `None` for events that were never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub account: String,
    pub ip: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub geo: Geo,
    pub anonymous: bool,
}

impl LoginEvent {
    pub fn new(account: &str, ip: &str, timestamp: i64, geo: Geo, anonymous: bool) -> Self {
        LoginEvent {
            id: None,
            account: account.to_string(),
            ip: ip.to_string(),
            timestamp,
            geo,
            anonymous,
        }
    }
}

/// A login report that already passed transport-level validation
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest {
    pub account: String,
    pub timestamp: i64,
    pub ip: IpAddr,
    pub event_id: Uuid,
}
