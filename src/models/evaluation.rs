use serde::{Deserialize, Serialize};

use super::event::{Geo, LoginEvent};

/// A neighboring login and the speed implied by travelling between it and
/// the evaluated one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpAccess {
    #[serde(flatten)]
    pub geo: Geo,
    /// Implied travel speed in km/h
    pub speed: f64,
    pub ip: String,
    pub timestamp: i64,
}

impl IpAccess {
    pub fn from_event(event: &LoginEvent, speed: f64) -> Self {
        IpAccess {
            geo: event.geo,
            speed,
            ip: event.ip.clone(),
            timestamp: event.timestamp,
        }
    }
}

/// Outcome of evaluating one login against its temporal neighbors.
///
/// A direction without a neighbor is left out entirely rather than reported
/// as not suspicious.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvaluation {
    pub current_geo: Geo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_to_current_geo_suspicious: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_from_current_geo_suspicious: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preceding_ip_access: Option<IpAccess>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsequent_ip_access: Option<IpAccess>,
}

impl AccessEvaluation {
    pub fn new(current_geo: Geo) -> Self {
        AccessEvaluation {
            current_geo,
            travel_to_current_geo_suspicious: None,
            travel_from_current_geo_suspicious: None,
            preceding_ip_access: None,
            subsequent_ip_access: None,
        }
    }

    /// True when either direction was flagged
    pub fn is_suspicious(&self) -> bool {
        self.travel_to_current_geo_suspicious == Some(true)
            || self.travel_from_current_geo_suspicious == Some(true)
    }
}
