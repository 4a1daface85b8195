use std::net::IpAddr;

use serde::Deserialize;
use uuid::Uuid;

use crate::models::AccessRequest;

/// JSON payload of a login report.
///
/// Every field is optional at the parsing stage so a missing field can be
/// told apart from an empty one and reported as such.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EventRequest {
    pub unix_timestamp: Option<i64>,
    pub username: Option<String>,
    pub event_uuid: Option<String>,
    pub ip_address: Option<String>,
}

impl EventRequest {
    /// Check every field, collecting all problems rather than stopping at
    /// the first one
    pub fn validate(self) -> Result<AccessRequest, Vec<String>> {
        let mut errors = Vec::new();

        let timestamp = match self.unix_timestamp {
            Some(ts) if ts < 0 => {
                errors.push("unix_timestamp: must not be negative".to_string());
                None
            }
            Some(ts) => Some(ts),
            None => {
                errors.push("unix_timestamp: is required".to_string());
                None
            }
        };

        let account = match self.username {
            Some(name) if name.trim().is_empty() => {
                errors.push("username: must not be empty".to_string());
                None
            }
            Some(name) => Some(name),
            None => {
                errors.push("username: is required".to_string());
                None
            }
        };

        let event_id = match self.event_uuid.as_deref().map(Uuid::parse_str) {
            Some(Ok(id)) => Some(id),
            Some(Err(e)) => {
                errors.push(format!("event_uuid: {}", e));
                None
            }
            None => {
                errors.push("event_uuid: is required".to_string());
                None
            }
        };

        let ip = match self.ip_address.as_deref().map(str::parse::<IpAddr>) {
            Some(Ok(ip)) => Some(ip),
            Some(Err(_)) => {
                errors.push("ip_address: not a valid IPv4 or IPv6 address".to_string());
                None
            }
            None => {
                errors.push("ip_address: is required".to_string());
                None
            }
        };

        match (timestamp, account, event_id, ip) {
            (Some(timestamp), Some(account), Some(event_id), Some(ip)) if errors.is_empty() => {
                Ok(AccessRequest {
                    account,
                    timestamp,
                    ip,
                    event_id,
                })
            }
            _ => Err(errors),
        }
    }
}
