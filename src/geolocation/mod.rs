//! IP Geolocation module using MaxMind databases
//!
//! Resolves addresses to coordinates with the GeoLite2-City database and,
//! when a GeoIP2-Anonymous-IP database is licensed, classifies anonymized
//! addresses. Both databases must be downloaded separately from MaxMind.

use maxminddb::{geoip2, MaxMindDBError, Reader};
use serde::Serialize;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::GeoIpConfig;
use crate::models::Geo;

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open database: {0}")]
    DatabaseOpen(#[from] MaxMindDBError),

    #[error("IP address not found in database")]
    NotFound,

    #[error("Location data missing for IP address")]
    NoLocation,

    #[error("Database file not found: {0}")]
    FileNotFound(String),

    #[error("Empty path for geolocation database")]
    EmptyPath,
}

/// Resolved location of an address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in kilometers
    pub accuracy_radius_km: u16,
    pub metro_code: Option<u16>,
    /// Timezone identifier (e.g., "America/New_York")
    pub time_zone: Option<String>,
}

impl Location {
    pub fn geo(&self) -> Geo {
        Geo::new(self.latitude, self.longitude, self.accuracy_radius_km)
    }
}

/// Provider classifications of an anonymized address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnonymityFlags {
    pub anonymous: bool,
    pub anonymous_vpn: bool,
    pub hosting_provider: bool,
    pub public_proxy: bool,
    pub tor_exit_node: bool,
}

impl AnonymityFlags {
    /// True if the provider lists the address under any classification
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
            || self.anonymous_vpn
            || self.hosting_provider
            || self.public_proxy
            || self.tor_exit_node
    }
}

/// Address resolution consumed by the evaluation pipeline
pub trait GeoResolver: Send + Sync {
    fn location(&self, ip: IpAddr) -> Result<Location, GeoError>;

    fn anonymity(&self, ip: IpAddr) -> Result<AnonymityFlags, GeoError>;
}

/// GeoIP lookup service backed by MaxMind databases
///
/// # Example
///
/// ```ignore
/// use geovelocity::geolocation::{GeoIpService, GeoResolver};
///
/// let service = GeoIpService::new("GeoLite2-City.mmdb")?;
/// let location = service.location("8.8.8.8".parse()?)?;
/// println!("Location: {}, {}", location.latitude, location.longitude);
/// ```
#[derive(Clone)]
pub struct GeoIpService {
    city: Arc<Reader<Vec<u8>>>,
    anonymous: Option<Arc<Reader<Vec<u8>>>>,
}

impl GeoIpService {
    /// Create a new GeoIP service from a GeoLite2-City database file
    ///
    /// # Errors
    ///
    /// Returns an error if the database file cannot be opened or is invalid.
    pub fn new<P: AsRef<Path>>(city_db: P) -> Result<Self, GeoError> {
        Ok(GeoIpService {
            city: Arc::new(open_reader(city_db.as_ref())?),
            anonymous: None,
        })
    }

    /// Open the databases named in the configuration
    pub fn open(config: &GeoIpConfig) -> Result<Self, GeoError> {
        let mut service = Self::new(&config.city_database)?;
        if let Some(ref path) = config.anonymous_database {
            service.anonymous = Some(Arc::new(open_reader(path)?));
        }
        log::info!(
            "Opened geoip database {} (anonymous-ip lookups {})",
            config.city_database.display(),
            if service.anonymous.is_some() { "enabled" } else { "disabled" }
        );
        Ok(service)
    }
}

fn open_reader(path: &Path) -> Result<Reader<Vec<u8>>, GeoError> {
    if path.as_os_str().is_empty() {
        return Err(GeoError::EmptyPath);
    }
    if !path.exists() {
        return Err(GeoError::FileNotFound(path.display().to_string()));
    }
    Ok(Reader::open_readfile(path)?)
}

impl GeoResolver for GeoIpService {
    fn location(&self, ip: IpAddr) -> Result<Location, GeoError> {
        let city: geoip2::City = self.city.lookup(ip).map_err(|e| match e {
            MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
            other => GeoError::DatabaseOpen(other),
        })?;

        let location = city.location.ok_or(GeoError::NoLocation)?;
        let latitude = location.latitude.ok_or(GeoError::NoLocation)?;
        let longitude = location.longitude.ok_or(GeoError::NoLocation)?;

        Ok(Location {
            latitude,
            longitude,
            accuracy_radius_km: location.accuracy_radius.unwrap_or(0),
            metro_code: location.metro_code,
            time_zone: location.time_zone.map(String::from),
        })
    }

    /// Without an Anonymous-IP database every address is treated as
    /// non-anonymous, as are addresses the database does not list
    fn anonymity(&self, ip: IpAddr) -> Result<AnonymityFlags, GeoError> {
        let reader = match self.anonymous {
            Some(ref reader) => reader,
            None => return Ok(AnonymityFlags::default()),
        };

        let record: geoip2::AnonymousIp = match reader.lookup(ip) {
            Ok(record) => record,
            Err(MaxMindDBError::AddressNotFoundError(_)) => return Ok(AnonymityFlags::default()),
            Err(other) => return Err(GeoError::DatabaseOpen(other)),
        };

        Ok(AnonymityFlags {
            anonymous: record.is_anonymous.unwrap_or(false),
            anonymous_vpn: record.is_anonymous_vpn.unwrap_or(false),
            hosting_provider: record.is_hosting_provider.unwrap_or(false),
            public_proxy: record.is_public_proxy.unwrap_or(false),
            tor_exit_node: record.is_tor_exit_node.unwrap_or(false),
        })
    }
}

/// Resolver over a fixed address table
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use std::collections::HashMap;

    pub const TAMPA_IP: &str = "203.0.113.10";
    pub const NYC_IP: &str = "198.51.100.20";
    pub const TAMPA_SUBURB_IP: &str = "203.0.113.11";
    pub const VPN_IP: &str = "192.0.2.99";

    pub struct FixedResolver {
        locations: HashMap<IpAddr, Location>,
        anonymous: Vec<IpAddr>,
    }

    impl FixedResolver {
        pub fn new() -> Self {
            let mut locations = HashMap::new();
            let mut add = |ip: &str, latitude: f64, longitude: f64, radius: u16| {
                locations.insert(
                    ip.parse().unwrap(),
                    Location {
                        latitude,
                        longitude,
                        accuracy_radius_km: radius,
                        metro_code: None,
                        time_zone: None,
                    },
                );
            };
            add(TAMPA_IP, 27.95, -82.46, 50);
            add(NYC_IP, 40.71, -74.00, 50);
            add(TAMPA_SUBURB_IP, 28.05, -82.40, 20);
            add(VPN_IP, 52.37, 4.89, 100);

            FixedResolver {
                locations,
                anonymous: vec![VPN_IP.parse().unwrap()],
            }
        }
    }

    impl GeoResolver for FixedResolver {
        fn location(&self, ip: IpAddr) -> Result<Location, GeoError> {
            self.locations.get(&ip).cloned().ok_or(GeoError::NotFound)
        }

        fn anonymity(&self, ip: IpAddr) -> Result<AnonymityFlags, GeoError> {
            Ok(AnonymityFlags {
                anonymous_vpn: self.anonymous.contains(&ip),
                ..Default::default()
            })
        }
    }
}
