//! Process lifecycle: open modules in dependency order, serve, close on shutdown

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiState};
use crate::config::Config;
use crate::detection::TravelAnomalyDetector;
use crate::evaluation::AccessEvaluator;
use crate::geolocation::{GeoError, GeoIpService, GeoResolver};
use crate::persistence::{open_store, EventStore, StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Geolocation setup failed: {0}")]
    Geo(#[from] GeoError),

    #[error("Event store failed: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP server failed: {0}")]
    Server(#[from] std::io::Error),
}

/// The wired service, ready to run
pub struct Application {
    config: Config,
    store: Arc<dyn EventStore>,
    evaluator: Arc<AccessEvaluator>,
    shutdown: CancellationToken,
}

impl Application {
    /// Open the geolocation databases and the event store named in `config`
    pub fn build(config: Config) -> Result<Self, AppError> {
        let resolver = Arc::new(GeoIpService::open(&config.geoip)?);
        let store = open_store(&config.storage)?;
        Ok(Self::with_components(config, store, resolver))
    }

    pub fn with_components(
        config: Config,
        store: Arc<dyn EventStore>,
        resolver: Arc<dyn GeoResolver>,
    ) -> Self {
        let detector = TravelAnomalyDetector::new(config.detection.max_speed_kmh);
        let evaluator = Arc::new(AccessEvaluator::new(store.clone(), resolver, detector));
        Application {
            config,
            store,
            evaluator,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token whose cancellation stops the service
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until the shutdown token is cancelled, then close the store.
    ///
    /// In-flight requests are cancelled along with the token and answer 503.
    pub async fn run(self) -> Result<(), AppError> {
        let state = ApiState::new(
            self.evaluator.clone(),
            self.shutdown.clone(),
            self.config.server.request_timeout(),
        );

        let served = api::serve(&self.config.server.bind_address, state, self.shutdown.clone()).await;
        if let Err(ref e) = served {
            log::error!("HTTP server exited with error: {}", e);
        }

        log::info!("Closing {} event store", self.store.backend_name());
        self.store.close().await?;
        served?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use crate::geolocation::fixtures::FixedResolver;
    use crate::persistence::{CallContext, RangeEventStore};
    use crate::models::{Geo, LoginEvent};
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.server.bind_address = "127.0.0.1:0".to_string();
        config.storage.backend = StorageBackend::Memory;
        config
    }

    #[test]
    fn test_build_fails_without_city_database() {
        let mut config = test_config();
        config.geoip.city_database = "missing-city.mmdb".into();
        assert!(matches!(Application::build(config), Err(AppError::Geo(_))));
    }

    #[tokio::test]
    async fn test_shutdown_closes_store() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("events.json");
        let store = Arc::new(RangeEventStore::open(Some(snapshot.clone())).unwrap());
        let event = LoginEvent::new("alice", "203.0.113.10", 1000, Geo::new(27.95, -82.46, 50), false);
        store.put(&CallContext::background(), &event).await.unwrap();

        let app = Application::with_components(test_config(), store, Arc::new(FixedResolver::new()));
        let shutdown = app.shutdown_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            shutdown.cancel();
        });

        app.run().await.unwrap();
        assert!(snapshot.exists());
    }

    #[tokio::test]
    async fn test_bind_failure_still_closes_store() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("events.json");
        let store = Arc::new(RangeEventStore::open(Some(snapshot.clone())).unwrap());

        let mut config = test_config();
        config.server.bind_address = "not an address".to_string();
        let app = Application::with_components(config, store, Arc::new(FixedResolver::new()));

        assert!(matches!(app.run().await, Err(AppError::Server(_))));
        assert!(snapshot.exists());
    }
}
