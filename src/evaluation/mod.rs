//! Access evaluation pipeline
//!
//! Resolves a reported login, records it, then compares it against the
//! account's closest earlier and later logins. Requests share no state, so
//! two concurrent evaluations of one account may or may not observe each
//! other's writes.

use std::sync::Arc;

use thiserror::Error;

use crate::detection::TravelAnomalyDetector;
use crate::geolocation::{GeoError, GeoResolver};
use crate::models::{AccessEvaluation, AccessRequest, IpAccess, LoginEvent};
use crate::persistence::{CallContext, EventStore, StoreError};

/// Errors that abort an evaluation
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Geolocation failed: {0}")]
    Geo(#[from] GeoError),

    #[error("Storage failed: {0}")]
    Store(#[from] StoreError),
}

impl EvaluationError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EvaluationError::Store(e) if e.is_cancellation())
    }
}

/// Orchestrates persist, neighbor lookup and travel verdicts for one login
pub struct AccessEvaluator {
    store: Arc<dyn EventStore>,
    resolver: Arc<dyn GeoResolver>,
    detector: TravelAnomalyDetector,
}

impl AccessEvaluator {
    pub fn new(
        store: Arc<dyn EventStore>,
        resolver: Arc<dyn GeoResolver>,
        detector: TravelAnomalyDetector,
    ) -> Self {
        AccessEvaluator {
            store,
            resolver,
            detector,
        }
    }

    /// Resolve the request's address and evaluate the resulting event
    pub async fn evaluate(
        &self,
        ctx: &CallContext,
        request: &AccessRequest,
    ) -> Result<AccessEvaluation, EvaluationError> {
        let location = self.resolver.location(request.ip)?;
        let anonymity = self.resolver.anonymity(request.ip)?;

        log::debug!(
            "Evaluating event {} for '{}' from {} at {}",
            request.event_id,
            request.account,
            request.ip,
            request.timestamp
        );

        let event = LoginEvent::new(
            &request.account,
            &request.ip.to_string(),
            request.timestamp,
            location.geo(),
            anonymity.is_anonymous(),
        );
        self.evaluate_event(ctx, &event).await
    }

    /// Record `event` and judge travel to it from its preceding login and
    /// from it to its subsequent login.
    ///
    /// A direction without a neighbor is omitted from the result. Any storage
    /// failure aborts the whole evaluation.
    pub async fn evaluate_event(
        &self,
        ctx: &CallContext,
        event: &LoginEvent,
    ) -> Result<AccessEvaluation, EvaluationError> {
        self.store.put(ctx, event).await.map_err(|e| {
            log::error!("Failed to store event for '{}': {}", event.account, e);
            e
        })?;

        let mut evaluation = AccessEvaluation::new(event.geo);

        let preceding = self
            .store
            .preceding_access(ctx, &event.account, event.timestamp)
            .await
            .map_err(|e| {
                log::error!("Failed to retrieve preceding access for '{}': {}", event.account, e);
                e
            })?;

        if let Some(preceding) = preceding {
            let (suspicious, access) = self.compare(event, &preceding);
            evaluation.travel_to_current_geo_suspicious = Some(suspicious);
            evaluation.preceding_ip_access = Some(access);
        }

        let subsequent = self
            .store
            .subsequent_access(ctx, &event.account, event.timestamp)
            .await
            .map_err(|e| {
                log::error!("Failed to retrieve subsequent access for '{}': {}", event.account, e);
                e
            })?;

        if let Some(subsequent) = subsequent {
            let (suspicious, access) = self.compare(event, &subsequent);
            evaluation.travel_from_current_geo_suspicious = Some(suspicious);
            evaluation.subsequent_ip_access = Some(access);
        }

        if evaluation.is_suspicious() {
            log::warn!(
                "Impossible travel for '{}' at {} from {} (max {:.0} km/h)",
                event.account,
                event.timestamp,
                event.ip,
                self.detector.max_speed_kmh()
            );
        }

        Ok(evaluation)
    }

    fn compare(&self, current: &LoginEvent, neighbor: &LoginEvent) -> (bool, IpAccess) {
        let verdict = self.detector.evaluate(
            &current.geo,
            current.timestamp,
            &neighbor.geo,
            neighbor.timestamp,
        );
        log::debug!(
            "'{}' {} -> {}: {:.1} km at {:.1} km/h (suspicious: {})",
            current.account,
            neighbor.ip,
            current.ip,
            verdict.distance_km,
            verdict.speed_kmh,
            verdict.suspicious
        );
        (verdict.suspicious, IpAccess::from_event(neighbor, verdict.speed_kmh))
    }
}
