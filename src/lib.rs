pub mod api;
pub mod app;
pub mod config;
pub mod detection;
pub mod evaluation;
pub mod geolocation;
pub mod models;
pub mod persistence;

// Re-export commonly used types
pub use models::{AccessEvaluation, AccessRequest, Geo, IpAccess, LoginEvent};
pub use detection::{GeoLocation, TravelAnomalyDetector};
pub use evaluation::{AccessEvaluator, EvaluationError};
pub use geolocation::{GeoIpService, GeoResolver};
pub use persistence::{CallContext, EventStore, RangeEventStore, SqliteEventStore, StoreError};
pub use app::{AppError, Application};
