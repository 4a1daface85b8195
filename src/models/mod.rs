pub mod evaluation;
pub mod event;

pub use evaluation::{AccessEvaluation, IpAccess};
pub use event::{AccessRequest, Geo, LoginEvent};
