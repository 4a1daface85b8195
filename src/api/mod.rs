//! HTTP transport for login reports
//!
//! `POST /v1/` evaluates one login report and answers with the travel
//! verdicts; `GET /health` answers 204 while the server is up.

pub mod request;
pub mod routes;

pub use request::EventRequest;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer};
use tokio_util::sync::CancellationToken;

use crate::evaluation::AccessEvaluator;

/// Shared state of the request handlers
pub struct ApiState {
    evaluator: Arc<AccessEvaluator>,
    /// Cancelled when the process begins shutting down
    shutdown: CancellationToken,
    request_timeout: Duration,
}

impl ApiState {
    pub fn new(
        evaluator: Arc<AccessEvaluator>,
        shutdown: CancellationToken,
        request_timeout: Duration,
    ) -> Self {
        ApiState {
            evaluator,
            shutdown,
            request_timeout,
        }
    }
}

/// Serve until `shutdown` is cancelled, then stop accepting connections
/// and drain in-flight requests
pub async fn serve(
    bind_address: &str,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let state = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .disable_signals()
    .bind(bind_address)?
    .run();

    log::info!("HTTP server listening on {}", bind_address);
    let handle = server.handle();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = shutdown.cancelled() => {}
    }

    log::info!("Stopping HTTP server");
    let ((), result) = tokio::join!(handle.stop(true), server);
    log::info!("HTTP server stopped");
    result
}
