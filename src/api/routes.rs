use actix_web::http::StatusCode;
use actix_web::{error, web, HttpResponse};
use serde_json::json;

use super::request::EventRequest;
use super::ApiState;
use crate::evaluation::EvaluationError;
use crate::persistence::{CallContext, StoreError};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health))
        .route("/health", web::head().to(health))
        .service(
            web::scope("/v1")
                .route("", web::post().to(evaluate_event))
                .route("/", web::post().to(evaluate_event)),
        );
}

/// Report body-parsing failures in the same shape as validation failures
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = HttpResponse::BadRequest().json(json!({ "errors": [err.to_string()] }));
        error::InternalError::from_response(err, body).into()
    })
}

async fn health() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn evaluate_event(
    state: web::Data<ApiState>,
    body: web::Json<EventRequest>,
) -> HttpResponse {
    let request = match body.into_inner().validate() {
        Ok(request) => request,
        Err(errors) => {
            log::info!("Rejected event request: {}", errors.join("; "));
            return HttpResponse::BadRequest().json(json!({ "errors": errors }));
        }
    };

    let ctx = CallContext::child_of(&state.shutdown).with_timeout(state.request_timeout);
    match state.evaluator.evaluate(&ctx, &request).await {
        Ok(evaluation) => HttpResponse::Ok().json(evaluation),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &EvaluationError) -> HttpResponse {
    let status = match err {
        EvaluationError::Store(StoreError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        EvaluationError::Store(StoreError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(json!({ "error": err.to_string() }))
}
