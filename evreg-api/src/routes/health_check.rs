use actix_web::{HttpResponse, Responder, get, web::Data};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::startup::AppSlotService;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthCheckResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "up")]
    pub database: String,
    #[schema(example = "up")]
    pub cache: String,
}

#[utoipa::path(
    summary = "Health check",
    description = "Reports liveness of the service and its backing stores. \
                   A cache outage degrades the response but does not fail it, \
                   because reads fall back to the database.",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthCheckResponse),
        (status = 503, description = "Events database is unreachable", body = HealthCheckResponse)
    ),
    tag = "Health"
)]
#[get("/health_check")]
pub async fn health_check(service: Data<AppSlotService>) -> impl Responder {
    let database_up = service.ping_events().await.is_ok();
    let cache_up = service.ping_cache().await.is_ok();

    let up_or_down = |up: bool| if up { "up" } else { "down" }.to_string();
    let response = HealthCheckResponse {
        status: if database_up {
            if cache_up { "ok" } else { "degraded" }
        } else {
            "unavailable"
        }
        .to_string(),
        database: up_or_down(database_up),
        cache: up_or_down(cache_up),
    };

    if database_up {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}
