use actix_web::{
    HttpResponse, Responder, ResponseError, get,
    http::{StatusCode, header::ContentType},
    post,
    web::{Data, Json, Path},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use evreg::concurrency::shutdown::ShutdownRx;
use evreg::error::EvregError;
use evreg::leadership::LeaderOutcome;
use evreg::types::{ConsistencyStatus, ProgressState, ReinitializationStatus};

use crate::routes::ErrorMessage;
use crate::startup::AppSlotService;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("No recent {0} run has been recorded")]
    StatusNotFound(&'static str),

    #[error("The cache key {0} was not found")]
    KeyNotFound(String),

    #[error(transparent)]
    Internal(#[from] EvregError),
}

impl CacheError {
    pub fn to_message(&self) -> String {
        match self {
            // Do not expose internal store details in error messages
            CacheError::Internal(_) => "internal server error".to_string(),
            e => e.to_string(),
        }
    }
}

impl ResponseError for CacheError {
    fn status_code(&self) -> StatusCode {
        match self {
            CacheError::StatusNotFound(_) | CacheError::KeyNotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_message = ErrorMessage {
            error: self.to_message(),
        };
        let body =
            serde_json::to_string(&error_message).expect("failed to serialize error message");
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(body)
    }
}

fn state_str(state: ProgressState) -> String {
    match state {
        ProgressState::Starting => "starting",
        ProgressState::Running => "running",
        ProgressState::Completed => "completed",
        ProgressState::Failed => "failed",
    }
    .to_string()
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReinitializeCacheResponse {
    #[schema(example = "cache reinitialization started")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReinitializationStatusResponse {
    #[schema(example = "running")]
    pub state: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[schema(example = 1200)]
    pub total_events: usize,
    #[schema(example = 400)]
    pub completed_events: usize,
    #[schema(example = 33)]
    pub percent_complete: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ReinitializationStatus> for ReinitializationStatusResponse {
    fn from(status: ReinitializationStatus) -> Self {
        Self {
            state: state_str(status.state),
            started_at: status.started_at.to_rfc3339(),
            completed_at: status.completed_at.map(|at| at.to_rfc3339()),
            total_events: status.total_events,
            completed_events: status.completed_events,
            percent_complete: status.percent_complete,
            error: status.error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsistencyStatusResponse {
    #[schema(example = "completed")]
    pub state: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[schema(example = 1200)]
    pub total_events: usize,
    #[schema(example = 1200)]
    pub processed_events: usize,
    #[schema(example = 1195)]
    pub consistent: usize,
    #[schema(example = 5)]
    pub fixed: usize,
    #[schema(example = 0)]
    pub errors: usize,
    #[schema(example = 0)]
    pub unavailable: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ConsistencyStatus> for ConsistencyStatusResponse {
    fn from(status: ConsistencyStatus) -> Self {
        Self {
            state: state_str(status.state),
            started_at: status.started_at.to_rfc3339(),
            completed_at: status.completed_at.map(|at| at.to_rfc3339()),
            total_events: status.total_events,
            processed_events: status.processed_events,
            consistent: status.tally.consistent,
            fixed: status.tally.fixed,
            errors: status.tally.errors,
            unavailable: status.tally.unavailable,
            error: status.error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadCacheKeyResponse {
    #[schema(example = "event:42:slots")]
    pub key: String,
    #[schema(example = r#"{"available":7,"total":100}"#)]
    pub value: String,
}

#[utoipa::path(
    summary = "Trigger cache reinitialization",
    description = "Rebuilds every slot entry from the database in the \
                   background. Progress can be polled from the \
                   reinitialization status endpoint. Only one instance \
                   rebuilds at a time; a request while a rebuild is already \
                   running is accepted and does nothing.",
    responses(
        (status = 202, description = "Reinitialization started", body = ReinitializeCacheResponse),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Cache"
)]
#[post("/cache/reinitialize")]
pub async fn reinitialize_cache(
    service: Data<AppSlotService>,
    shutdown: Data<ShutdownRx>,
) -> Result<impl Responder, CacheError> {
    let service = service.get_ref().clone();
    let shutdown = shutdown.get_ref().clone();

    tokio::spawn(async move {
        match service.reinitialize(&shutdown).await {
            Ok(LeaderOutcome::Led(written)) => {
                info!(written, "manual cache reinitialization finished");
            }
            Ok(LeaderOutcome::NotLeader) => {
                info!("manual cache reinitialization skipped, another instance is populating");
            }
            Err(err) => {
                warn!(error = %err, "manual cache reinitialization failed");
            }
        }
    });

    Ok(HttpResponse::Accepted().json(ReinitializeCacheResponse {
        message: "cache reinitialization started".to_string(),
    }))
}

#[utoipa::path(
    summary = "Read reinitialization status",
    description = "Returns the status record of the most recent tracked \
                   reinitialization. Records expire, so a 404 means no recent run.",
    responses(
        (status = 200, description = "Status retrieved successfully", body = ReinitializationStatusResponse),
        (status = 404, description = "No recent run recorded", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Cache"
)]
#[get("/cache/reinitialization/status")]
pub async fn read_reinitialization_status(
    service: Data<AppSlotService>,
) -> Result<impl Responder, CacheError> {
    let status = service
        .reinitialization_status()
        .await?
        .ok_or(CacheError::StatusNotFound("reinitialization"))?;

    Ok(Json(ReinitializationStatusResponse::from(status)))
}

#[utoipa::path(
    summary = "Read consistency status",
    description = "Returns the status record of the most recent consistency \
                   reconciliation cycle. Records expire, so a 404 means no recent cycle.",
    responses(
        (status = 200, description = "Status retrieved successfully", body = ConsistencyStatusResponse),
        (status = 404, description = "No recent cycle recorded", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Cache"
)]
#[get("/cache/consistency/status")]
pub async fn read_consistency_status(
    service: Data<AppSlotService>,
) -> Result<impl Responder, CacheError> {
    let status = service
        .consistency_status()
        .await?
        .ok_or(CacheError::StatusNotFound("consistency"))?;

    Ok(Json(ConsistencyStatusResponse::from(status)))
}

#[utoipa::path(
    summary = "Read a raw cache key",
    description = "Debug surface returning the raw string stored under a cache key.",
    params(
        ("key" = String, Path, description = "Cache key to read")
    ),
    responses(
        (status = 200, description = "Key retrieved successfully", body = ReadCacheKeyResponse),
        (status = 404, description = "Key not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Cache"
)]
#[get("/cache/keys/{key}")]
pub async fn read_cache_key(
    service: Data<AppSlotService>,
    key: Path<String>,
) -> Result<impl Responder, CacheError> {
    let key = key.into_inner();

    let value = service
        .cache_entry(&key)
        .await?
        .ok_or_else(|| CacheError::KeyNotFound(key.clone()))?;

    Ok(Json(ReadCacheKeyResponse { key, value }))
}
