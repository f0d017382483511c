use actix_web::{
    HttpResponse, Responder, ResponseError, get,
    http::{StatusCode, header::ContentType},
    post,
    web::{Data, Json, Path},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use evreg::error::{ErrorKind, EvregError};
use evreg::types::EventId;

use crate::routes::ErrorMessage;
use crate::startup::AppSlotService;

#[derive(Debug, Error)]
pub enum EventsError {
    #[error("The event with id {0} was not found")]
    EventNotFound(i64),

    #[error("The event with id {0} has no available slots")]
    NoAvailableSlots(i64),

    #[error("The attendee is already registered for the event with id {0}")]
    AlreadyRegistered(i64),

    #[error(transparent)]
    Internal(EvregError),
}

impl EventsError {
    fn from_evreg(err: EvregError, event_id: i64) -> Self {
        match err.kind() {
            ErrorKind::EventNotFound => EventsError::EventNotFound(event_id),
            ErrorKind::NoAvailableSlots => EventsError::NoAvailableSlots(event_id),
            ErrorKind::AlreadyRegistered => EventsError::AlreadyRegistered(event_id),
            _ => EventsError::Internal(err),
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            // Do not expose internal store details in error messages
            EventsError::Internal(_) => "internal server error".to_string(),
            e => e.to_string(),
        }
    }
}

impl ResponseError for EventsError {
    fn status_code(&self) -> StatusCode {
        match self {
            EventsError::EventNotFound(_) => StatusCode::NOT_FOUND,
            EventsError::NoAvailableSlots(_) | EventsError::AlreadyRegistered(_) => {
                StatusCode::CONFLICT
            }
            EventsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
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

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadSlotsResponse {
    #[schema(example = 42)]
    pub event_id: i64,
    #[schema(example = 7)]
    pub available: i32,
    #[schema(example = 100)]
    pub total: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRegistrationRequest {
    #[schema(required = true)]
    pub attendee_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRegistrationResponse {
    #[schema(example = 42)]
    pub event_id: i64,
    pub attendee_id: Uuid,
    #[schema(example = 6)]
    pub available: i32,
    #[schema(example = 100)]
    pub total: i32,
}

#[utoipa::path(
    summary = "Read slot availability",
    description = "Returns the remaining and total slots of an event, served \
                   from the cache when possible and from the database otherwise.",
    params(
        ("event_id" = i64, Path, description = "Unique ID of the event")
    ),
    responses(
        (status = 200, description = "Slot availability retrieved successfully", body = ReadSlotsResponse),
        (status = 404, description = "Event not found", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Events"
)]
#[get("/events/{event_id}/slots")]
pub async fn read_slots(
    service: Data<AppSlotService>,
    event_id: Path<i64>,
) -> Result<impl Responder, EventsError> {
    let event_id = event_id.into_inner();

    let entry = service
        .available_slots(EventId(event_id))
        .await
        .map_err(|err| EventsError::from_evreg(err, event_id))?;

    Ok(Json(ReadSlotsResponse {
        event_id,
        available: entry.available,
        total: entry.total,
    }))
}

#[utoipa::path(
    summary = "Register an attendee",
    description = "Registers an attendee for an event. The registration is \
                   committed to the database before the cached availability \
                   is adjusted, so a cache outage cannot lose it.",
    request_body = CreateRegistrationRequest,
    params(
        ("event_id" = i64, Path, description = "Unique ID of the event")
    ),
    responses(
        (status = 200, description = "Registration created successfully", body = CreateRegistrationResponse),
        (status = 404, description = "Event not found", body = ErrorMessage),
        (status = 409, description = "No available slots or attendee already registered", body = ErrorMessage),
        (status = 500, description = "Internal server error", body = ErrorMessage)
    ),
    tag = "Events"
)]
#[post("/events/{event_id}/registrations")]
pub async fn create_registration(
    service: Data<AppSlotService>,
    event_id: Path<i64>,
    request: Json<CreateRegistrationRequest>,
) -> Result<impl Responder, EventsError> {
    let event_id = event_id.into_inner();
    let request = request.into_inner();

    let counts = service
        .register(EventId(event_id), request.attendee_id)
        .await
        .map_err(|err| EventsError::from_evreg(err, event_id))?;

    Ok(Json(CreateRegistrationResponse {
        event_id,
        attendee_id: request.attendee_id,
        available: counts.available(),
        total: counts.max_slots,
    }))
}
