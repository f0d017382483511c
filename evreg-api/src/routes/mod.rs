use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod cache;
pub mod events;
pub mod health_check;

/// Generic error response shape shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorMessage {
    #[schema(example = "The event with id 42 was not found")]
    pub error: String,
}
