//! Shared configuration types for evreg services.

mod cache;
mod connection;
mod slots;

pub use cache::CacheConfig;
pub use connection::PgConnectionConfig;
pub use slots::{CacheReadPolicy, SlotsConfig};

use thiserror::Error;

/// Validation error for configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
