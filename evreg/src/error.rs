//! Error types and result definitions for slot cache operations.
//!
//! Provides a classified error type with captured callsite metadata. The
//! [`EvregError`] type carries an [`ErrorKind`] used by callers to decide
//! between retrying, falling back to the database, or surfacing the failure.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for slot cache operations using [`EvregError`].
pub type EvregResult<T> = Result<T, EvregError>;

/// Specific categories of errors that can occur in the slot cache subsystem.
///
/// The taxonomy mirrors how failures are handled: cache-side kinds are
/// recoverable by falling back to the database, source-side kinds are fatal to
/// the request or reconciliation cycle that hit them.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Cache store errors: always recoverable by a database fallback.
    CacheConnectionFailed,
    CacheOperationFailed,
    CacheUnavailable,

    // Source (events database) errors.
    SourceConnectionFailed,
    SourceQueryFailed,

    // Domain errors.
    EventNotFound,
    NoAvailableSlots,
    AlreadyRegistered,

    // Serialization of cache payloads and status records.
    SerializationError,
    DeserializationError,

    // Configuration & data validation.
    ConfigError,
    InvalidData,

    Unknown,
}

impl ErrorKind {
    /// Returns whether a targeted cache mutation hitting this kind is worth
    /// retrying before the entry is invalidated instead.
    pub fn is_cache_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::CacheConnectionFailed
                | ErrorKind::CacheOperationFailed
                | ErrorKind::CacheUnavailable
        )
    }
}

/// Detailed payload stored for [`EvregError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Main error type for slot cache operations.
#[derive(Debug, Clone)]
pub struct EvregError {
    payload: ErrorPayload,
}

impl EvregError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    /// Creates an [`EvregError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EvregError {
            payload: ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
            },
        }
    }
}

impl PartialEq for EvregError {
    fn eq(&self, other: &EvregError) -> bool {
        self.payload.kind == other.payload.kind
    }
}

impl fmt::Display for EvregError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let location = self.payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.payload.kind,
            self.payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = self.payload.detail.as_deref() {
            write!(f, "\n  Detail: {detail}")?;
        }

        Ok(())
    }
}

impl error::Error for EvregError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Creates an [`EvregError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for EvregError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EvregError {
        EvregError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`EvregError`] from an error kind, static description, and
/// dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for EvregError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EvregError {
        EvregError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`redis::RedisError`] to [`EvregError`] with the appropriate kind.
///
/// Connection-level failures map to [`ErrorKind::CacheConnectionFailed`] so
/// callers treat them as "cache unreachable"; everything else maps to
/// [`ErrorKind::CacheOperationFailed`] and is eligible for targeted retries.
impl From<redis::RedisError> for EvregError {
    #[track_caller]
    fn from(err: redis::RedisError) -> EvregError {
        let kind = if err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
            || err.is_io_error()
        {
            ErrorKind::CacheConnectionFailed
        } else {
            ErrorKind::CacheOperationFailed
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        EvregError::from_components(
            kind,
            Cow::Borrowed("Cache operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`sqlx::Error`] to [`EvregError`] with the appropriate kind.
impl From<sqlx::Error> for EvregError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EvregError {
        let kind = match &err {
            sqlx::Error::RowNotFound => ErrorKind::EventNotFound,
            sqlx::Error::Database(_) => ErrorKind::SourceQueryFailed,
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                ErrorKind::SourceConnectionFailed
            }
            _ => ErrorKind::SourceQueryFailed,
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        EvregError::from_components(
            kind,
            Cow::Borrowed("Database operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`EvregError`].
///
/// Cache payloads are serialized from plain structs, so failures here come
/// from parsing foreign cache contents and map to
/// [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for EvregError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EvregError {
        let detail = err.to_string();
        let source = Arc::new(err);
        EvregError::from_components(
            ErrorKind::DeserializationError,
            Cow::Borrowed("JSON deserialization failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}
