//! Macros for slot cache error handling.
//!
//! Convenience macros for creating and returning [`crate::error::EvregError`]
//! instances with reduced boilerplate.

/// Creates an [`crate::error::EvregError`] from error kind and description,
/// with optional dynamic detail and source error.
#[macro_export]
macro_rules! evreg_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::EvregError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::EvregError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::EvregError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::EvregError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Creates and returns an [`crate::error::EvregError`] from the current
/// function, combining error creation with early return.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::evreg_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::evreg_error!($kind, $desc, $detail))
    };
}
