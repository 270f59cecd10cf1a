//! Macros for SDK error handling.
//!
//! Provides convenience macros for creating and returning [`crate::error::SdkError`] instances with
//! reduced boilerplate for common error handling patterns.

/// Creates an [`crate::error::SdkError`] from error kind and description.
#[macro_export]
macro_rules! sdk_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::SdkError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::SdkError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns an [`crate::error::SdkError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::sdk_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::sdk_error!($kind, $desc, $detail))
    };
}
