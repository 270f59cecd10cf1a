use std::error;
use std::fmt;

/// Convenient result type for SDK operations using [`SdkError`] as the error type.
pub type SdkResult<T> = Result<T, SdkError>;

/// Main error type for connector and middleware operations.
///
/// [`SdkError`] can represent a single error, an error with additional detail, or several
/// aggregated errors (for example every field that failed to decode in one configuration map).
#[derive(Debug, Clone)]
pub struct SdkError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Multiple aggregated errors
    Many(Vec<SdkError>),
}

/// Categories of errors that can occur while wiring, configuring or driving a destination.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConfigDecodeFailed,
    ValidationError,
    ConfigError,

    // Cancellation Errors
    Canceled,
    DeadlineExceeded,

    // Destination Errors
    DestinationError,
    InvalidState,

    // Empty aggregate
    Unknown,
}

impl SdkError {
    /// Creates an [`SdkError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<SdkError>) -> SdkError {
        SdkError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattening aggregated errors.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }

    /// Returns `true` when the error was caused by a cancelled context or an expired deadline.
    ///
    /// Callers use this to tell an aborted wait apart from a configuration or destination
    /// failure, the former usually being safe to retry.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Canceled | ErrorKind::DeadlineExceeded)
    }
}

impl PartialEq for SdkError {
    fn eq(&self, other: &SdkError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;

                Ok(())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)?;

                Ok(())
            }
            ErrorRepr::Many(ref errors) => {
                if errors.is_empty() {
                    write!(f, "Multiple errors occurred (empty)")?;
                } else if errors.len() == 1 {
                    errors[0].fmt(f)?;
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl error::Error for SdkError {}

/// Creates an [`SdkError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for SdkError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> SdkError {
        SdkError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates an [`SdkError`] from an error kind, static description, and dynamic detail.
impl From<(ErrorKind, &'static str, String)> for SdkError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> SdkError {
        SdkError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

/// Creates an [`SdkError`] from a vector of errors for aggregation.
impl<E> From<Vec<E>> for SdkError
where
    E: Into<SdkError>,
{
    fn from(errors: Vec<E>) -> SdkError {
        SdkError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, sdk_error};

    #[test]
    fn test_simple_error_creation() {
        let err = SdkError::from((ErrorKind::ConfigError, "Missing configuration"));
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(err.detail(), None);
        assert_eq!(err.kinds(), vec![ErrorKind::ConfigError]);
    }

    #[test]
    fn test_error_with_detail() {
        let err = SdkError::from((
            ErrorKind::ConfigDecodeFailed,
            "Configuration value could not be decoded",
            "sdk.batch.size: invalid digit found in string".to_string(),
        ));
        assert_eq!(err.kind(), ErrorKind::ConfigDecodeFailed);
        assert_eq!(
            err.detail(),
            Some("sdk.batch.size: invalid digit found in string")
        );
    }

    #[test]
    fn test_multiple_errors() {
        let errors = vec![
            SdkError::from((ErrorKind::ValidationError, "Value is required")),
            SdkError::from((ErrorKind::ConfigDecodeFailed, "Bad duration")),
        ];
        let multi_err = SdkError::many(errors);

        assert_eq!(multi_err.kind(), ErrorKind::ValidationError);
        assert_eq!(
            multi_err.kinds(),
            vec![ErrorKind::ValidationError, ErrorKind::ConfigDecodeFailed]
        );
        assert_eq!(multi_err.detail(), None);
    }

    #[test]
    fn test_empty_multiple_errors() {
        let multi_err = SdkError::many(vec![]);
        assert_eq!(multi_err.kind(), ErrorKind::Unknown);
        assert_eq!(multi_err.kinds(), vec![]);
        assert_eq!(multi_err.detail(), None);
    }

    #[test]
    fn test_error_equality() {
        let err1 = SdkError::from((ErrorKind::Canceled, "Context canceled"));
        let err2 = SdkError::from((ErrorKind::Canceled, "Operation canceled"));
        let err3 = SdkError::from((ErrorKind::DeadlineExceeded, "Deadline exceeded"));

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn test_is_cancellation() {
        assert!(SdkError::from((ErrorKind::Canceled, "canceled")).is_cancellation());
        assert!(SdkError::from((ErrorKind::DeadlineExceeded, "deadline")).is_cancellation());
        assert!(!SdkError::from((ErrorKind::ConfigDecodeFailed, "decode")).is_cancellation());
    }

    #[test]
    fn test_multiple_errors_display() {
        let errors = vec![
            SdkError::from((ErrorKind::ValidationError, "Invalid value")),
            SdkError::from((ErrorKind::ConfigDecodeFailed, "Bad integer")),
        ];
        let display_str = format!("{}", SdkError::many(errors));
        assert!(display_str.contains("Multiple errors"));
        assert!(display_str.contains("2 total"));
    }

    #[test]
    fn test_macro_usage() {
        let err = sdk_error!(ErrorKind::ValidationError, "Invalid data format");
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(err.detail(), None);

        let err_with_detail = sdk_error!(
            ErrorKind::ConfigDecodeFailed,
            "Configuration value could not be decoded",
            "Cannot convert string to integer: 'abc'"
        );
        assert_eq!(err_with_detail.kind(), ErrorKind::ConfigDecodeFailed);
        assert!(err_with_detail.detail().unwrap().contains("Cannot convert"));
    }

    #[test]
    fn test_bail_macro() {
        fn test_function() -> SdkResult<i32> {
            bail!(ErrorKind::InvalidState, "Test error");
        }

        fn test_function_with_detail() -> SdkResult<i32> {
            bail!(ErrorKind::DestinationError, "Test error", "Additional detail");
        }

        let err = test_function().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = test_function_with_detail().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationError);
        assert!(err.detail().unwrap().contains("Additional detail"));
    }
}
