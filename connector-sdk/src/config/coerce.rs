use std::path::PathBuf;
use std::time::Duration;

use crate::bail;
use crate::config::duration::parse_duration;
use crate::error::{ErrorKind, SdkResult};

/// Separator used when a raw value is decoded into a list of strings.
pub const LIST_SEPARATOR: char = ',';

/// Conversion from a raw configuration string into a typed field value.
///
/// Every field type a configuration schema can bind implements this trait, so the coercion
/// applied to a key is picked from the Rust type of the field at registration time. The rules are
/// lenient: an empty string decodes to the zero value of numbers and booleans, and to
/// an empty list.
pub trait Coerce: Sized {
    /// Human readable name of the target type, used in error messages.
    const TYPE_NAME: &'static str;

    /// Converts `value` into `Self`.
    fn coerce(value: &str) -> SdkResult<Self>;
}

/// Parses an integer accepting an optional sign, `0x`/`0o`/`0b` prefixes, a leading `0` for octal
/// and `_` separators after a base prefix.
fn parse_integer(value: &str) -> SdkResult<i128> {
    if value.is_empty() {
        return Ok(0);
    }

    let (negative, unsigned) = match value.as_bytes()[0] {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };

    let lower = unsigned.to_ascii_lowercase();
    let (radix, digits) = if let Some(digits) = lower.strip_prefix("0x") {
        (16, digits.replace('_', ""))
    } else if let Some(digits) = lower.strip_prefix("0o") {
        (8, digits.replace('_', ""))
    } else if let Some(digits) = lower.strip_prefix("0b") {
        (2, digits.replace('_', ""))
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, lower[1..].replace('_', ""))
    } else {
        (10, lower)
    };

    if digits.is_empty() || digits.starts_with(['+', '-']) {
        bail!(
            ErrorKind::ConfigDecodeFailed,
            "Invalid integer value",
            format!("expected an integer (received: {value:?})")
        );
    }

    match i128::from_str_radix(&digits, radix) {
        Ok(parsed) if negative => Ok(-parsed),
        Ok(parsed) => Ok(parsed),
        Err(err) => bail!(
            ErrorKind::ConfigDecodeFailed,
            "Invalid integer value",
            format!("{err} (received: {value:?})")
        ),
    }
}

macro_rules! coerce_integer {
    ($($ty:ty),*) => {
        $(
            impl Coerce for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn coerce(value: &str) -> SdkResult<Self> {
                    let parsed = parse_integer(value)?;
                    match <$ty>::try_from(parsed) {
                        Ok(v) => Ok(v),
                        Err(_) => bail!(
                            ErrorKind::ConfigDecodeFailed,
                            "Integer value out of range",
                            format!("{parsed} does not fit in {} (received: {value:?})", stringify!($ty))
                        ),
                    }
                }
            }
        )*
    };
}

coerce_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! coerce_float {
    ($($ty:ty),*) => {
        $(
            impl Coerce for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn coerce(value: &str) -> SdkResult<Self> {
                    if value.is_empty() {
                        return Ok(0.0);
                    }

                    match value.parse::<$ty>() {
                        Ok(v) => Ok(v),
                        Err(err) => bail!(
                            ErrorKind::ConfigDecodeFailed,
                            "Invalid float value",
                            format!("{err} (received: {value:?})")
                        ),
                    }
                }
            }
        )*
    };
}

coerce_float!(f32, f64);

impl Coerce for bool {
    const TYPE_NAME: &'static str = "bool";

    fn coerce(value: &str) -> SdkResult<Self> {
        match value {
            "" | "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            _ => bail!(
                ErrorKind::ConfigDecodeFailed,
                "Invalid boolean value",
                format!("expected true or false (received: {value:?})")
            ),
        }
    }
}

impl Coerce for String {
    const TYPE_NAME: &'static str = "string";

    fn coerce(value: &str) -> SdkResult<Self> {
        Ok(value.to_string())
    }
}

impl Coerce for PathBuf {
    const TYPE_NAME: &'static str = "path";

    fn coerce(value: &str) -> SdkResult<Self> {
        Ok(PathBuf::from(value))
    }
}

impl Coerce for Duration {
    const TYPE_NAME: &'static str = "duration";

    fn coerce(value: &str) -> SdkResult<Self> {
        parse_duration(value)
    }
}

impl Coerce for Vec<String> {
    const TYPE_NAME: &'static str = "list";

    fn coerce(value: &str) -> SdkResult<Self> {
        if value.is_empty() {
            return Ok(Vec::new());
        }

        Ok(value.split(LIST_SEPARATOR).map(str::to_string).collect())
    }
}

impl<T: Coerce> Coerce for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn coerce(value: &str) -> SdkResult<Self> {
        T::coerce(value).map(Some)
    }
}
