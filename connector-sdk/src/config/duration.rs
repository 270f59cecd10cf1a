use std::time::Duration;

use crate::bail;
use crate::error::{ErrorKind, SdkResult};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Units accepted in a duration string, with their length in nanoseconds.
const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", NANOS_PER_MICRO),
    ("\u{b5}s", NANOS_PER_MICRO),
    ("\u{3bc}s", NANOS_PER_MICRO),
    ("ms", NANOS_PER_MILLI),
    ("s", NANOS_PER_SECOND),
    ("m", 60 * NANOS_PER_SECOND),
    ("h", 3600 * NANOS_PER_SECOND),
];

/// Parses a duration string such as `"300ms"`, `"1.5h"` or `"2h45m"`.
///
/// A duration string is a sequence of decimal numbers, each with an optional fraction and a
/// mandatory unit suffix. Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. The bare
/// string `"0"` is accepted without a unit. Negative durations cannot be represented and are
/// rejected unless they are zero.
pub fn parse_duration(value: &str) -> SdkResult<Duration> {
    let mut rest = value;
    let mut negative = false;
    if let Some(stripped) = rest.strip_prefix('-') {
        negative = true;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        bail!(
            ErrorKind::ConfigDecodeFailed,
            "Invalid duration",
            format!("empty duration (received: {value:?})")
        );
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (whole, after_whole) = split_digits(rest);
        let mut fraction = "";
        let mut after_number = after_whole;
        if let Some(stripped) = after_whole.strip_prefix('.') {
            let (digits, after_fraction) = split_digits(stripped);
            fraction = digits;
            after_number = after_fraction;
        }
        if whole.is_empty() && fraction.is_empty() {
            bail!(
                ErrorKind::ConfigDecodeFailed,
                "Invalid duration",
                format!("expected a number (received: {value:?})")
            );
        }

        let unit_len = after_number
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after_number.len());
        let (unit, remaining) = after_number.split_at(unit_len);
        if unit.is_empty() {
            bail!(
                ErrorKind::ConfigDecodeFailed,
                "Invalid duration",
                format!("missing unit (received: {value:?})")
            );
        }
        let Some(&(_, unit_nanos)) = UNITS.iter().find(|(name, _)| *name == unit) else {
            bail!(
                ErrorKind::ConfigDecodeFailed,
                "Invalid duration",
                format!("unknown unit {unit:?} (received: {value:?})")
            );
        };

        let whole_value: u128 = if whole.is_empty() {
            0
        } else {
            match whole.parse::<u128>() {
                Ok(v) => v,
                Err(_) => bail!(
                    ErrorKind::ConfigDecodeFailed,
                    "Invalid duration",
                    format!("duration out of range (received: {value:?})")
                ),
            }
        };
        let mut component = whole_value.checked_mul(unit_nanos);
        if !fraction.is_empty() {
            // Fractions only need to be precise to the nanosecond.
            let digits = &fraction[..fraction.len().min(18)];
            let numerator = digits.parse::<u128>().unwrap_or(0);
            let scale = 10u128.pow(digits.len() as u32);
            component = component.map(|c| c + numerator * unit_nanos / scale);
        }

        total = match component.and_then(|c| total.checked_add(c)) {
            Some(t) if t <= u64::MAX as u128 * NANOS_PER_SECOND => t,
            _ => bail!(
                ErrorKind::ConfigDecodeFailed,
                "Invalid duration",
                format!("duration out of range (received: {value:?})")
            ),
        };
        rest = remaining;
    }

    if negative && total != 0 {
        bail!(
            ErrorKind::ConfigDecodeFailed,
            "Invalid duration",
            format!("negative durations are not supported (received: {value:?})")
        );
    }

    let secs = (total / NANOS_PER_SECOND) as u64;
    let nanos = (total % NANOS_PER_SECOND) as u32;

    Ok(Duration::new(secs, nanos))
}

/// Formats a duration the way [`parse_duration`] reads it back, e.g. `"0s"`, `"1s"`,
/// `"1m30s"`, `"1h0m0s"` or `"250ms"`.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < NANOS_PER_SECOND {
        let (scale, unit) = if nanos < NANOS_PER_MICRO {
            (1, "ns")
        } else if nanos < NANOS_PER_MILLI {
            (NANOS_PER_MICRO, "\u{b5}s")
        } else {
            (NANOS_PER_MILLI, "ms")
        };
        return format!("{}{unit}", format_scaled(nanos, scale));
    }

    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = format_scaled(
        (total_secs % 60) as u128 * NANOS_PER_SECOND + duration.subsec_nanos() as u128,
        NANOS_PER_SECOND,
    );

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Renders `value / scale` with as many decimals as needed and no trailing zeros.
fn format_scaled(value: u128, scale: u128) -> String {
    let whole = value / scale;
    let fraction = value % scale;
    if fraction == 0 {
        return whole.to_string();
    }

    let width = scale.to_string().len() - 1;
    let digits = format!("{fraction:0width$}");

    format!("{whole}.{}", digits.trim_end_matches('0'))
}

fn split_digits(value: &str) -> (&str, &str) {
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value.split_at(end)
}
