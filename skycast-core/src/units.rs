//! Pure unit-conversion and time-formatting helpers.
//!
//! Everything in here is deterministic: identical numeric inputs produce
//! identical outputs, which the fetch pipeline relies on when it builds the
//! display model.

use chrono::{DateTime, Timelike, Utc};

pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - 273.15
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn mps_to_kmph(mps: f64) -> f64 {
    mps * 3.6
}

/// Round a value to one decimal place, half away from zero in decimal terms.
///
/// The value is snapped to two decimals before the final rounding step so
/// that inputs sitting on the `.x5` boundary round away from zero
/// (`20.05 -> 20.1`, `-20.05 -> -20.1`) instead of falling to whichever
/// binary neighbor happens to be nearer (`20.05f64` is slightly below
/// twenty point zero five).
pub fn format_temp(value: f64) -> f64 {
    let hundredths = (value * 100.0).round();
    (hundredths / 10.0).round() / 10.0
}

/// Render a UNIX timestamp as `H:MM AM/PM` in the clock of the given
/// timezone offset.
///
/// The timestamp is shifted by the offset and the shifted instant's UTC
/// calendar fields are read as the local wall clock, so the host machine's
/// timezone never leaks in. Hour 0 renders as 12; minutes are zero-padded.
pub fn format_time(unix_seconds: i64, tz_offset_seconds: i64) -> String {
    let shifted = shift(unix_seconds, tz_offset_seconds);
    let hours = shifted.hour();
    let minutes = shifted.minute();

    let meridiem = if hours >= 12 { "PM" } else { "AM" };
    let clock_hours = match hours % 12 {
        0 => 12,
        h => h,
    };

    format!("{clock_hours}:{minutes:02} {meridiem}")
}

/// Render a UNIX timestamp as `YYYY-MM-DD HH:MM` (24-hour) in the clock of
/// the given timezone offset. Same shifting rule as [`format_time`].
pub fn format_datetime(unix_seconds: i64, tz_offset_seconds: i64) -> String {
    shift(unix_seconds, tz_offset_seconds).format("%Y-%m-%d %H:%M").to_string()
}

/// Duration between two UNIX timestamps as `"<H> hr and <M> min"`, using the
/// absolute difference. Hours do not roll over into days (25 hr is valid).
pub fn calculate_duration(start_seconds: i64, end_seconds: i64) -> String {
    let diff = end_seconds.abs_diff(start_seconds);
    let hours = diff / 3600;
    let minutes = (diff % 3600) / 60;

    format!("{hours} hr and {minutes} min")
}

fn shift(unix_seconds: i64, tz_offset_seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(unix_seconds + tz_offset_seconds, 0).unwrap_or_default()
}
