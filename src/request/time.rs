//! Time-string grammar shared by the `trim` parameter and FFmpeg's diagnostics.
//!
//! Accepted form is `hh:mm:ss.ss` or `hh:mm:ss.sss`. Hours may have any number
//! of digits; minutes and seconds have exactly two. The fractional part is
//! read as a plain number of milliseconds, which is what FFmpeg's two-digit
//! output and the public API both expect (`00:00:02.12` is 2012 ms).

use std::sync::LazyLock;

use regex::Regex;

static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+):(\d{2}):(\d{2})\.(\d{2,3})$").expect("time pattern is valid")
});

/// Human readable description of the grammar, used in error messages.
pub const TIME_FORMAT_HINT: &str = "hh:mm:ss.sss";

/// Convert a time string to milliseconds.
///
/// Returns `None` if the string does not follow the grammar exactly or if
/// minutes or seconds are 60 or larger.
pub fn parse_time_ms(time: &str) -> Option<u64> {
    let captures = TIME_PATTERN.captures(time)?;
    let hours: u64 = captures[1].parse().ok()?;
    let minutes: u64 = captures[2].parse().ok()?;
    let seconds: u64 = captures[3].parse().ok()?;
    let millis: u64 = captures[4].parse().ok()?;

    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    hours
        .checked_mul(3_600_000)?
        .checked_add(minutes * 60_000 + seconds * 1_000 + millis)
}
