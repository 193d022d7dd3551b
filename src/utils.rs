/// Utility functions for timestamps and formatting
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

/// Current wall-clock time in the local offset, or UTC if it cannot be determined
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
    dt.format(format).unwrap_or_else(|_| dt.to_string())
}

/// Round a timestamp to the nearest whole minute (seconds >= 30 round up)
///
/// All records from one collection cycle share this value so sinks can
/// bucket them together.
pub fn cycle_timestamp(dt: OffsetDateTime) -> OffsetDateTime {
    let truncated = dt
        - Duration::seconds(i64::from(dt.second()))
        - Duration::nanoseconds(i64::from(dt.nanosecond()));

    if dt.second() >= 30 {
        truncated + Duration::minutes(1)
    } else {
        truncated
    }
}

/// Format as `YYYY-MM-DD HH:MM:SS`, adding `.ffffff` only when there are microseconds
pub fn format_record_time(dt: &OffsetDateTime) -> String {
    let result = if dt.microsecond() == 0 {
        dt.format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
    } else {
        dt.format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]"
        ))
    };
    result.unwrap_or_else(|_| dt.to_string())
}
