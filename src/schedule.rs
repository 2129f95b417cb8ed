//! Timing helpers for the main loop

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, DurationRound, TimeDelta, Utc};

/// Seconds into the hour at which the hourly counter is closed
const ROLLOVER_SECOND_OF_HOUR: i64 = 59 * 60 + 58;

/// Round timestamp up to the next multiple of `interval` since the epoch.
/// Example: 12:00:03 with 10s gives 12:00:10.
pub fn next_interval(time: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let seconds = interval.num_seconds().max(1);
    let since_last = Duration::seconds(time.timestamp().rem_euclid(seconds));
    time - since_last + Duration::seconds(seconds)
}

/// Busy interval while a vehicle is connected, idle interval otherwise.
pub fn poll_interval(is_connected: bool, busy: StdDuration, idle: StdDuration) -> StdDuration {
    if is_connected {
        busy
    } else {
        idle
    }
}

/// Next HH:59:58 strictly after `now`.
pub fn next_hourly_rollover(now: DateTime<Utc>) -> DateTime<Utc> {
    let hour_start = now
        .duration_trunc(TimeDelta::hours(1))
        .unwrap_or(now - Duration::seconds(now.timestamp().rem_euclid(3600)));
    let candidate = hour_start + Duration::seconds(ROLLOVER_SECOND_OF_HOUR);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::hours(1)
    }
}
