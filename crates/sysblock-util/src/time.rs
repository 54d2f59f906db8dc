//! Time utilities for sysblockd
//!
//! Every enforcement decision takes the current time as an explicit
//! parameter; [`now`] is only called at the service edge. Persisted
//! timestamps are epoch milliseconds.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `SYSBLOCK_MOCK_TIME` environment variable can be set
//! to override the system time returned by [`now`]. This is useful for
//! exercising day rollover and freeze windows by hand.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! SYSBLOCK_MOCK_TIME="2025-12-25 23:59:30" sysblockd
//! ```

use chrono::{DateTime, Datelike, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "SYSBLOCK_MOCK_TIME";

/// Minutes in one calendar day
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Offset between mock time and real time, captured once per process.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Epoch milliseconds for a local timestamp
pub fn to_millis(dt: &DateTime<Local>) -> i64 {
    dt.timestamp_millis()
}

/// Local timestamp for epoch milliseconds. Out-of-range values clamp to the epoch.
pub fn from_millis(ms: i64) -> DateTime<Local> {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Local.timestamp_millis_opt(0).single().unwrap_or_default())
}

/// Calendar day of year (1..=366) in local time
pub fn day_of_year(dt: &DateTime<Local>) -> u32 {
    dt.ordinal()
}

/// Wall-clock time of day at minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn of(dt: &DateTime<Local>) -> Self {
        Self::from_naive_time(dt.time())
    }

    /// Minutes since midnight (0..1440)
    pub fn minute_of_day(&self) -> u16 {
        (self.hour as u16) * 60 + (self.minute as u16)
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minute_of_day().cmp(&other.minute_of_day())
    }
}

impl std::fmt::Display for WallClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A daily recurring window, inclusive start and exclusive end.
///
/// When `start >= end` the window wraps past midnight and covers
/// `[start, 24:00)` plus `[00:00, end)`. A window with `start == end`
/// therefore covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyWindow {
    pub start: WallClock,
    pub end: WallClock,
}

impl DailyWindow {
    pub fn new(start: WallClock, end: WallClock) -> Self {
        Self { start, end }
    }

    /// Check whether a minute-of-day falls inside the window
    pub fn contains_minute(&self, minute: u16) -> bool {
        let start = self.start.minute_of_day();
        let end = self.end.minute_of_day();

        if start < end {
            minute >= start && minute < end
        } else {
            minute >= start || minute < end
        }
    }

    /// Check whether the given local datetime falls inside the window
    pub fn contains(&self, dt: &DateTime<Local>) -> bool {
        self.contains_minute(WallClock::of(dt).minute_of_day())
    }
}
