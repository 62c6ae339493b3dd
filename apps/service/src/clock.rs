//! Duration formatting and elapsed-time helpers.

use chrono::{DateTime, Utc};

/// Seconds per day/hour/minute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Interval {
    Day = 86_400,
    Hour = 3_600,
    Minute = 60,
}

impl Interval {
    pub const fn seconds(self) -> u64 {
        self as u64
    }

    fn unit(self, count: u64) -> &'static str {
        match (self, count) {
            (Interval::Day, 1) => "day",
            (Interval::Day, _) => "days",
            (Interval::Hour, 1) => "hour",
            (Interval::Hour, _) => "hours",
            (Interval::Minute, 1) => "minute",
            (Interval::Minute, _) => "minutes",
        }
    }
}

/// Whole seconds elapsed from `anchor` to `now`, or 0 without an anchor.
///
/// Never negative: an anchor in the future (clock skew, restored backups)
/// counts as zero elapsed time.
pub fn elapsed_seconds(anchor: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    anchor.map(|at| (now - at).num_seconds().max(0) as u64).unwrap_or(0)
}

/// Format seconds as e.g. `1 day, 2 hours, 3 minutes`.
///
/// Zero units are left out and seconds are dropped, so anything under a
/// minute formats as an empty string.
pub fn format_duration(seconds: u64) -> String {
    let mut remaining = seconds;
    let mut parts = Vec::with_capacity(3);

    for interval in [Interval::Day, Interval::Hour, Interval::Minute] {
        let count = remaining / interval.seconds();
        remaining -= count * interval.seconds();
        if count > 0 {
            parts.push(format!("{} {}", count, interval.unit(count)));
        }
    }

    parts.join(", ")
}
