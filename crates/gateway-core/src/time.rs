//! Wall-clock abstraction and the window arithmetic shared by rate limiting
//! and budget accounting.
//!
//! All boundaries are computed in UTC at access time; nothing here holds
//! state apart from [`ManualClock`].

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Source of the current time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start at the given instant
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Jump to an instant
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }

    /// Move forward (or back, for negative durations)
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Fixed rate-limit window lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// 60 seconds
    Minute,
    /// 3600 seconds
    Hour,
    /// 86400 seconds, starting at UTC midnight
    Day,
}

impl WindowKind {
    /// Every window kind, shortest first
    pub const ALL: [Self; 3] = [Self::Minute, Self::Hour, Self::Day];

    /// Window length in seconds
    #[must_use]
    pub fn length_secs(self) -> i64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
        }
    }

    /// Start of the window containing `now`
    #[must_use]
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let into_window = now.timestamp().rem_euclid(self.length_secs());
        now - Duration::seconds(into_window)
            - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
    }

    /// Exclusive end of the window containing `now`
    #[must_use]
    pub fn window_end(self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.window_start(now) + Duration::seconds(self.length_secs())
    }

    /// Whole seconds until the window rolls over, rounded up, never below 1
    #[must_use]
    pub fn seconds_until_rollover(self, now: DateTime<Utc>) -> u64 {
        let remaining_ms = (self.window_end(now) - now).num_milliseconds().max(0);
        let secs = (remaining_ms + 999) / 1000;
        secs.max(1) as u64
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
        }
    }
}

/// Budget accounting periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    /// Calendar day (UTC)
    Day,
    /// Seven days from the configured start-of-week
    Week,
    /// Calendar month
    Month,
}

impl BudgetPeriod {
    /// Every period, shortest first
    pub const ALL: [Self; 3] = [Self::Day, Self::Week, Self::Month];

    /// Start of the period containing `now`
    #[must_use]
    pub fn period_start(self, now: DateTime<Utc>, week_start: Weekday) -> DateTime<Utc> {
        let today = now.date_naive();
        let first = match self {
            Self::Day => today,
            Self::Week => {
                let back = (7 + now.weekday().num_days_from_monday()
                    - week_start.num_days_from_monday())
                    % 7;
                today - Duration::days(i64::from(back))
            }
            Self::Month => today.with_day(1).unwrap_or(today),
        };
        midnight(first)
    }

    /// Exclusive end of the period containing `now`
    #[must_use]
    pub fn period_end(self, now: DateTime<Utc>, week_start: Weekday) -> DateTime<Utc> {
        let start = self.period_start(now, week_start);
        match self {
            Self::Day => start + Duration::days(1),
            Self::Week => start + Duration::days(7),
            Self::Month => {
                let (year, month) = if start.month() == 12 {
                    (start.year() + 1, 1)
                } else {
                    (start.year(), start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
                    .map_or(start + Duration::days(31), midnight)
            }
        }
    }

    /// Human-readable bucket key: `2024-05-17`, `2024-W20` or `2024-05`.
    ///
    /// Week keys use the ISO week of the period's first day.
    #[must_use]
    pub fn bucket_key(self, now: DateTime<Utc>, week_start: Weekday) -> String {
        let start = self.period_start(now, week_start);
        match self {
            Self::Day => start.format("%Y-%m-%d").to_string(),
            Self::Week => {
                let iso = start.iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            Self::Month => start.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn test_window_start_alignment() {
        let now = at("2024-05-17T13:45:27.250Z");
        assert_eq!(WindowKind::Minute.window_start(now), at("2024-05-17T13:45:00Z"));
        assert_eq!(WindowKind::Hour.window_start(now), at("2024-05-17T13:00:00Z"));
        assert_eq!(WindowKind::Day.window_start(now), at("2024-05-17T00:00:00Z"));
        assert_eq!(WindowKind::Minute.window_end(now), at("2024-05-17T13:46:00Z"));
    }

    #[test]
    fn test_seconds_until_rollover() {
        let now = at("2024-05-17T13:45:27.250Z");
        assert_eq!(WindowKind::Minute.seconds_until_rollover(now), 33);
        assert_eq!(WindowKind::Hour.seconds_until_rollover(now), 14 * 60 + 33);

        // exactly on a boundary a full window remains
        let edge = at("2024-05-17T13:46:00Z");
        assert_eq!(WindowKind::Minute.seconds_until_rollover(edge), 60);

        let almost = at("2024-05-17T13:45:59.999Z");
        assert_eq!(WindowKind::Minute.seconds_until_rollover(almost), 1);
    }

    #[test]
    fn test_period_start_and_end() {
        // Friday
        let now = at("2024-05-17T13:45:27Z");

        assert_eq!(
            BudgetPeriod::Day.period_start(now, Weekday::Mon),
            at("2024-05-17T00:00:00Z")
        );
        assert_eq!(
            BudgetPeriod::Week.period_start(now, Weekday::Mon),
            at("2024-05-13T00:00:00Z")
        );
        assert_eq!(
            BudgetPeriod::Week.period_start(now, Weekday::Sun),
            at("2024-05-12T00:00:00Z")
        );
        assert_eq!(
            BudgetPeriod::Week.period_start(now, Weekday::Fri),
            at("2024-05-17T00:00:00Z")
        );
        assert_eq!(
            BudgetPeriod::Month.period_start(now, Weekday::Mon),
            at("2024-05-01T00:00:00Z")
        );
        assert_eq!(
            BudgetPeriod::Month.period_end(now, Weekday::Mon),
            at("2024-06-01T00:00:00Z")
        );
        assert_eq!(
            BudgetPeriod::Week.period_end(now, Weekday::Mon),
            at("2024-05-20T00:00:00Z")
        );
    }

    #[test]
    fn test_month_end_wraps_year() {
        let now = at("2024-12-31T23:59:59Z");
        assert_eq!(
            BudgetPeriod::Month.period_end(now, Weekday::Mon),
            at("2025-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_bucket_keys() {
        let now = at("2024-05-17T13:45:27Z");
        assert_eq!(BudgetPeriod::Day.bucket_key(now, Weekday::Mon), "2024-05-17");
        assert_eq!(BudgetPeriod::Week.bucket_key(now, Weekday::Mon), "2024-W20");
        assert_eq!(BudgetPeriod::Month.bucket_key(now, Weekday::Mon), "2024-05");
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(at("2024-05-17T00:00:00Z"));
        let other = clock.clone();
        clock.advance(Duration::minutes(5));
        assert_eq!(other.now(), at("2024-05-17T00:05:00Z"));
    }
}
