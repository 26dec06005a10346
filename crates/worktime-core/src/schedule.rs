//! Daily target policy: how many seconds a calendar date asks for.
//!
//! The policy is a plain value. Defaults are eight hours Monday to Friday,
//! four hours on Saturday and nothing on Sunday; the daemon may override the
//! per-weekday targets from its configuration.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target for Monday through Friday (8h).
pub const WEEKDAY_TARGET_SECS: u64 = 28_800;

/// Target for Saturday (4h).
pub const SATURDAY_TARGET_SECS: u64 = 14_400;

/// Target for Sunday.
pub const SUNDAY_TARGET_SECS: u64 = 0;

const HOUR: u32 = 3_600;

/// Returns the default target for `date`.
pub fn target_seconds(date: NaiveDate) -> u64 {
    DailyTargetPolicy::default().target_seconds(date)
}

/// Returns true if `date` has a non-zero default target.
pub fn is_work_day(date: NaiveDate) -> bool {
    target_seconds(date) > 0
}

// ============================================================================
// Working Hours
// ============================================================================

/// Nominal working-hours window of a weekday, in local time.
///
/// Purely informational: instants outside the window are reported, never
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    /// Opening time, seconds after local midnight.
    opens_at: u32,
    /// Closing time, seconds after local midnight (inclusive).
    closes_at: u32,
}

impl WorkingHours {
    /// Creates a window from seconds after midnight.
    pub const fn from_secs(opens_at: u32, closes_at: u32) -> Self {
        Self { opens_at, closes_at }
    }

    /// Returns true if `time` falls inside the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let secs = time.num_seconds_from_midnight();
        secs >= self.opens_at && secs <= self.closes_at
    }
}

impl fmt::Display for WorkingHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.opens_at / HOUR,
            (self.opens_at % HOUR) / 60,
            self.closes_at / HOUR,
            (self.closes_at % HOUR) / 60
        )
    }
}

const WEEKDAY_HOURS: WorkingHours = WorkingHours::from_secs(9 * HOUR, 18 * HOUR);
const SATURDAY_HOURS: WorkingHours = WorkingHours::from_secs(9 * HOUR, 13 * HOUR);

// ============================================================================
// Policy
// ============================================================================

/// Per-weekday targets, working-hour windows and the local offset used to
/// map instants onto calendar dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyTargetPolicy {
    /// Target seconds indexed from Monday.
    targets: [u64; 7],
    /// Working hours indexed from Monday.
    hours: [Option<WorkingHours>; 7],
    /// Offset of the local calendar from UTC.
    offset: FixedOffset,
}

impl Default for DailyTargetPolicy {
    fn default() -> Self {
        Self {
            targets: [
                WEEKDAY_TARGET_SECS,
                WEEKDAY_TARGET_SECS,
                WEEKDAY_TARGET_SECS,
                WEEKDAY_TARGET_SECS,
                WEEKDAY_TARGET_SECS,
                SATURDAY_TARGET_SECS,
                SUNDAY_TARGET_SECS,
            ],
            hours: [
                Some(WEEKDAY_HOURS),
                Some(WEEKDAY_HOURS),
                Some(WEEKDAY_HOURS),
                Some(WEEKDAY_HOURS),
                Some(WEEKDAY_HOURS),
                Some(SATURDAY_HOURS),
                None,
            ],
            offset: Utc.fix(),
        }
    }
}

impl DailyTargetPolicy {
    /// Overrides the target of one weekday.
    #[must_use]
    pub fn with_target(mut self, weekday: Weekday, seconds: u64) -> Self {
        if let Some(slot) = self.targets.get_mut(weekday.num_days_from_monday() as usize) {
            *slot = seconds;
        }
        self
    }

    /// Overrides the working-hours window of one weekday.
    #[must_use]
    pub fn with_hours(mut self, weekday: Weekday, hours: Option<WorkingHours>) -> Self {
        if let Some(slot) = self.hours.get_mut(weekday.num_days_from_monday() as usize) {
            *slot = hours;
        }
        self
    }

    /// Sets the local offset.
    #[must_use]
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Returns the target seconds for `date`.
    pub fn target_seconds(&self, date: NaiveDate) -> u64 {
        self.targets
            .get(date.weekday().num_days_from_monday() as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Returns true if `date` asks for any work at all.
    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        self.target_seconds(date) > 0
    }

    /// Returns the nominal window for `date`, if the weekday has one.
    pub fn working_hours(&self, date: NaiveDate) -> Option<WorkingHours> {
        self.hours
            .get(date.weekday().num_days_from_monday() as usize)
            .copied()
            .flatten()
    }

    /// Returns the local offset.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Returns the local calendar date of `instant`.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Returns true if `instant` falls inside the working hours of its local
    /// weekday. Days without a window never contain anything.
    pub fn within_working_hours(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.offset);
        self.working_hours(local.date_naive())
            .map(|hours| hours.contains(local.time()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_targets_by_weekday() {
        // 2024-01-01 is a Monday
        assert_eq!(target_seconds(date(2024, 1, 1)), 28_800);
        assert_eq!(target_seconds(date(2024, 1, 3)), 28_800); // Wednesday
        assert_eq!(target_seconds(date(2024, 1, 5)), 28_800); // Friday
        assert_eq!(target_seconds(date(2024, 1, 6)), 14_400); // Saturday
        assert_eq!(target_seconds(date(2024, 1, 7)), 0); // Sunday
    }

    #[test]
    fn test_is_work_day() {
        assert!(is_work_day(date(2024, 1, 2)));
        assert!(is_work_day(date(2024, 1, 6)));
        assert!(!is_work_day(date(2024, 1, 7)));
    }

    #[test]
    fn test_target_override() {
        let policy = DailyTargetPolicy::default()
            .with_target(Weekday::Fri, 21_600)
            .with_target(Weekday::Sun, 3_600);
        assert_eq!(policy.target_seconds(date(2024, 1, 5)), 21_600);
        assert!(policy.is_work_day(date(2024, 1, 7)));
    }

    #[test]
    fn test_working_hours_window() {
        let policy = DailyTargetPolicy::default();
        let inside = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 2, 19, 30, 0).unwrap();
        let saturday_afternoon = Utc.with_ymd_and_hms(2024, 1, 6, 15, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2024, 1, 7, 10, 0, 0).unwrap();

        assert!(policy.within_working_hours(inside));
        assert!(!policy.within_working_hours(late));
        assert!(!policy.within_working_hours(saturday_afternoon));
        assert!(!policy.within_working_hours(sunday));
    }

    #[test]
    fn test_local_date_uses_offset() {
        let policy =
            DailyTargetPolicy::default().with_offset(FixedOffset::east_opt(2 * 3600).unwrap());
        // 23:30 UTC on Tuesday is already Wednesday at +02:00
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 23, 30, 0).unwrap();
        assert_eq!(policy.local_date(instant), date(2024, 1, 3));
    }

    #[test]
    fn test_working_hours_display() {
        assert_eq!(WEEKDAY_HOURS.to_string(), "09:00-18:00");
    }
}
