//! Time-remaining breakdown and urgency classification for deadline countdowns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

pub const MILLIS_PER_SECOND: i64 = 1_000;
pub const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Fewer whole days than this left is `Urgent`.
pub const URGENT_BELOW_DAYS: u64 = 3;
/// Fewer whole days than this left (and not urgent) is `Warning`.
pub const WARNING_BELOW_DAYS: u64 = 7;

/// How pressing a deadline is, derived from whole days remaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Normal,
    Warning,
    Urgent,
}

impl UrgencyLevel {
    pub fn from_days(days: u64) -> Self {
        if days < URGENT_BELOW_DAYS {
            UrgencyLevel::Urgent
        } else if days < WARNING_BELOW_DAYS {
            UrgencyLevel::Warning
        } else {
            UrgencyLevel::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Normal => "normal",
            UrgencyLevel::Warning => "warning",
            UrgencyLevel::Urgent => "urgent",
        }
    }

    /// The call to action shown alongside an urgent countdown.
    pub fn headline(&self) -> Option<&'static str> {
        match self {
            UrgencyLevel::Urgent => Some("Hurry! Limited time remaining to secure your spot!"),
            UrgencyLevel::Normal | UrgencyLevel::Warning => None,
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A days/hours/minutes/seconds breakdown of the time left until a target.
///
/// Always derived, never stored: recompute it with [`compute_remaining`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRemaining {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub urgency: UrgencyLevel,
}

impl TimeRemaining {
    /// The breakdown of a deadline that has passed.
    pub const ZERO: TimeRemaining = TimeRemaining {
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
        urgency: UrgencyLevel::Urgent,
    };

    /// Breaks a millisecond delta down. Non-positive deltas yield [`TimeRemaining::ZERO`].
    pub fn from_millis(delta: i64) -> Self {
        if delta <= 0 {
            return Self::ZERO;
        }
        // Non-negative from here, the casts cannot wrap.
        let days = (delta / MILLIS_PER_DAY) as u64;
        let hours = ((delta / MILLIS_PER_HOUR) % 24) as u64;
        let minutes = ((delta / MILLIS_PER_MINUTE) % 60) as u64;
        let seconds = ((delta / MILLIS_PER_SECOND) % 60) as u64;
        Self {
            days,
            hours,
            minutes,
            seconds,
            urgency: UrgencyLevel::from_days(days),
        }
    }

    /// The whole seconds represented by the breakdown, in milliseconds.
    pub fn total_millis(&self) -> i64 {
        self.days as i64 * MILLIS_PER_DAY
            + self.hours as i64 * MILLIS_PER_HOUR
            + self.minutes as i64 * MILLIS_PER_MINUTE
            + self.seconds as i64 * MILLIS_PER_SECOND
    }

    pub fn is_zero(&self) -> bool {
        self.total_millis() == 0
    }

    /// The four display units, largest first.
    pub fn units(&self) -> [(u64, &'static str); 4] {
        [
            (self.days, "Days"),
            (self.hours, "Hours"),
            (self.minutes, "Minutes"),
            (self.seconds, "Seconds"),
        ]
    }
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Computes the time left from `now` until `target`.
///
/// Total over its inputs: a target in the past gives [`TimeRemaining::ZERO`].
pub fn compute_remaining(target: DateTime<Utc>, now: DateTime<Utc>) -> TimeRemaining {
    TimeRemaining::from_millis((target - now).num_milliseconds())
}

/// Whether the deadline has been reached. This is the completion condition,
/// which is stricter than a zeroed breakdown: the last 999 ms before the
/// target already display as all zeros.
pub fn has_elapsed(target: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    target <= now
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).unwrap()
    }

    #[test]
    fn past_and_present_targets_are_zeroed_and_urgent() {
        for offset in [0, -1, -1_000, -86_400_000 * 30] {
            let remaining = compute_remaining(now() + Duration::milliseconds(offset), now());
            assert_eq!(remaining, TimeRemaining::ZERO);
            assert_eq!(remaining.urgency, UrgencyLevel::Urgent);
        }
        assert!(has_elapsed(now(), now()));
    }

    #[test]
    fn one_of_each_unit_plus_a_millisecond() {
        let target = now() + Duration::milliseconds(90_061_001);
        let remaining = compute_remaining(target, now());
        assert_eq!(
            (remaining.days, remaining.hours, remaining.minutes, remaining.seconds),
            (1, 1, 1, 1)
        );
        assert_eq!(remaining.urgency, UrgencyLevel::Urgent);
        assert!(!has_elapsed(target, now()));
    }

    #[test]
    fn breakdown_floors_to_the_whole_second() {
        for delta in [1, 999, 1_000, 59_999, 3_599_999, 86_399_999, 604_800_001, 987_654_321] {
            let remaining = TimeRemaining::from_millis(delta);
            let floor = remaining.total_millis();
            assert!(floor <= delta, "{delta}: {floor} > delta");
            assert!(delta < floor + MILLIS_PER_SECOND, "{delta}: {floor} too small");
            assert!(remaining.hours < 24 && remaining.minutes < 60 && remaining.seconds < 60);
        }
    }

    #[test]
    fn sub_second_delta_displays_zero_but_has_not_elapsed() {
        let target = now() + Duration::milliseconds(400);
        let remaining = compute_remaining(target, now());
        assert!(remaining.is_zero());
        assert!(!has_elapsed(target, now()));
    }

    #[test]
    fn urgency_thresholds() {
        assert_eq!(UrgencyLevel::from_days(0), UrgencyLevel::Urgent);
        assert_eq!(UrgencyLevel::from_days(2), UrgencyLevel::Urgent);
        assert_eq!(UrgencyLevel::from_days(3), UrgencyLevel::Warning);
        assert_eq!(UrgencyLevel::from_days(6), UrgencyLevel::Warning);
        assert_eq!(UrgencyLevel::from_days(7), UrgencyLevel::Normal);
        assert_eq!(UrgencyLevel::from_days(365), UrgencyLevel::Normal);

        // Never less urgent as fewer days remain.
        let levels: Vec<_> = (0..30).rev().map(UrgencyLevel::from_days).collect();
        assert!(levels.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn only_urgent_has_a_headline() {
        assert!(UrgencyLevel::Urgent.headline().is_some());
        assert!(UrgencyLevel::Warning.headline().is_none());
        assert!(UrgencyLevel::Normal.headline().is_none());
    }

    #[test]
    fn renders_padded_units() {
        let remaining = TimeRemaining::from_millis(12 * MILLIS_PER_DAY + 3 * MILLIS_PER_HOUR + 4_000);
        assert_eq!(remaining.to_string(), "12:03:00:04");
        assert_eq!(remaining.urgency.to_string(), "normal");
        assert_eq!(
            remaining.units(),
            [(12, "Days"), (3, "Hours"), (0, "Minutes"), (4, "Seconds")]
        );
    }
}
