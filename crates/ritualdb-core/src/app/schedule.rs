//! Encoded habit schedules.

use std::fmt;
use std::str::FromStr;

/// When a habit is due.
///
/// Stored as a single string: `daily`, `days:1,3,5` (ISO weekdays, Monday
/// is 1) or `times:3` (times per week).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Every day.
    Daily,
    /// On the listed weekdays.
    DaysOfWeek(Vec<u8>),
    /// A number of times per week, on any days.
    TimesPerWeek(u8),
}

impl Schedule {
    /// Build a schedule from the pre-6.0.0 `scheduleKind` and `scheduleDays`
    /// fields.
    ///
    /// Unknown kinds and out-of-range days fall back to what still makes
    /// sense: an empty weekday list is daily, a missing count is once a week.
    pub fn from_legacy(kind: Option<&str>, days: &[i64]) -> Self {
        match kind {
            Some("daysOfWeek") => {
                let mut weekdays: Vec<u8> = days
                    .iter()
                    .filter(|d| (1..=7).contains(*d))
                    .map(|d| *d as u8)
                    .collect();
                weekdays.sort_unstable();
                weekdays.dedup();
                if weekdays.is_empty() || weekdays.len() == 7 {
                    Schedule::Daily
                } else {
                    Schedule::DaysOfWeek(weekdays)
                }
            }
            Some("timesPerWeek") => {
                let times = days.first().copied().unwrap_or(1).clamp(1, 7) as u8;
                Schedule::TimesPerWeek(times)
            }
            _ => Schedule::Daily,
        }
    }

    /// Check if the habit is due on an ISO weekday.
    pub fn is_due_on(&self, weekday: u8) -> bool {
        match self {
            Schedule::Daily | Schedule::TimesPerWeek(_) => true,
            Schedule::DaysOfWeek(days) => days.contains(&weekday),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Daily => write!(f, "daily"),
            Schedule::DaysOfWeek(days) => {
                let days: Vec<String> = days.iter().map(|d| d.to_string()).collect();
                write!(f, "days:{}", days.join(","))
            }
            Schedule::TimesPerWeek(times) => write!(f, "times:{}", times),
        }
    }
}

/// Error parsing an encoded schedule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid schedule: {0}")]
pub struct ParseScheduleError(String);

impl FromStr for Schedule {
    type Err = ParseScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseScheduleError(s.to_string());

        if s == "daily" {
            return Ok(Schedule::Daily);
        }
        if let Some(days) = s.strip_prefix("days:") {
            let days = days
                .split(',')
                .map(|d| d.parse::<u8>().ok().filter(|d| (1..=7).contains(d)))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(invalid)?;
            return Ok(Schedule::DaysOfWeek(days));
        }
        if let Some(times) = s.strip_prefix("times:") {
            let times = times
                .parse::<u8>()
                .ok()
                .filter(|t| (1..=7).contains(t))
                .ok_or_else(invalid)?;
            return Ok(Schedule::TimesPerWeek(times));
        }
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_legacy() {
        assert_eq!(Schedule::from_legacy(Some("daily"), &[]), Schedule::Daily);
        assert_eq!(
            Schedule::from_legacy(Some("daysOfWeek"), &[5, 1, 3, 3, 9]),
            Schedule::DaysOfWeek(vec![1, 3, 5])
        );
        assert_eq!(
            Schedule::from_legacy(Some("daysOfWeek"), &[1, 2, 3, 4, 5, 6, 7]),
            Schedule::Daily
        );
        assert_eq!(
            Schedule::from_legacy(Some("timesPerWeek"), &[3]),
            Schedule::TimesPerWeek(3)
        );
        assert_eq!(
            Schedule::from_legacy(Some("timesPerWeek"), &[]),
            Schedule::TimesPerWeek(1)
        );
        assert_eq!(Schedule::from_legacy(None, &[2]), Schedule::Daily);
    }

    #[test]
    fn test_encoding() {
        let weekdays = Schedule::DaysOfWeek(vec![1, 3, 5]);
        assert_eq!(weekdays.to_string(), "days:1,3,5");
        assert_eq!("days:1,3,5".parse::<Schedule>().unwrap(), weekdays);
        assert_eq!("times:4".parse::<Schedule>().unwrap(), Schedule::TimesPerWeek(4));
        assert_eq!("daily".parse::<Schedule>().unwrap(), Schedule::Daily);
        assert!("days:0".parse::<Schedule>().is_err());
        assert!("weekly".parse::<Schedule>().is_err());
    }

    #[test]
    fn test_is_due_on() {
        let weekdays = Schedule::DaysOfWeek(vec![1, 3]);
        assert!(weekdays.is_due_on(3));
        assert!(!weekdays.is_due_on(2));
        assert!(Schedule::Daily.is_due_on(7));
    }
}
