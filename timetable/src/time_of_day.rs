use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::str::FromStr;

use crate::errors::TimeParseError;

pub const MINUTES_PER_DAY: i64 = 1440;
pub const MINUTES_PER_WEEK: i64 = 7 * MINUTES_PER_DAY;

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// A wall-clock time of day with minute resolution.
///
/// All schedule arithmetic goes through this type: adding minutes returns the
/// wrapped time together with the number of midnights crossed, so callers
/// never have to re-derive day rollover from strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeOfDay {
    minutes: u16,
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { minutes: 0 };

    /// Builds a time from minutes after midnight. Must be in `0..1440`.
    pub fn from_minutes(minutes: i64) -> Result<Self, TimeParseError> {
        if !(0..MINUTES_PER_DAY).contains(&minutes) {
            return Err(TimeParseError::OutOfRange(minutes.to_string()));
        }
        Ok(TimeOfDay {
            minutes: minutes as u16,
        })
    }

    pub fn hm(hour: u32, minute: u32) -> Result<Self, TimeParseError> {
        if hour > 23 || minute > 59 {
            return Err(TimeParseError::OutOfRange(format!(
                "{:02}:{:02}",
                hour, minute
            )));
        }
        Self::from_minutes((hour * 60 + minute) as i64)
    }

    /// Parses `HH:MM` or `HH:MM:SS`. Seconds are accepted and dropped.
    pub fn parse(input: &str) -> Result<Self, TimeParseError> {
        let parts: Vec<&str> = input.trim().split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(TimeParseError::InvalidFormat(input.to_string()));
        }

        let mut numbers = Vec::with_capacity(parts.len());
        for part in &parts {
            if part.is_empty() || part.len() > 2 {
                return Err(TimeParseError::InvalidFormat(input.to_string()));
            }
            let value: u32 = part
                .parse()
                .map_err(|_| TimeParseError::InvalidFormat(input.to_string()))?;
            numbers.push(value);
        }

        if numbers.len() == 3 && numbers[2] > 59 {
            return Err(TimeParseError::OutOfRange(input.to_string()));
        }
        Self::hm(numbers[0], numbers[1]).map_err(|_| TimeParseError::OutOfRange(input.to_string()))
    }

    pub fn minutes(self) -> i64 {
        self.minutes as i64
    }

    pub fn hour(self) -> u32 {
        (self.minutes / 60) as u32
    }

    pub fn minute(self) -> u32 {
        (self.minutes % 60) as u32
    }

    /// Adds (or subtracts) minutes. Returns the wrapped time and the day
    /// rollover: `+1` for each midnight crossed forwards, `-1` backwards.
    pub fn add_minutes(self, delta: i64) -> (TimeOfDay, i64) {
        let total = self.minutes() + delta;
        let wrapped = total.rem_euclid(MINUTES_PER_DAY);
        let rollover = total.div_euclid(MINUTES_PER_DAY);
        (
            TimeOfDay {
                minutes: wrapped as u16,
            },
            rollover,
        )
    }

    /// Minutes from `self` forward to `later`, wrapping past midnight.
    pub fn minutes_until(self, later: TimeOfDay) -> i64 {
        (later.minutes() - self.minutes()).rem_euclid(MINUTES_PER_DAY)
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        TimeOfDay {
            minutes: (time.hour() * 60 + time.minute()) as u16,
        }
    }

    /// The instant at this time on `date`.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.to_naive_time())
    }

    /// Rounds up to the next multiple of `step` minutes, clamped to 23:59.
    pub fn round_up(self, step: i64) -> TimeOfDay {
        if step <= 1 {
            return self;
        }
        let rounded = ((self.minutes() + step - 1) / step) * step;
        TimeOfDay {
            minutes: rounded.min(MINUTES_PER_DAY - 1) as u16,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeOfDay::parse(s)
    }
}

/// Day of week with 0 = Sunday, matching how templates are stored.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Shifts a day of week by `offset` days, wrapping around the week.
pub fn shift_day(day: u8, offset: i64) -> u8 {
    (day as i64 + offset).rem_euclid(7) as u8
}

pub fn day_name(day: u8) -> &'static str {
    DAY_NAMES.get(day as usize).copied().unwrap_or("Unknown")
}

pub fn validate_day(day: u8) -> Result<u8, TimeParseError> {
    if day > 6 {
        return Err(TimeParseError::InvalidDayOfWeek(day));
    }
    Ok(day)
}
