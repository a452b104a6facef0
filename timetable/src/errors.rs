use std::fmt;

/// Errors produced while building time-of-day values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    /// The text is not `HH:MM` or `HH:MM:SS`.
    InvalidFormat(String),
    /// Hours or minutes are outside their range.
    OutOfRange(String),
    /// A day of week outside `0..=6`.
    InvalidDayOfWeek(u8),
}

impl fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeParseError::InvalidFormat(input) => write!(f, "Invalid time format: {}", input),
            TimeParseError::OutOfRange(input) => write!(f, "Time out of range: {}", input),
            TimeParseError::InvalidDayOfWeek(day) => write!(f, "Invalid day of week: {}", day),
        }
    }
}

impl std::error::Error for TimeParseError {}
