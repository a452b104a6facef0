use std::fmt;
use timetable::TimeOfDay;
use uuid::Uuid;

use crate::model::AircraftStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backing store could not be reached.
    Unavailable(String),
    /// The backing store took too long to answer.
    Timeout(String),
    NotFound { entity: &'static str, id: String },
    /// A template already exists for this aircraft, day and departure time.
    DuplicateTemplate {
        aircraft_id: Uuid,
        day_of_week: u8,
        departure_time: TimeOfDay,
    },
    LockPoisoned,
    /// An update found the aircraft in a status it does not apply to.
    StatusMismatch {
        aircraft_id: Uuid,
        found: AircraftStatus,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            StoreError::Timeout(msg) => write!(f, "Store timeout: {}", msg),
            StoreError::NotFound { entity, id } => write!(f, "{} not found: {}", entity, id),
            StoreError::DuplicateTemplate {
                aircraft_id,
                day_of_week,
                departure_time,
            } => write!(
                f,
                "Aircraft {} already has a template on day {} at {}",
                aircraft_id, day_of_week, departure_time
            ),
            StoreError::LockPoisoned => write!(f, "Store lock poisoned"),
            StoreError::StatusMismatch { aircraft_id, found } => {
                write!(f, "Aircraft {} is {}", aircraft_id, found.as_str())
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::LockPoisoned
    }
}
