use persistence::{AircraftStatus, StoreError};
use std::fmt;
use timetable::TimeParseError;
use uuid::Uuid;

/// Represents errors that can occur in the simulator services.
#[derive(Debug)]
pub enum SimError {
    InvalidInput(String),
    /// An aircraft was asked to do something its current status does not allow.
    InvalidTransition {
        aircraft: Uuid,
        from: AircraftStatus,
        action: &'static str,
    },
    WorldNotFound(Uuid),
    WorldCompleted(Uuid),
    Store(StoreError),
    LockError(String),
    TimerStartError(String),
    InvalidDuration(String),
    Config(String),
    Other(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            SimError::InvalidTransition {
                aircraft,
                from,
                action,
            } => write!(
                f,
                "Aircraft {} cannot {} while {}",
                aircraft,
                action,
                from.as_str()
            ),
            SimError::WorldNotFound(id) => write!(f, "World not found: {}", id),
            SimError::WorldCompleted(id) => write!(f, "World {} has already completed", id),
            SimError::Store(e) => write!(f, "Store error: {}", e),
            SimError::LockError(msg) => write!(f, "Lock error: {}", msg),
            SimError::TimerStartError(msg) => write!(f, "Timer start error: {}", msg),
            SimError::InvalidDuration(msg) => write!(f, "Invalid duration: {}", msg),
            SimError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SimError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for SimError {}

impl From<StoreError> for SimError {
    fn from(e: StoreError) -> Self {
        SimError::Store(e)
    }
}

impl From<TimeParseError> for SimError {
    fn from(e: TimeParseError) -> Self {
        SimError::InvalidInput(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for SimError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        SimError::LockError(e.to_string())
    }
}
