//! Calendar arithmetic for weekly flight templates and aircraft maintenance.
//!
//! Nothing in here touches storage or threads: every function takes the
//! templates, patterns and instants it needs and returns plain values.

pub mod conflict;
pub mod errors;
pub mod ground_ops;
pub mod maintenance;
pub mod slots;
pub mod template;
pub mod time_of_day;
pub mod window;

pub use conflict::{
    find_flight_conflict, find_maintenance_conflict, BookedWindow, FlightConflict,
    MaintenanceConflict, OverlapKind, ScheduleConflict,
};
pub use errors::TimeParseError;
pub use ground_ops::{GroundOps, GroundOpsProfile, SizeCategory};
pub use maintenance::{
    check_expiry, check_status, expand_blocks, CheckStatus, CheckType, MaintenanceBlock,
    MaintenancePattern, PatternStatus, Recurrence,
};
pub use slots::{free_slots, largest_free_slot, plan_routine_checks, FreeSlot, RoutinePlan};
pub use template::{active_occurrences, FlightTemplate, Occurrence};
pub use time_of_day::{day_name, day_of_week, TimeOfDay, MINUTES_PER_DAY, MINUTES_PER_WEEK};
pub use window::WeeklyWindow;
