//! World clocks, weekly timetables, maintenance, revenue and the aircraft
//! lifecycle of an airline management game, driven by background jobs.

pub mod clock;
pub mod jobs;
pub mod lifecycle;
pub mod maintenance;
pub mod revenue;
pub mod scheduling;
pub mod simulation;
pub mod types;

#[cfg(test)]
mod test_support;
