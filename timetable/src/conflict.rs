use std::fmt;
use uuid::Uuid;

use crate::maintenance::{CheckType, MaintenancePattern};
use crate::template::FlightTemplate;
use crate::time_of_day::{day_name, TimeOfDay};
use crate::window::WeeklyWindow;

/// Where two overlapping windows meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapKind {
    /// Both start on the same day.
    SameDay,
    /// The existing window started on an earlier day and runs into the
    /// candidate's start day.
    PriorDaySpill,
    /// The candidate runs past midnight into the existing window's day.
    CandidateSpill,
}

/// An existing flight template together with the window it claims.
#[derive(Debug, Clone)]
pub struct BookedWindow {
    pub template: FlightTemplate,
    pub window: WeeklyWindow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightConflict {
    pub template_id: Uuid,
    pub route_id: Uuid,
    pub day_of_week: u8,
    pub departure_time: TimeOfDay,
    pub arrival_time: TimeOfDay,
    pub arrival_day_offset: u32,
    pub window: WeeklyWindow,
    pub kind: OverlapKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceConflict {
    pub pattern_id: Uuid,
    pub check_type: CheckType,
    pub day_of_week: u8,
    pub start_time: TimeOfDay,
    pub duration_minutes: i64,
    pub window: WeeklyWindow,
}

/// The first thing a candidate collides with.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleConflict {
    Flight(FlightConflict),
    Maintenance(MaintenanceConflict),
}

impl fmt::Display for ScheduleConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleConflict::Flight(c) => write!(
                f,
                "overlaps flight on route {} ({} {} - {}{}, ground window {} - {})",
                c.route_id,
                day_name(c.day_of_week),
                c.departure_time,
                c.arrival_time,
                if c.arrival_day_offset > 0 {
                    format!(" +{}d", c.arrival_day_offset)
                } else {
                    String::new()
                },
                c.window.start_time(),
                c.window.end_time(),
            ),
            ScheduleConflict::Maintenance(c) => write!(
                f,
                "overlaps {} check on {} at {} ({} min)",
                c.check_type,
                day_name(c.day_of_week),
                c.start_time,
                c.duration_minutes
            ),
        }
    }
}

pub fn classify(candidate: &WeeklyWindow, existing: &WeeklyWindow) -> OverlapKind {
    if candidate.start_day() == existing.start_day() {
        OverlapKind::SameDay
    } else if existing.touches_day(candidate.start_day()) {
        OverlapKind::PriorDaySpill
    } else {
        OverlapKind::CandidateSpill
    }
}

/// First active booked template (other than `candidate_id`) whose window
/// overlaps `candidate`.
pub fn find_flight_conflict(
    candidate_id: Uuid,
    candidate: &WeeklyWindow,
    booked: &[BookedWindow],
) -> Option<FlightConflict> {
    booked
        .iter()
        .filter(|b| b.template.is_active && b.template.id != candidate_id)
        .find(|b| b.window.overlaps(candidate))
        .map(|b| FlightConflict {
            template_id: b.template.id,
            route_id: b.template.route_id,
            day_of_week: b.template.day_of_week,
            departure_time: b.template.departure_time,
            arrival_time: b.template.arrival_time,
            arrival_day_offset: b.template.arrival_day_offset,
            window: b.window,
            kind: classify(candidate, &b.window),
        })
}

/// First active pattern whose `[start, start + duration]` overlaps `candidate`.
pub fn find_maintenance_conflict(
    candidate: &WeeklyWindow,
    patterns: &[MaintenancePattern],
) -> Option<MaintenanceConflict> {
    patterns
        .iter()
        .filter(|p| p.is_active())
        .find(|p| p.weekly_window().overlaps(candidate))
        .map(|p| MaintenanceConflict {
            pattern_id: p.id,
            check_type: p.check_type,
            day_of_week: p.day_of_week(),
            start_time: p.start_time,
            duration_minutes: p.duration_minutes,
            window: p.weekly_window(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground_ops::GroundOps;

    const OPS: GroundOps = GroundOps {
        pre_flight: 30,
        post_flight: 30,
    };

    fn booked(day: u8, departure: &str, duration: i64) -> BookedWindow {
        let template = FlightTemplate::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            day,
            TimeOfDay::parse(departure).unwrap(),
            duration,
        );
        let window = template.ground_window(OPS);
        BookedWindow { template, window }
    }

    fn candidate(day: u8, departure: &str, duration: i64) -> FlightTemplate {
        FlightTemplate::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            day,
            TimeOfDay::parse(departure).unwrap(),
            duration,
        )
    }

    #[test]
    fn test_same_day_conflict_names_existing_template() {
        let existing = booked(1, "08:00", 240);
        let new = candidate(1, "12:15", 60);
        let conflict = find_flight_conflict(new.id, &new.ground_window(OPS), &[existing.clone()])
            .expect("12:15 departure is inside the 07:30-12:30 window");
        assert_eq!(conflict.template_id, existing.template.id);
        assert_eq!(conflict.route_id, existing.template.route_id);
        assert_eq!(conflict.kind, OverlapKind::SameDay);
    }

    #[test]
    fn test_prior_day_spill() {
        // Monday 22:00 for 6h lands Tuesday 04:00, ground window to 04:30.
        let existing = booked(1, "22:00", 360);
        let new = candidate(2, "04:45", 60);
        let conflict = find_flight_conflict(new.id, &new.ground_window(OPS), &[existing]).unwrap();
        assert_eq!(conflict.kind, OverlapKind::PriorDaySpill);
    }

    #[test]
    fn test_candidate_spill_into_next_day() {
        let existing = booked(3, "02:00", 60);
        let new = candidate(2, "23:00", 180);
        let conflict = find_flight_conflict(new.id, &new.ground_window(OPS), &[existing]).unwrap();
        assert_eq!(conflict.kind, OverlapKind::CandidateSpill);
    }

    #[test]
    fn test_week_wraparound_saturday_to_sunday() {
        let existing = booked(0, "01:00", 60);
        let new = candidate(6, "22:30", 150);
        assert!(find_flight_conflict(new.id, &new.ground_window(OPS), &[existing]).is_some());
    }

    #[test]
    fn test_no_conflict_on_different_days() {
        let existing = booked(1, "08:00", 240);
        let new = candidate(3, "08:00", 240);
        assert!(find_flight_conflict(new.id, &new.ground_window(OPS), &[existing]).is_none());
    }

    #[test]
    fn test_inactive_and_self_are_ignored() {
        let mut existing = booked(1, "08:00", 240);
        existing.template.is_active = false;
        let new = candidate(1, "09:00", 60);
        assert!(find_flight_conflict(new.id, &new.ground_window(OPS), &[existing]).is_none());

        let same = booked(4, "08:00", 60);
        assert!(find_flight_conflict(same.template.id, &same.window, &[same.clone()]).is_none());
    }

    #[test]
    fn test_maintenance_conflict() {
        let pattern = MaintenancePattern::recurring(
            Uuid::new_v4(),
            CheckType::Weekly,
            1,
            TimeOfDay::hm(10, 0).unwrap(),
            240,
        );
        let flight = candidate(1, "13:00", 120);
        let conflict = find_maintenance_conflict(&flight.ground_window(OPS), &[pattern.clone()])
            .expect("12:30 pre-flight starts inside 10:00-14:00");
        assert_eq!(conflict.pattern_id, pattern.id);
        let message = ScheduleConflict::Maintenance(conflict).to_string();
        assert!(message.contains("weekly check on Monday at 10:00"));
    }
}
