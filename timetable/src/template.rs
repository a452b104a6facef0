use chrono::{Duration, NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::ground_ops::GroundOps;
use crate::time_of_day::{day_of_week, TimeOfDay, MINUTES_PER_DAY};
use crate::window::WeeklyWindow;

/// How many days back an occurrence may have departed and still be airborne.
pub const MAX_LOOKBACK_DAYS: i64 = 3;

/// A weekly-recurring flight. It has no date: it repeats every week on
/// `day_of_week` (0 = Sunday) at `departure_time`.
///
/// `arrival_time` and `arrival_day_offset` describe when the round trip ends
/// relative to the departure day.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightTemplate {
    pub id: Uuid,
    pub route_id: Uuid,
    pub aircraft_id: Uuid,
    pub day_of_week: u8,
    pub departure_time: TimeOfDay,
    pub arrival_time: TimeOfDay,
    pub arrival_day_offset: u32,
    pub total_duration_minutes: i64,
    pub is_active: bool,
}

/// One dated instance of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub template_id: Uuid,
    pub route_id: Uuid,
    pub aircraft_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub departure: NaiveDateTime,
    pub arrival_date: NaiveDate,
    pub arrival: NaiveDateTime,
}

impl Occurrence {
    pub fn is_airborne_at(&self, now: NaiveDateTime) -> bool {
        self.departure <= now && now < self.arrival
    }
}

impl FlightTemplate {
    /// Creates an active template, deriving the arrival time and day offset
    /// from the departure and the total round-trip duration.
    pub fn new(
        route_id: Uuid,
        aircraft_id: Uuid,
        day_of_week: u8,
        departure_time: TimeOfDay,
        total_duration_minutes: i64,
    ) -> Self {
        let duration = total_duration_minutes.max(0);
        let (arrival_time, rollover) = departure_time.add_minutes(duration);
        FlightTemplate {
            id: Uuid::new_v4(),
            route_id,
            aircraft_id,
            day_of_week: day_of_week % 7,
            departure_time,
            arrival_time,
            arrival_day_offset: rollover.max(0) as u32,
            total_duration_minutes: duration,
            is_active: true,
        }
    }

    /// Departure-to-arrival span, without ground services.
    pub fn flight_window(&self) -> WeeklyWindow {
        WeeklyWindow::at(self.day_of_week, self.departure_time, self.block_minutes())
    }

    /// `[departure - pre_flight, arrival + post_flight]` for this template.
    pub fn ground_window(&self, ops: GroundOps) -> WeeklyWindow {
        WeeklyWindow::from_day(
            self.day_of_week,
            self.departure_time.minutes() - ops.pre_flight,
            ops.pre_flight + self.block_minutes() + ops.post_flight,
        )
    }

    /// Departure to arrival in minutes, as given by arrival time and offset.
    pub fn block_minutes(&self) -> i64 {
        self.arrival_day_offset as i64 * MINUTES_PER_DAY + self.arrival_time.minutes()
            - self.departure_time.minutes()
    }

    /// The occurrence departing on `date`, if the template runs that day.
    pub fn occurrence_on(&self, date: NaiveDate) -> Option<Occurrence> {
        if day_of_week(date) != self.day_of_week {
            return None;
        }
        let arrival_date = date + Duration::days(self.arrival_day_offset as i64);
        Some(Occurrence {
            template_id: self.id,
            route_id: self.route_id,
            aircraft_id: self.aircraft_id,
            scheduled_date: date,
            departure: self.departure_time.on(date),
            arrival_date,
            arrival: self.arrival_time.on(arrival_date),
        })
    }

    /// The occurrence in flight at `now`, if any.
    ///
    /// Today's departure counts once its time has passed; a departure on one of
    /// the previous `MAX_LOOKBACK_DAYS` days counts only when its arrival day
    /// offset reaches at least that far forward. Whatever is left is discarded
    /// once its arrival has passed.
    pub fn airborne_occurrence(&self, now: NaiveDateTime) -> Option<Occurrence> {
        if !self.is_active {
            return None;
        }
        let today = now.date();
        let now_time = TimeOfDay::from_naive_time(now.time());

        for days_back in 0..=MAX_LOOKBACK_DAYS {
            let date = today - Duration::days(days_back);
            if day_of_week(date) != self.day_of_week {
                continue;
            }
            if days_back == 0 && self.departure_time > now_time {
                continue;
            }
            if days_back > 0 && (self.arrival_day_offset as i64) < days_back {
                continue;
            }
            if let Some(occurrence) = self.occurrence_on(date) {
                if occurrence.arrival > now {
                    return Some(occurrence);
                }
            }
        }
        None
    }

    /// The most recent occurrence whose arrival is at or before `now`.
    pub fn last_completed(&self, now: NaiveDateTime) -> Option<Occurrence> {
        let today = now.date();
        let horizon = 7 + self.arrival_day_offset as i64;
        (0..=horizon)
            .map(|days_back| today - Duration::days(days_back))
            .filter_map(|date| self.occurrence_on(date))
            .find(|occurrence| occurrence.arrival <= now)
    }
}

/// Every occurrence of the active templates that is in the air at `now`.
pub fn active_occurrences<'a, I>(templates: I, now: NaiveDateTime) -> Vec<Occurrence>
where
    I: IntoIterator<Item = &'a FlightTemplate>,
{
    templates
        .into_iter()
        .filter_map(|template| template.airborne_occurrence(now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M").unwrap()
    }

    fn monday_template(departure: &str, duration: i64) -> FlightTemplate {
        FlightTemplate::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            1,
            TimeOfDay::parse(departure).unwrap(),
            duration,
        )
    }

    #[test]
    fn test_new_derives_arrival() {
        let template = monday_template("22:00", 300);
        assert_eq!(template.arrival_time, TimeOfDay::hm(3, 0).unwrap());
        assert_eq!(template.arrival_day_offset, 1);
        assert_eq!(template.block_minutes(), 300);
    }

    #[test]
    fn test_monday_morning_flight_in_and_out_of_air() {
        // 2024-01-01 is a Monday.
        let template = monday_template("08:00", 600);
        assert!(template.airborne_occurrence(at("2024-01-01", "09:00")).is_some());
        assert!(template.airborne_occurrence(at("2024-01-01", "19:00")).is_none());
        assert!(template.airborne_occurrence(at("2024-01-01", "07:59")).is_none());
        assert!(template.airborne_occurrence(at("2024-01-02", "09:00")).is_none());
    }

    #[test]
    fn test_overnight_flight_found_from_previous_day() {
        let template = monday_template("22:00", 300);
        let occurrence = template
            .airborne_occurrence(at("2024-01-02", "01:30"))
            .expect("still airborne on Tuesday morning");
        assert_eq!(occurrence.scheduled_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(occurrence.arrival, at("2024-01-02", "03:00"));
        assert!(template.airborne_occurrence(at("2024-01-02", "03:00")).is_none());
    }

    #[test]
    fn test_multi_day_trip_within_lookback() {
        // Departs Monday 20:00, arrives Thursday 02:00 (offset 3).
        let template = monday_template("20:00", 2 * 1440 + 360);
        assert_eq!(template.arrival_day_offset, 3);
        assert!(template.airborne_occurrence(at("2024-01-04", "01:00")).is_some());
        assert!(template.airborne_occurrence(at("2024-01-04", "02:30")).is_none());
    }

    #[test]
    fn test_inactive_template_never_airborne() {
        let mut template = monday_template("08:00", 600);
        template.is_active = false;
        assert!(active_occurrences([&template], at("2024-01-01", "09:00")).is_empty());
    }

    #[test]
    fn test_last_completed_occurrence() {
        let template = monday_template("08:00", 120);
        let done = template.last_completed(at("2024-01-01", "10:00")).unwrap();
        assert_eq!(done.arrival, at("2024-01-01", "10:00"));

        let previous = template.last_completed(at("2024-01-01", "09:00")).unwrap();
        assert_eq!(previous.scheduled_date, NaiveDate::from_ymd_opt(2023, 12, 25).unwrap());
    }

    #[test]
    fn test_ground_window_includes_services() {
        let template = monday_template("08:00", 120);
        let window = template.ground_window(GroundOps {
            pre_flight: 30,
            post_flight: 20,
        });
        assert_eq!(window.start_time(), TimeOfDay::hm(7, 30).unwrap());
        assert_eq!(window.end_time(), TimeOfDay::hm(10, 20).unwrap());
        assert_eq!(window.len(), 170);
    }
}
