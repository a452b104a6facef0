use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::time_of_day::{day_of_week, TimeOfDay, MINUTES_PER_DAY};
use crate::window::WeeklyWindow;

/// Share of a tier's interval below which a check is reported as due soon.
pub const DUE_SOON_FRACTION: f64 = 0.10;

/// Maintenance tiers, ordered by increasing scope. A higher tier subsumes
/// every lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckType {
    Daily,
    Weekly,
    A,
    C,
    D,
}

impl CheckType {
    pub const ALL: [CheckType; 5] = [
        CheckType::Daily,
        CheckType::Weekly,
        CheckType::A,
        CheckType::C,
        CheckType::D,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            CheckType::Daily => "daily",
            CheckType::Weekly => "weekly",
            CheckType::A => "A",
            CheckType::C => "C",
            CheckType::D => "D",
        }
    }

    pub fn from_name(name: &str) -> Option<CheckType> {
        match name.trim() {
            "daily" => Some(CheckType::Daily),
            "weekly" => Some(CheckType::Weekly),
            "A" | "a" => Some(CheckType::A),
            "C" | "c" => Some(CheckType::C),
            "D" | "d" => Some(CheckType::D),
            _ => None,
        }
    }

    /// The tiers this one stamps when it is performed.
    pub fn subsumed(self) -> Vec<CheckType> {
        CheckType::ALL
            .iter()
            .copied()
            .filter(|tier| *tier < self)
            .collect()
    }

    /// C and D checks take the aircraft out of service for days.
    pub fn is_multi_day(self) -> bool {
        matches!(self, CheckType::C | CheckType::D)
    }

    pub fn is_routine(self) -> bool {
        matches!(self, CheckType::Daily | CheckType::Weekly)
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternStatus {
    Active,
    Completed,
}

/// When a pattern happens: every week on a day, or once on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Weekly { day_of_week: u8 },
    Once { date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaintenancePattern {
    pub id: Uuid,
    pub aircraft_id: Uuid,
    pub check_type: CheckType,
    pub recurrence: Recurrence,
    pub start_time: TimeOfDay,
    pub duration_minutes: i64,
    pub status: PatternStatus,
    pub auto_generated: bool,
}

impl MaintenancePattern {
    pub fn recurring(
        aircraft_id: Uuid,
        check_type: CheckType,
        day_of_week: u8,
        start_time: TimeOfDay,
        duration_minutes: i64,
    ) -> Self {
        MaintenancePattern {
            id: Uuid::new_v4(),
            aircraft_id,
            check_type,
            recurrence: Recurrence::Weekly {
                day_of_week: day_of_week % 7,
            },
            start_time,
            duration_minutes: duration_minutes.max(1),
            status: PatternStatus::Active,
            auto_generated: false,
        }
    }

    pub fn once(
        aircraft_id: Uuid,
        check_type: CheckType,
        date: NaiveDate,
        start_time: TimeOfDay,
        duration_minutes: i64,
    ) -> Self {
        MaintenancePattern {
            id: Uuid::new_v4(),
            aircraft_id,
            check_type,
            recurrence: Recurrence::Once { date },
            start_time,
            duration_minutes: duration_minutes.max(1),
            status: PatternStatus::Active,
            auto_generated: false,
        }
    }

    pub fn auto(mut self) -> Self {
        self.auto_generated = true;
        self
    }

    /// `ceil(duration / 1440)`, never less than one day.
    pub fn day_span(&self) -> i64 {
        ((self.duration_minutes + MINUTES_PER_DAY - 1) / MINUTES_PER_DAY).max(1)
    }

    pub fn day_of_week(&self) -> u8 {
        match self.recurrence {
            Recurrence::Weekly { day_of_week } => day_of_week,
            Recurrence::Once { date } => day_of_week(date),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PatternStatus::Active
    }

    /// `[start, start + duration]` projected on the week.
    pub fn weekly_window(&self) -> WeeklyWindow {
        WeeklyWindow::at(self.day_of_week(), self.start_time, self.duration_minutes)
    }

    /// Start instant if the pattern begins on `date`.
    pub fn start_on(&self, date: NaiveDate) -> Option<NaiveDateTime> {
        let runs = match self.recurrence {
            Recurrence::Weekly { day_of_week: day } => day_of_week(date) == day,
            Recurrence::Once { date: scheduled } => scheduled == date,
        };
        runs.then(|| self.start_time.on(date))
    }

    pub fn end_from(&self, start: NaiveDateTime) -> NaiveDateTime {
        start + Duration::minutes(self.duration_minutes)
    }

    /// Display blocks for a run of this pattern beginning on `start_date`.
    ///
    /// C and D checks get one block per calendar day they cover: the first
    /// carries the real start time and duration, the rest are full-day
    /// `is_ongoing` blocks. Every other tier is a single sitting, even when it
    /// runs past midnight.
    pub fn blocks_from(&self, start_date: NaiveDate) -> Vec<MaintenanceBlock> {
        let (end_time, rollover) = self.start_time.add_minutes(self.duration_minutes);
        let first = MaintenanceBlock {
            pattern_id: self.id,
            aircraft_id: self.aircraft_id,
            check_type: self.check_type,
            display_date: start_date,
            start_time: self.start_time,
            display_duration: self.duration_minutes,
            end_time,
            day_index: 0,
            is_ongoing: false,
            spans_overnight: rollover > 0,
        };

        if !self.check_type.is_multi_day() {
            return vec![first];
        }

        let mut blocks = vec![first];
        for day_index in 1..self.day_span() {
            blocks.push(MaintenanceBlock {
                pattern_id: self.id,
                aircraft_id: self.aircraft_id,
                check_type: self.check_type,
                display_date: start_date + Duration::days(day_index),
                start_time: TimeOfDay::MIDNIGHT,
                display_duration: MINUTES_PER_DAY,
                end_time,
                day_index: day_index as u32,
                is_ongoing: true,
                spans_overnight: false,
            });
        }
        blocks
    }
}

/// One calendar-day cell of a maintenance calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceBlock {
    pub pattern_id: Uuid,
    pub aircraft_id: Uuid,
    pub check_type: CheckType,
    pub display_date: NaiveDate,
    pub start_time: TimeOfDay,
    pub display_duration: i64,
    /// Wall-clock end of the whole check (on the last covered day).
    pub end_time: TimeOfDay,
    pub day_index: u32,
    pub is_ongoing: bool,
    pub spans_overnight: bool,
}

/// Expands every pattern into the blocks dated within `[from, to]`.
///
/// Recurring patterns are expanded for each matching start date, including
/// starts before `from` whose later days reach into the range. Blocks are
/// unique per `(aircraft, date, check type)`; the first one seen wins.
pub fn expand_blocks(
    patterns: &[MaintenancePattern],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<MaintenanceBlock> {
    let mut seen: HashSet<(Uuid, NaiveDate, CheckType)> = HashSet::new();
    let mut blocks = Vec::new();

    for pattern in patterns {
        let starts: Vec<NaiveDate> = match pattern.recurrence {
            Recurrence::Once { date } => vec![date],
            Recurrence::Weekly { day_of_week: day } => {
                let mut dates = Vec::new();
                let mut cursor = from - Duration::days(pattern.day_span() - 1);
                while cursor <= to {
                    if day_of_week(cursor) == day {
                        dates.push(cursor);
                    }
                    cursor += Duration::days(1);
                }
                dates
            }
        };

        for start in starts {
            for block in pattern.blocks_from(start) {
                if block.display_date < from || block.display_date > to {
                    continue;
                }
                if seen.insert((block.aircraft_id, block.display_date, block.check_type)) {
                    blocks.push(block);
                }
            }
        }
    }

    blocks.sort_by(|a, b| {
        (a.display_date, a.start_time, a.check_type).cmp(&(b.display_date, b.start_time, b.check_type))
    });
    blocks
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Valid,
    DueSoon,
    Expired,
}

impl CheckStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CheckStatus::Valid => "valid",
            CheckStatus::DueSoon => "due_soon",
            CheckStatus::Expired => "expired",
        }
    }
}

/// `lastCheck + interval` as an instant.
pub fn check_expiry(last_check: NaiveDateTime, interval_days: i64) -> NaiveDateTime {
    last_check + Duration::days(interval_days)
}

/// Validity of one tier. A tier never performed is expired; a tier with less
/// than `DUE_SOON_FRACTION` of its interval left is due soon.
pub fn check_status(
    last_check: Option<NaiveDateTime>,
    interval_days: i64,
    now: NaiveDateTime,
) -> CheckStatus {
    let Some(last) = last_check else {
        return CheckStatus::Expired;
    };
    let remaining = check_expiry(last, interval_days) - now;
    if remaining <= Duration::zero() {
        return CheckStatus::Expired;
    }
    let interval_minutes = (interval_days * MINUTES_PER_DAY) as f64;
    if (remaining.num_minutes() as f64) < interval_minutes * DUE_SOON_FRACTION {
        CheckStatus::DueSoon
    } else {
        CheckStatus::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_c_check_expands_one_block_per_day() {
        let aircraft = Uuid::new_v4();
        let pattern = MaintenancePattern::once(
            aircraft,
            CheckType::C,
            date("2024-01-01"),
            TimeOfDay::hm(6, 0).unwrap(),
            30240,
        );
        assert_eq!(pattern.day_span(), 21);

        let blocks = expand_blocks(&[pattern], date("2023-12-01"), date("2024-02-01"));
        assert_eq!(blocks.len(), 21);
        assert_eq!(blocks[0].display_date, date("2024-01-01"));
        assert_eq!(blocks[20].display_date, date("2024-01-21"));

        assert!(!blocks[0].is_ongoing);
        assert_eq!(blocks[0].start_time, TimeOfDay::hm(6, 0).unwrap());
        assert_eq!(blocks[0].display_duration, 30240);
        for block in &blocks[1..] {
            assert!(block.is_ongoing);
            assert_eq!(block.start_time, TimeOfDay::MIDNIGHT);
            assert_eq!(block.display_duration, 1440);
        }
    }

    #[test]
    fn test_a_check_is_single_overnight_block() {
        let pattern = MaintenancePattern::once(
            Uuid::new_v4(),
            CheckType::A,
            date("2024-03-05"),
            TimeOfDay::hm(22, 0).unwrap(),
            600,
        );
        let blocks = expand_blocks(&[pattern], date("2024-03-01"), date("2024-03-31"));
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].spans_overnight);
        assert_eq!(blocks[0].end_time, TimeOfDay::hm(8, 0).unwrap());
    }

    #[test]
    fn test_recurring_pattern_expands_each_week() {
        // Weekly check every Wednesday.
        let pattern = MaintenancePattern::recurring(
            Uuid::new_v4(),
            CheckType::Weekly,
            3,
            TimeOfDay::hm(1, 0).unwrap(),
            240,
        );
        let blocks = expand_blocks(&[pattern], date("2024-01-01"), date("2024-01-31"));
        let dates: Vec<NaiveDate> = blocks.iter().map(|b| b.display_date).collect();
        assert_eq!(
            dates,
            vec![
                date("2024-01-03"),
                date("2024-01-10"),
                date("2024-01-17"),
                date("2024-01-24"),
                date("2024-01-31")
            ]
        );
    }

    #[test]
    fn test_multi_day_block_started_before_range_is_clipped() {
        let pattern = MaintenancePattern::once(
            Uuid::new_v4(),
            CheckType::D,
            date("2024-01-01"),
            TimeOfDay::hm(8, 0).unwrap(),
            10 * 1440,
        );
        let blocks = expand_blocks(&[pattern], date("2024-01-05"), date("2024-01-07"));
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.is_ongoing));
    }

    #[test]
    fn test_duplicate_patterns_are_deduplicated() {
        let aircraft = Uuid::new_v4();
        let a = MaintenancePattern::recurring(aircraft, CheckType::Daily, 1, TimeOfDay::hm(2, 0).unwrap(), 60);
        let mut b = a.clone();
        b.id = Uuid::new_v4();
        let blocks = expand_blocks(&[a, b], date("2024-01-01"), date("2024-01-07"));
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_subsumed_tiers() {
        assert_eq!(
            CheckType::D.subsumed(),
            vec![CheckType::Daily, CheckType::Weekly, CheckType::A, CheckType::C]
        );
        assert_eq!(CheckType::Weekly.subsumed(), vec![CheckType::Daily]);
        assert!(CheckType::Daily.subsumed().is_empty());
    }

    #[test]
    fn test_check_status_uses_ten_percent_rule() {
        let last = date("2024-01-01").and_hms_opt(0, 0, 0).unwrap();
        // 100-day interval: due soon in the last 10 days.
        let valid = date("2024-03-31").and_hms_opt(0, 0, 0).unwrap();
        let due_soon = date("2024-04-02").and_hms_opt(0, 0, 0).unwrap();
        let expired = date("2024-04-11").and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(check_status(Some(last), 100, valid), CheckStatus::Valid);
        assert_eq!(check_status(Some(last), 100, due_soon), CheckStatus::DueSoon);
        assert_eq!(check_status(Some(last), 100, expired), CheckStatus::Expired);
        assert_eq!(check_status(None, 100, valid), CheckStatus::Expired);
    }
}
