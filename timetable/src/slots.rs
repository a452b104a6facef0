use uuid::Uuid;

use crate::maintenance::{CheckType, MaintenancePattern, Recurrence};
use crate::time_of_day::{TimeOfDay, MINUTES_PER_DAY};
use crate::window::WeeklyWindow;

/// Checks start on a five-minute grid.
const PLACEMENT_STEP: i64 = 5;

/// A gap in one day of the week with nothing booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSlot {
    pub day_of_week: u8,
    pub start: TimeOfDay,
    pub minutes: i64,
}

/// Free gaps within `day_of_week`, earliest first.
///
/// Busy windows from neighbouring days count for the part that spills into
/// this day, and the gaps never cross midnight.
pub fn free_slots(day_of_week: u8, busy: &[WeeklyWindow]) -> Vec<FreeSlot> {
    let mut taken: Vec<(i64, i64)> = busy
        .iter()
        .flat_map(|window| window.day_segments())
        .filter(|(day, _, _)| *day == day_of_week)
        .map(|(_, from, to)| (from, to))
        .collect();
    taken.sort();

    let mut slots = Vec::new();
    let mut cursor = 0;
    for (from, to) in taken {
        if from > cursor {
            push_slot(&mut slots, day_of_week, cursor, from - cursor);
        }
        cursor = cursor.max(to);
    }
    if cursor < MINUTES_PER_DAY {
        push_slot(&mut slots, day_of_week, cursor, MINUTES_PER_DAY - cursor);
    }
    slots
}

fn push_slot(slots: &mut Vec<FreeSlot>, day_of_week: u8, start: i64, minutes: i64) {
    if let Ok(start) = TimeOfDay::from_minutes(start) {
        slots.push(FreeSlot {
            day_of_week,
            start,
            minutes,
        });
    }
}

/// Longest gap of the day; the earliest one wins a tie.
pub fn largest_free_slot(day_of_week: u8, busy: &[WeeklyWindow]) -> Option<FreeSlot> {
    free_slots(day_of_week, busy)
        .into_iter()
        .fold(None, |best: Option<FreeSlot>, slot| match best {
            Some(b) if b.minutes >= slot.minutes => Some(b),
            _ => Some(slot),
        })
}

/// Start time that centres `minutes` inside `slot`, snapped back to the grid
/// without leaving the slot. `None` when the check does not fit.
pub fn place_in_slot(slot: &FreeSlot, minutes: i64) -> Option<TimeOfDay> {
    if minutes > slot.minutes {
        return None;
    }
    let centred = slot.start.minutes() + (slot.minutes - minutes) / 2;
    let snapped = centred - centred % PLACEMENT_STEP;
    let start = if snapped < slot.start.minutes() {
        slot.start.minutes()
    } else {
        snapped
    };
    TimeOfDay::from_minutes(start).ok()
}

/// Routine checks proposed for one aircraft.
#[derive(Debug, Clone, Default)]
pub struct RoutinePlan {
    pub patterns: Vec<MaintenancePattern>,
    /// Days with no gap large enough for a daily check.
    pub skipped_days: Vec<u8>,
}

/// Places daily and weekly checks into the largest free gaps of the week.
///
/// `busy` holds every ground-operations window of the aircraft plus its
/// hand-made patterns; `manual` are the hand-made recurring patterns, which
/// are never replaced. The weekly check goes on the day with the largest gap
/// unless a hand-made weekly-or-higher pattern already exists. A daily check
/// is not created on a day already covered by a higher tier.
pub fn plan_routine_checks(
    aircraft_id: Uuid,
    busy: &[WeeklyWindow],
    manual: &[MaintenancePattern],
    daily_minutes: i64,
    weekly_minutes: i64,
) -> RoutinePlan {
    let recurring_days = |pred: &dyn Fn(CheckType) -> bool| -> Vec<u8> {
        manual
            .iter()
            .filter(|p| p.is_active() && pred(p.check_type))
            .filter_map(|p| match p.recurrence {
                Recurrence::Weekly { day_of_week } => Some(day_of_week),
                Recurrence::Once { .. } => None,
            })
            .collect()
    };
    let higher_days = recurring_days(&|tier| tier >= CheckType::Weekly);
    let daily_days = recurring_days(&|tier| tier == CheckType::Daily);

    let mut plan = RoutinePlan::default();
    let mut weekly_day = None;

    if higher_days.is_empty() {
        let best = (0..7u8)
            .filter_map(|day| largest_free_slot(day, busy))
            .filter(|slot| slot.minutes >= weekly_minutes)
            .fold(None, |best: Option<FreeSlot>, slot| match best {
                Some(b) if b.minutes >= slot.minutes => Some(b),
                _ => Some(slot),
            });
        if let Some(slot) = best {
            if let Some(start) = place_in_slot(&slot, weekly_minutes) {
                plan.patterns.push(
                    MaintenancePattern::recurring(
                        aircraft_id,
                        CheckType::Weekly,
                        slot.day_of_week,
                        start,
                        weekly_minutes,
                    )
                    .auto(),
                );
                weekly_day = Some(slot.day_of_week);
            }
        }
    }

    for day in 0..7u8 {
        if higher_days.contains(&day) || weekly_day == Some(day) || daily_days.contains(&day) {
            continue;
        }
        let placed = largest_free_slot(day, busy)
            .and_then(|slot| place_in_slot(&slot, daily_minutes));
        match placed {
            Some(start) => plan.patterns.push(
                MaintenancePattern::recurring(aircraft_id, CheckType::Daily, day, start, daily_minutes)
                    .auto(),
            ),
            None => plan.skipped_days.push(day),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_slots_around_busy_windows() {
        let busy = vec![
            WeeklyWindow::from_day(1, 6 * 60, 4 * 60),  // 06:00-10:00
            WeeklyWindow::from_day(1, 14 * 60, 2 * 60), // 14:00-16:00
        ];
        let slots = free_slots(1, &busy);
        let spans: Vec<(String, i64)> = slots.iter().map(|s| (s.start.to_string(), s.minutes)).collect();
        assert_eq!(
            spans,
            vec![
                ("00:00".to_string(), 360),
                ("10:00".to_string(), 240),
                ("16:00".to_string(), 480)
            ]
        );
        assert_eq!(largest_free_slot(1, &busy).unwrap().start.to_string(), "16:00");
    }

    #[test]
    fn test_spill_from_previous_day_blocks_morning() {
        // Sunday 22:00 + 6h spills to Monday 04:00.
        let busy = vec![WeeklyWindow::from_day(0, 22 * 60, 6 * 60)];
        let slots = free_slots(1, &busy);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start.to_string(), "04:00");
        assert_eq!(slots[0].minutes, 1200);
    }

    #[test]
    fn test_place_in_slot_centres_on_grid() {
        let slot = FreeSlot {
            day_of_week: 2,
            start: TimeOfDay::hm(10, 0).unwrap(),
            minutes: 241,
        };
        assert_eq!(place_in_slot(&slot, 60).unwrap().to_string(), "11:30");
        assert!(place_in_slot(&slot, 300).is_none());
    }

    #[test]
    fn test_plan_skips_daily_on_weekly_day_and_never_overlaps() {
        let aircraft = Uuid::new_v4();
        // Busy most of each day except Wednesday.
        let busy: Vec<WeeklyWindow> = (0..7u8)
            .filter(|day| *day != 3)
            .map(|day| WeeklyWindow::from_day(day, 5 * 60, 16 * 60))
            .collect();

        let plan = plan_routine_checks(aircraft, &busy, &[], 60, 240);
        let weekly: Vec<&MaintenancePattern> = plan
            .patterns
            .iter()
            .filter(|p| p.check_type == CheckType::Weekly)
            .collect();
        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly[0].day_of_week(), 3);

        let daily_days: Vec<u8> = plan
            .patterns
            .iter()
            .filter(|p| p.check_type == CheckType::Daily)
            .map(|p| p.day_of_week())
            .collect();
        assert_eq!(daily_days, vec![0, 1, 2, 4, 5, 6]);

        for pattern in &plan.patterns {
            assert!(pattern.auto_generated);
            assert!(busy.iter().all(|w| !w.overlaps(&pattern.weekly_window())));
        }
    }

    #[test]
    fn test_plan_respects_manual_weekly() {
        let aircraft = Uuid::new_v4();
        let manual = vec![MaintenancePattern::recurring(
            aircraft,
            CheckType::Weekly,
            5,
            TimeOfDay::hm(1, 0).unwrap(),
            240,
        )];
        let busy = vec![manual[0].weekly_window()];
        let plan = plan_routine_checks(aircraft, &busy, &manual, 60, 240);
        assert!(plan.patterns.iter().all(|p| p.check_type == CheckType::Daily));
        assert!(plan.patterns.iter().all(|p| p.day_of_week() != 5));
        assert_eq!(plan.patterns.len(), 6);
    }

    #[test]
    fn test_fully_booked_day_is_skipped() {
        let aircraft = Uuid::new_v4();
        let busy = vec![WeeklyWindow::from_day(2, 0, MINUTES_PER_DAY)];
        let plan = plan_routine_checks(aircraft, &busy, &[], 60, 240);
        assert_eq!(plan.skipped_days, vec![2]);
    }
}
