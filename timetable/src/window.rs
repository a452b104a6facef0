use crate::time_of_day::{shift_day, TimeOfDay, MINUTES_PER_DAY, MINUTES_PER_WEEK};

/// A half-open span `[start, end)` measured in minutes from Sunday 00:00.
///
/// `start` is normalised into `0..MINUTES_PER_WEEK`; `end` may run past the
/// end of the week, which is how a Saturday-night window spills into Sunday.
/// Windows that touch end-to-start do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyWindow {
    start: i64,
    end: i64,
}

impl WeeklyWindow {
    /// A window beginning `start_offset` minutes after midnight of `day_of_week`
    /// (negative offsets reach back into the previous day) lasting `length` minutes.
    pub fn from_day(day_of_week: u8, start_offset: i64, length: i64) -> Self {
        let raw_start = day_of_week as i64 * MINUTES_PER_DAY + start_offset;
        let start = raw_start.rem_euclid(MINUTES_PER_WEEK);
        WeeklyWindow {
            start,
            end: start + length.max(0),
        }
    }

    pub fn at(day_of_week: u8, time: TimeOfDay, length: i64) -> Self {
        Self::from_day(day_of_week, time.minutes(), length)
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start_day(&self) -> u8 {
        (self.start / MINUTES_PER_DAY) as u8
    }

    /// Day of week holding the last minute of the window.
    pub fn end_day(&self) -> u8 {
        let last = (self.end - 1).max(self.start);
        shift_day(0, last.div_euclid(MINUTES_PER_DAY))
    }

    pub fn start_time(&self) -> TimeOfDay {
        TimeOfDay::MIDNIGHT.add_minutes(self.start).0
    }

    pub fn end_time(&self) -> TimeOfDay {
        TimeOfDay::MIDNIGHT.add_minutes(self.end).0
    }

    pub fn spans_midnight(&self) -> bool {
        self.len() > 0 && (self.end - 1) / MINUTES_PER_DAY != self.start / MINUTES_PER_DAY
    }

    /// The overlap primitive shared by flight and maintenance conflict checks.
    ///
    /// Both windows are compared modulo one week, so a window that wraps from
    /// Saturday into Sunday meets a Sunday-morning window. A window a week or
    /// longer occupies every minute and overlaps any non-empty window.
    pub fn overlaps(&self, other: &WeeklyWindow) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.len() >= MINUTES_PER_WEEK || other.len() >= MINUTES_PER_WEEK {
            return true;
        }
        [-MINUTES_PER_WEEK, 0, MINUTES_PER_WEEK]
            .iter()
            .any(|shift| self.start < other.end + shift && other.start + shift < self.end)
    }

    /// Whether the window occupies any minute of `day_of_week`.
    pub fn touches_day(&self, day_of_week: u8) -> bool {
        self.day_segments()
            .iter()
            .any(|(day, _, _)| *day == day_of_week)
    }

    /// Splits the window into per-day pieces `(day, from, to)` where `from` and
    /// `to` are minutes after that day's midnight.
    pub fn day_segments(&self) -> Vec<(u8, i64, i64)> {
        if self.is_empty() {
            return Vec::new();
        }
        if self.len() >= MINUTES_PER_WEEK {
            return (0..7).map(|day| (day, 0, MINUTES_PER_DAY)).collect();
        }

        let mut segments = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let day_index = cursor.div_euclid(MINUTES_PER_DAY);
            let day_start = day_index * MINUTES_PER_DAY;
            let piece_end = (day_start + MINUTES_PER_DAY).min(self.end);
            segments.push((
                shift_day(0, day_index),
                cursor - day_start,
                piece_end - day_start,
            ));
            cursor = piece_end;
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_day_overlap() {
        let a = WeeklyWindow::from_day(1, 8 * 60, 120);
        let b = WeeklyWindow::from_day(1, 9 * 60, 60);
        let c = WeeklyWindow::from_day(1, 10 * 60, 60);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c), "touching windows must not overlap");
    }

    #[test]
    fn test_different_days_do_not_overlap() {
        let monday = WeeklyWindow::from_day(1, 8 * 60, 120);
        let tuesday = WeeklyWindow::from_day(2, 8 * 60, 120);
        assert!(!monday.overlaps(&tuesday));
    }

    #[test]
    fn test_window_spilling_past_midnight() {
        let late = WeeklyWindow::from_day(2, 22 * 60, 240);
        let early_next = WeeklyWindow::from_day(3, 60, 60);
        assert!(late.spans_midnight());
        assert!(late.overlaps(&early_next));
        assert_eq!(late.end_day(), 3);
    }

    #[test]
    fn test_saturday_wraps_into_sunday() {
        let saturday_night = WeeklyWindow::from_day(6, 23 * 60, 180);
        let sunday_morning = WeeklyWindow::from_day(0, 30, 30);
        assert!(saturday_night.overlaps(&sunday_morning));
        assert!(sunday_morning.overlaps(&saturday_night));
        assert_eq!(saturday_night.end_day(), 0);
    }

    #[test]
    fn test_negative_offset_reaches_previous_day() {
        // Pre-flight services starting before midnight of a Sunday departure.
        let window = WeeklyWindow::from_day(0, -30, 90);
        assert_eq!(window.start_day(), 6);
        assert_eq!(window.start_time(), TimeOfDay::hm(23, 30).unwrap());
        let segments = window.day_segments();
        assert_eq!(segments, vec![(6, 1410, 1440), (0, 0, 60)]);
    }

    #[test]
    fn test_week_long_window_overlaps_everything() {
        let heavy = WeeklyWindow::from_day(3, 0, 14 * MINUTES_PER_DAY);
        let any = WeeklyWindow::from_day(5, 600, 10);
        assert!(heavy.overlaps(&any));
        assert_eq!(heavy.day_segments().len(), 7);
    }
}
