use chrono::{Duration, NaiveDate, NaiveDateTime};
use logger::Logger;
use persistence::{
    Aircraft, AircraftId, AircraftStatus, HeavyCheck, RetryPolicy, Store, StoreError, WorldId,
};
use std::sync::Arc;
use std::thread;
use timetable::{
    check_expiry, check_status, day_name, expand_blocks, find_flight_conflict,
    plan_routine_checks, CheckStatus, CheckType, MaintenanceBlock, MaintenancePattern,
    PatternStatus, Recurrence, RoutinePlan, ScheduleConflict, TimeOfDay, WeeklyWindow,
    MINUTES_PER_DAY,
};

use crate::scheduling::booked_windows;
use crate::types::config::MaintenancePolicy;
use crate::types::sim_error::SimError;

/// Stamps `tier` and every tier below it. A-checks and above also reset the
/// hours counted towards the next A-check.
pub fn apply_check(aircraft: &mut Aircraft, tier: CheckType, at: NaiveDateTime) {
    aircraft.checks.stamp(tier, at);
    for lower in tier.subsumed() {
        aircraft.checks.stamp(lower, at);
    }
    if tier >= CheckType::A {
        aircraft.a_check_hours = aircraft.flight_hours;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub check_type: CheckType,
    pub status: CheckStatus,
    pub last_performed: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

/// Validity of every tier of `aircraft` at `now`.
pub fn check_statuses(aircraft: &Aircraft, now: NaiveDateTime) -> Vec<CheckReport> {
    CheckType::ALL
        .iter()
        .map(|tier| {
            let last = aircraft.checks.last(*tier);
            let interval = aircraft.intervals.days(*tier);
            CheckReport {
                check_type: *tier,
                status: check_status(last, interval, now),
                last_performed: last,
                expires_at: last.map(|at| check_expiry(at, interval)),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternOutcome {
    Scheduled(MaintenancePattern),
    Rejected(ScheduleConflict),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetRefresh {
    pub refreshed: usize,
    pub failed: Vec<AircraftId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenancePassReport {
    pub checks_recorded: usize,
    pub heavy_started: Vec<(AircraftId, CheckType)>,
    pub heavy_finished: Vec<AircraftId>,
    /// Whether the once-per-game-day heavy check review ran.
    pub daily_review: bool,
}

pub struct MaintenanceEngine {
    store: Arc<dyn Store>,
    logger: Logger,
    policy: MaintenancePolicy,
    retry: RetryPolicy,
}

impl MaintenanceEngine {
    pub fn new(
        store: Arc<dyn Store>,
        logger: Logger,
        policy: MaintenancePolicy,
        retry: RetryPolicy,
    ) -> Self {
        MaintenanceEngine {
            store,
            logger,
            policy,
            retry,
        }
    }

    pub fn policy(&self) -> &MaintenancePolicy {
        &self.policy
    }

    pub fn record_check(
        &self,
        aircraft_id: AircraftId,
        tier: CheckType,
        at: NaiveDateTime,
    ) -> Result<Aircraft, SimError> {
        let aircraft = self.store.update_aircraft(aircraft_id, &mut |a| {
            apply_check(a, tier, at);
            Ok(())
        })?;
        self.logger.info(
            "maintenance",
            &format!("{} check recorded on {} at {}", tier, aircraft.registration, at),
        );
        Ok(aircraft)
    }

    pub fn check_report(
        &self,
        aircraft_id: AircraftId,
        now: NaiveDateTime,
    ) -> Result<Vec<CheckReport>, SimError> {
        Ok(check_statuses(&self.store.get_aircraft(aircraft_id)?, now))
    }

    /// Stores a hand-made pattern unless it overlaps a flight's ground
    /// operations. Routine patterns trigger a re-plan of the automatic ones.
    pub fn schedule_pattern(&self, pattern: MaintenancePattern) -> Result<PatternOutcome, SimError> {
        if pattern.duration_minutes <= 0 {
            return Err(SimError::InvalidDuration(format!(
                "maintenance must last at least a minute, got {}",
                pattern.duration_minutes
            )));
        }
        let aircraft = self.store.get_aircraft(pattern.aircraft_id)?;
        let booked = booked_windows(self.store.as_ref(), aircraft.id)?;
        if let Some(conflict) = find_flight_conflict(pattern.id, &pattern.weekly_window(), &booked) {
            return Ok(PatternOutcome::Rejected(ScheduleConflict::Flight(conflict)));
        }

        self.store.insert_pattern(&pattern)?;
        self.logger.info(
            "maintenance",
            &format!(
                "{} check for {} on {} at {}",
                pattern.check_type,
                aircraft.registration,
                day_name(pattern.day_of_week()),
                pattern.start_time
            ),
        );
        if pattern.check_type.is_routine() && !pattern.auto_generated {
            if let Err(e) = self.refresh_auto_schedule(aircraft.id) {
                self.logger.warn(
                    "maintenance",
                    &format!("Could not re-plan maintenance of {}: {}", aircraft.registration, e),
                );
            }
        }
        Ok(PatternOutcome::Scheduled(pattern))
    }

    /// Calendar blocks of one aircraft between two dates, inclusive.
    pub fn blocks(
        &self,
        aircraft_id: AircraftId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MaintenanceBlock>, SimError> {
        let patterns = self.store.list_patterns(aircraft_id)?;
        Ok(expand_blocks(&patterns, from, to))
    }

    pub fn world_blocks(
        &self,
        world_id: WorldId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MaintenanceBlock>, SimError> {
        let patterns = self.store.list_world_patterns(world_id)?;
        Ok(expand_blocks(&patterns, from, to))
    }

    /// Re-plans the automatic daily and weekly checks of one aircraft around
    /// its flights and hand-made maintenance.
    pub fn refresh_auto_schedule(&self, aircraft_id: AircraftId) -> Result<RoutinePlan, StoreError> {
        let mut busy: Vec<WeeklyWindow> = booked_windows(self.store.as_ref(), aircraft_id)?
            .into_iter()
            .map(|booked| booked.window)
            .collect();
        let manual: Vec<MaintenancePattern> = self
            .store
            .list_patterns(aircraft_id)?
            .into_iter()
            .filter(|p| !p.auto_generated && p.is_active())
            .collect();
        busy.extend(
            manual
                .iter()
                .filter(|p| matches!(p.recurrence, Recurrence::Weekly { .. }))
                .map(|p| p.weekly_window()),
        );

        let plan = plan_routine_checks(
            aircraft_id,
            &busy,
            &manual,
            self.policy.daily_check_minutes,
            self.policy.weekly_check_minutes,
        );
        if !plan.skipped_days.is_empty() {
            let days: Vec<&str> = plan.skipped_days.iter().map(|d| day_name(*d)).collect();
            self.logger.warn(
                "maintenance",
                &format!("No room for a daily check of {} on {}", aircraft_id, days.join(", ")),
            );
        }
        self.store.replace_auto_patterns(aircraft_id, &plan.patterns)?;
        Ok(plan)
    }

    /// Refreshes every aircraft of a world one at a time, retrying transient
    /// store failures and pausing between aircraft.
    pub fn refresh_fleet(&self, world_id: WorldId) -> Result<FleetRefresh, SimError> {
        let fleet = self.retry.run(&self.logger, "list fleet", || {
            self.store.list_aircraft(world_id, None)
        })?;
        let mut report = FleetRefresh::default();
        for (i, aircraft) in fleet.iter().enumerate() {
            if i > 0 && !self.policy.fleet_refresh_delay.is_zero() {
                thread::sleep(self.policy.fleet_refresh_delay);
            }
            let what = format!("refresh maintenance of {}", aircraft.registration);
            match self
                .retry
                .run(&self.logger, &what, || self.refresh_auto_schedule(aircraft.id))
            {
                Ok(_) => report.refreshed += 1,
                Err(_) => report.failed.push(aircraft.id),
            }
        }
        Ok(report)
    }

    /// One maintenance pass over a world at game time `now`.
    ///
    /// Every pass records finished routine checks and releases aircraft whose
    /// heavy check is over. Once per game day it also sends aircraft whose C
    /// or D check is about to expire into heavy maintenance.
    pub fn run_pass(
        &self,
        world_id: WorldId,
        now: NaiveDateTime,
    ) -> Result<MaintenancePassReport, SimError> {
        let world = self.store.get_world(world_id)?;
        let today = now.date();
        let daily_review = world.last_maintenance_day.map_or(true, |day| day < today);
        let mut report = MaintenancePassReport {
            daily_review,
            ..Default::default()
        };

        for aircraft in self.store.list_aircraft(world_id, None)? {
            let registration = aircraft.registration.clone();
            if let Err(e) = self.process_aircraft(aircraft, now, daily_review, &mut report) {
                self.logger.error(
                    "maintenance",
                    &format!("Maintenance pass failed for {}: {}", registration, e),
                );
            }
        }

        if daily_review {
            self.store.set_maintenance_marker(world_id, today)?;
        }
        Ok(report)
    }

    /// Works from the copy listed at the start of the pass but writes only
    /// through `update_aircraft`, so a recall, listing or revenue post that
    /// lands in the meantime is kept.
    fn process_aircraft(
        &self,
        aircraft: Aircraft,
        now: NaiveDateTime,
        daily_review: bool,
        report: &mut MaintenancePassReport,
    ) -> Result<(), SimError> {
        if aircraft.status == AircraftStatus::Maintenance {
            if let Some(heavy) = aircraft.heavy_check {
                if now >= heavy.started_at + Duration::days(self.heavy_days(heavy.check_type)) {
                    self.finish_heavy(&aircraft, heavy, now)?;
                    report.heavy_finished.push(aircraft.id);
                }
            }
            return Ok(());
        }
        if aircraft.status != AircraftStatus::Active {
            return Ok(());
        }

        let mut finished: Vec<(CheckType, NaiveDateTime)> = Vec::new();
        for mut pattern in self.store.list_patterns(aircraft.id)? {
            if !pattern.is_active() || (pattern.auto_generated && pattern.check_type.is_multi_day()) {
                continue;
            }
            if let Some(end) = latest_finished_end(&pattern, now) {
                finished.push((pattern.check_type, end));
                if matches!(pattern.recurrence, Recurrence::Once { .. }) {
                    pattern.status = PatternStatus::Completed;
                    self.store.save_pattern(&pattern)?;
                }
            }
        }

        let mut current = aircraft;
        if !finished.is_empty() {
            let mut recorded = 0;
            current = self.store.update_aircraft(current.id, &mut |a| {
                recorded = 0;
                for (tier, end) in &finished {
                    if a.checks.last(*tier).map_or(true, |last| last < *end) {
                        apply_check(a, *tier, *end);
                        recorded += 1;
                    }
                }
                Ok(())
            })?;
            report.checks_recorded += recorded;
        }

        if daily_review && current.status == AircraftStatus::Active {
            if let Some(tier) = self.heavy_check_due(&current, now) {
                if self.start_heavy(&current, tier, now)? {
                    report.heavy_started.push((current.id, tier));
                }
            }
        }
        Ok(())
    }

    /// D is checked before C; a D check covers the C check too. A tier with
    /// no check on record has no expiry to reach and is never due.
    fn heavy_check_due(&self, aircraft: &Aircraft, now: NaiveDateTime) -> Option<CheckType> {
        let lead = Duration::days(self.policy.heavy_check_lead_days);
        [CheckType::D, CheckType::C].into_iter().find(|tier| {
            aircraft
                .checks
                .last(*tier)
                .map_or(false, |last| {
                    check_expiry(last, aircraft.intervals.days(*tier)) - now <= lead
                })
        })
    }

    /// Grounds the aircraft for a heavy check. Returns false when it is no
    /// longer active by the time the change is applied.
    fn start_heavy(
        &self,
        aircraft: &Aircraft,
        tier: CheckType,
        now: NaiveDateTime,
    ) -> Result<bool, SimError> {
        let grounded = self.store.update_aircraft(aircraft.id, &mut |a| {
            a.require_status(&[AircraftStatus::Active])?;
            a.status = AircraftStatus::Maintenance;
            a.heavy_check = Some(HeavyCheck {
                check_type: tier,
                started_at: now,
            });
            Ok(())
        });
        match grounded {
            Ok(_) => {}
            Err(StoreError::StatusMismatch { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let display = MaintenancePattern::once(
            aircraft.id,
            tier,
            now.date(),
            TimeOfDay::from_naive_time(now.time()),
            self.heavy_days(tier) * MINUTES_PER_DAY,
        )
        .auto();
        self.store.insert_pattern(&display)?;
        self.logger.info(
            "maintenance",
            &format!("{} entered a {} check at {}", aircraft.registration, tier, now),
        );
        Ok(true)
    }

    fn finish_heavy(
        &self,
        aircraft: &Aircraft,
        heavy: HeavyCheck,
        now: NaiveDateTime,
    ) -> Result<(), SimError> {
        self.store.update_aircraft(aircraft.id, &mut |a| {
            a.require_status(&[AircraftStatus::Maintenance])?;
            apply_check(a, heavy.check_type, now);
            a.status = AircraftStatus::Active;
            a.heavy_check = None;
            Ok(())
        })?;

        for mut pattern in self.store.list_patterns(aircraft.id)? {
            let is_display = pattern.auto_generated
                && pattern.check_type == heavy.check_type
                && matches!(pattern.recurrence, Recurrence::Once { .. });
            if is_display && pattern.is_active() {
                pattern.status = PatternStatus::Completed;
                self.store.save_pattern(&pattern)?;
            }
        }
        self.logger.info(
            "maintenance",
            &format!("{} back in service after its {} check", aircraft.registration, heavy.check_type),
        );
        Ok(())
    }

    fn heavy_days(&self, tier: CheckType) -> i64 {
        match tier {
            CheckType::D => self.policy.d_check_days,
            _ => self.policy.c_check_days,
        }
    }
}

/// End of the most recent run of `pattern` that is over by `now`, looking
/// back no further than the pattern's own length in days.
fn latest_finished_end(pattern: &MaintenancePattern, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let today = now.date();
    (0..=pattern.day_span())
        .map(|days_back| today - Duration::days(days_back))
        .filter_map(|date| pattern.start_on(date))
        .map(|start| pattern.end_from(start))
        .find(|end| *end <= now)
}
