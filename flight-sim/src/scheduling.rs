use chrono::NaiveDateTime;
use logger::Logger;
use persistence::{Aircraft, AircraftId, Route, Store, StoreError, WorldId};
use std::sync::Arc;
use timetable::time_of_day::validate_day;
use timetable::{
    active_occurrences, day_name, find_flight_conflict, find_maintenance_conflict, BookedWindow,
    FlightTemplate, GroundOps, GroundOpsProfile, Occurrence, Recurrence, ScheduleConflict,
    TimeOfDay, MINUTES_PER_WEEK,
};
use uuid::Uuid;

use crate::maintenance::MaintenanceEngine;
use crate::types::sim_error::SimError;

/// Ground services for `aircraft` flying `route`.
pub fn ground_ops_for(aircraft: &Aircraft, route: &Route) -> GroundOps {
    GroundOps::for_profile(&GroundOpsProfile {
        category: aircraft.category,
        seats: aircraft.seats,
        distance_km: route.distance_km,
    })
}

/// Ground-operations windows of every active template of an aircraft.
pub fn booked_windows(
    store: &dyn Store,
    aircraft_id: AircraftId,
) -> Result<Vec<BookedWindow>, StoreError> {
    let aircraft = store.get_aircraft(aircraft_id)?;
    let mut booked = Vec::new();
    for template in store.list_templates_for_aircraft(aircraft_id)? {
        if !template.is_active {
            continue;
        }
        let route = store.get_route(template.route_id)?;
        let window = template.ground_window(ground_ops_for(&aircraft, &route));
        booked.push(BookedWindow { template, window });
    }
    Ok(booked)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    Scheduled(FlightTemplate),
    Rejected(ScheduleConflict),
}

/// Creates and retires weekly flight templates and answers what is in the
/// air.
pub struct FlightScheduler {
    store: Arc<dyn Store>,
    maintenance: Arc<MaintenanceEngine>,
    logger: Logger,
}

impl FlightScheduler {
    pub fn new(store: Arc<dyn Store>, maintenance: Arc<MaintenanceEngine>, logger: Logger) -> Self {
        FlightScheduler {
            store,
            maintenance,
            logger,
        }
    }

    /// Validates a new template against the aircraft's other flights and its
    /// hand-made maintenance, stores it, and re-plans the aircraft's
    /// automatic checks around it.
    pub fn schedule_template(
        &self,
        route_id: Uuid,
        aircraft_id: AircraftId,
        day_of_week: u8,
        departure_time: TimeOfDay,
        total_duration_minutes: i64,
    ) -> Result<ScheduleOutcome, SimError> {
        validate_day(day_of_week)?;
        if total_duration_minutes <= 0 || total_duration_minutes >= MINUTES_PER_WEEK {
            return Err(SimError::InvalidInput(format!(
                "trip duration must be between 1 minute and a week, got {}",
                total_duration_minutes
            )));
        }
        let aircraft = self.store.get_aircraft(aircraft_id)?;
        let route = self.store.get_route(route_id)?;
        if aircraft.membership_id != route.membership_id {
            return Err(SimError::InvalidInput(
                "route and aircraft belong to different airlines".to_string(),
            ));
        }

        let template = FlightTemplate::new(
            route_id,
            aircraft_id,
            day_of_week,
            departure_time,
            total_duration_minutes,
        );
        if let Some(conflict) = self.find_conflict(&template, &aircraft, &route)? {
            self.logger.info(
                "scheduler",
                &format!("Rejected {} {} on {}: {}", aircraft.registration, day_name(day_of_week), departure_time, conflict),
            );
            return Ok(ScheduleOutcome::Rejected(conflict));
        }

        self.store.insert_template(&template)?;
        self.logger.info(
            "scheduler",
            &format!(
                "Scheduled {} {}-{} every {} at {}",
                aircraft.registration,
                route.origin,
                route.destination,
                day_name(day_of_week),
                departure_time
            ),
        );
        self.refresh_maintenance(aircraft_id);
        Ok(ScheduleOutcome::Scheduled(template))
    }

    /// First conflict the candidate would cause, if any.
    pub fn find_conflict(
        &self,
        candidate: &FlightTemplate,
        aircraft: &Aircraft,
        route: &Route,
    ) -> Result<Option<ScheduleConflict>, SimError> {
        let window = candidate.ground_window(ground_ops_for(aircraft, route));
        let booked = booked_windows(self.store.as_ref(), aircraft.id)?;
        if let Some(conflict) = find_flight_conflict(candidate.id, &window, &booked) {
            return Ok(Some(ScheduleConflict::Flight(conflict)));
        }

        // Automatic checks are re-planned around the new flight, so only
        // hand-made recurring patterns can block it.
        let manual: Vec<_> = self
            .store
            .list_patterns(aircraft.id)?
            .into_iter()
            .filter(|p| !p.auto_generated && matches!(p.recurrence, Recurrence::Weekly { .. }))
            .collect();
        Ok(find_maintenance_conflict(&window, &manual).map(ScheduleConflict::Maintenance))
    }

    pub fn deactivate_template(&self, template_id: Uuid) -> Result<FlightTemplate, SimError> {
        let mut template = self.store.get_template(template_id)?;
        if !template.is_active {
            return Ok(template);
        }
        template.is_active = false;
        self.store.save_template(&template)?;
        self.logger.info("scheduler", &format!("Deactivated template {}", template_id));
        self.refresh_maintenance(template.aircraft_id);
        Ok(template)
    }

    /// Occurrences of the world's active templates airborne at `now`.
    pub fn in_flight(&self, world: WorldId, now: NaiveDateTime) -> Result<Vec<Occurrence>, SimError> {
        let templates = self.store.list_active_templates(world)?;
        Ok(active_occurrences(&templates, now))
    }

    /// Most recent occurrence of `template` that has landed by `now`.
    pub fn last_completed_arrival(
        &self,
        template: &FlightTemplate,
        now: NaiveDateTime,
    ) -> Option<Occurrence> {
        template.last_completed(now)
    }

    fn refresh_maintenance(&self, aircraft_id: AircraftId) {
        if let Err(e) = self.maintenance.refresh_auto_schedule(aircraft_id) {
            self.logger.warn(
                "scheduler",
                &format!("Could not re-plan maintenance of {}: {}", aircraft_id, e),
            );
        }
    }
}
