use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use timetable::{FlightTemplate, MaintenancePattern};
use uuid::Uuid;

use crate::airport::Airport;
use crate::errors::StoreError;
use crate::model::{
    Aircraft, AircraftId, AircraftStatus, Membership, MembershipId, Route, RouteId, World,
    WorldId, WorldStatus,
};
use crate::store::Store;

#[derive(Default)]
struct Tables {
    worlds: HashMap<WorldId, World>,
    airports: HashMap<String, Airport>,
    memberships: HashMap<MembershipId, Membership>,
    aircraft: HashMap<AircraftId, Aircraft>,
    routes: HashMap<RouteId, Route>,
    templates: HashMap<Uuid, FlightTemplate>,
    patterns: HashMap<Uuid, MaintenancePattern>,
}

impl Tables {
    fn aircraft_in_world(&self, aircraft: AircraftId, world: WorldId) -> bool {
        self.aircraft
            .get(&aircraft)
            .map(|a| a.world_id == world)
            .unwrap_or(false)
    }
}

/// In-process `Store` backed by hash maps behind a single `RwLock`.
///
/// `fail_next(n)` makes the next `n` calls fail with a transient error,
/// whatever they are, which is how the retry paths get exercised.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failures: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, calls: usize) {
        self.failures.store(calls, Ordering::SeqCst);
    }

    /// Number of successful write calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T, StoreError>) -> Result<T, StoreError> {
        self.check_available()?;
        let tables = self.tables.read()?;
        f(&tables)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write()?;
        let result = f(&mut tables)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }
}

impl Store for MemoryStore {
    fn insert_world(&self, world: &World) -> Result<(), StoreError> {
        self.write(|t| {
            t.worlds.insert(world.id, world.clone());
            Ok(())
        })
    }

    fn get_world(&self, id: WorldId) -> Result<World, StoreError> {
        self.read(|t| {
            t.worlds
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("world", id))
        })
    }

    fn list_worlds(&self, status: Option<WorldStatus>) -> Result<Vec<World>, StoreError> {
        self.read(|t| {
            let mut worlds: Vec<World> = t
                .worlds
                .values()
                .filter(|w| status.map_or(true, |s| w.status == s))
                .cloned()
                .collect();
            worlds.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(worlds)
        })
    }

    fn save_world_clock(&self, world: &World) -> Result<(), StoreError> {
        self.write(|t| {
            let stored = t
                .worlds
                .get_mut(&world.id)
                .ok_or_else(|| StoreError::not_found("world", world.id))?;
            stored.current_time = world.current_time;
            stored.last_tick_at = world.last_tick_at;
            stored.is_paused = world.is_paused;
            stored.status = world.status;
            Ok(())
        })
    }

    fn set_maintenance_marker(&self, id: WorldId, day: NaiveDate) -> Result<(), StoreError> {
        self.write(|t| {
            let stored = t
                .worlds
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("world", id))?;
            stored.last_maintenance_day = Some(day);
            Ok(())
        })
    }

    fn set_month_marker(&self, id: WorldId, month: &str) -> Result<(), StoreError> {
        self.write(|t| {
            let stored = t
                .worlds
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("world", id))?;
            stored.last_processed_month = Some(month.to_string());
            Ok(())
        })
    }

    fn insert_airport(&self, airport: &Airport) -> Result<(), StoreError> {
        self.write(|t| {
            t.airports.insert(airport.iata_code.clone(), airport.clone());
            Ok(())
        })
    }

    fn get_airport(&self, iata_code: &str) -> Result<Airport, StoreError> {
        self.read(|t| {
            t.airports
                .get(iata_code)
                .cloned()
                .ok_or_else(|| StoreError::not_found("airport", iata_code))
        })
    }

    fn list_airports(&self) -> Result<Vec<Airport>, StoreError> {
        self.read(|t| {
            let mut airports: Vec<Airport> = t.airports.values().cloned().collect();
            airports.sort_by(|a, b| a.iata_code.cmp(&b.iata_code));
            Ok(airports)
        })
    }

    fn insert_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        self.write(|t| {
            t.memberships.insert(membership.id, membership.clone());
            Ok(())
        })
    }

    fn get_membership(&self, id: MembershipId) -> Result<Membership, StoreError> {
        self.read(|t| {
            t.memberships
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("membership", id))
        })
    }

    fn list_memberships(&self, world: WorldId) -> Result<Vec<Membership>, StoreError> {
        self.read(|t| {
            let mut memberships: Vec<Membership> = t
                .memberships
                .values()
                .filter(|m| m.world_id == world)
                .cloned()
                .collect();
            memberships.sort_by(|a, b| a.airline_name.cmp(&b.airline_name));
            Ok(memberships)
        })
    }

    fn adjust_balance(&self, id: MembershipId, delta: f64) -> Result<f64, StoreError> {
        self.write(|t| {
            let membership = t
                .memberships
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("membership", id))?;
            membership.balance += delta;
            Ok(membership.balance)
        })
    }

    fn insert_aircraft(&self, aircraft: &Aircraft) -> Result<(), StoreError> {
        self.write(|t| {
            t.aircraft.insert(aircraft.id, aircraft.clone());
            Ok(())
        })
    }

    fn save_aircraft(&self, aircraft: &Aircraft) -> Result<(), StoreError> {
        self.write(|t| {
            if !t.aircraft.contains_key(&aircraft.id) {
                return Err(StoreError::not_found("aircraft", aircraft.id));
            }
            t.aircraft.insert(aircraft.id, aircraft.clone());
            Ok(())
        })
    }

    fn update_aircraft(
        &self,
        id: AircraftId,
        change: &mut dyn FnMut(&mut Aircraft) -> Result<(), StoreError>,
    ) -> Result<Aircraft, StoreError> {
        self.write(|t| {
            let stored = t
                .aircraft
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("aircraft", id))?;
            let mut updated = stored.clone();
            change(&mut updated)?;
            *stored = updated.clone();
            Ok(updated)
        })
    }

    fn get_aircraft(&self, id: AircraftId) -> Result<Aircraft, StoreError> {
        self.read(|t| {
            t.aircraft
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("aircraft", id))
        })
    }

    fn list_aircraft(
        &self,
        world: WorldId,
        status: Option<AircraftStatus>,
    ) -> Result<Vec<Aircraft>, StoreError> {
        self.read(|t| {
            let mut fleet: Vec<Aircraft> = t
                .aircraft
                .values()
                .filter(|a| a.world_id == world && status.map_or(true, |s| a.status == s))
                .cloned()
                .collect();
            fleet.sort_by(|a, b| a.registration.cmp(&b.registration));
            Ok(fleet)
        })
    }

    fn delete_aircraft(&self, id: AircraftId) -> Result<(), StoreError> {
        self.write(|t| {
            t.aircraft
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found("aircraft", id))
        })
    }

    fn save_route(&self, route: &Route) -> Result<(), StoreError> {
        self.write(|t| {
            t.routes.insert(route.id, route.clone());
            Ok(())
        })
    }

    fn get_route(&self, id: RouteId) -> Result<Route, StoreError> {
        self.read(|t| {
            t.routes
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("route", id))
        })
    }

    fn list_routes(&self, world: WorldId) -> Result<Vec<Route>, StoreError> {
        self.read(|t| {
            let mut routes: Vec<Route> = t
                .routes
                .values()
                .filter(|r| r.world_id == world)
                .cloned()
                .collect();
            routes.sort_by(|a, b| (&a.origin, &a.destination).cmp(&(&b.origin, &b.destination)));
            Ok(routes)
        })
    }

    fn count_competing_routes(
        &self,
        world: WorldId,
        origin: &str,
        destination: &str,
        excluding: MembershipId,
    ) -> Result<usize, StoreError> {
        self.read(|t| {
            Ok(t.routes
                .values()
                .filter(|r| r.world_id == world && r.membership_id != excluding)
                .filter(|r| {
                    (r.origin == origin && r.destination == destination)
                        || (r.origin == destination && r.destination == origin)
                })
                .count())
        })
    }

    fn insert_template(&self, template: &FlightTemplate) -> Result<(), StoreError> {
        self.write(|t| {
            let duplicate = t.templates.values().any(|existing| {
                existing.is_active
                    && existing.aircraft_id == template.aircraft_id
                    && existing.day_of_week == template.day_of_week
                    && existing.departure_time == template.departure_time
            });
            if duplicate {
                return Err(StoreError::DuplicateTemplate {
                    aircraft_id: template.aircraft_id,
                    day_of_week: template.day_of_week,
                    departure_time: template.departure_time,
                });
            }
            t.templates.insert(template.id, template.clone());
            Ok(())
        })
    }

    fn save_template(&self, template: &FlightTemplate) -> Result<(), StoreError> {
        self.write(|t| {
            if !t.templates.contains_key(&template.id) {
                return Err(StoreError::not_found("template", template.id));
            }
            t.templates.insert(template.id, template.clone());
            Ok(())
        })
    }

    fn get_template(&self, id: Uuid) -> Result<FlightTemplate, StoreError> {
        self.read(|t| {
            t.templates
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("template", id))
        })
    }

    fn list_templates_for_aircraft(
        &self,
        aircraft: AircraftId,
    ) -> Result<Vec<FlightTemplate>, StoreError> {
        self.read(|t| {
            let mut templates: Vec<FlightTemplate> = t
                .templates
                .values()
                .filter(|tpl| tpl.aircraft_id == aircraft)
                .cloned()
                .collect();
            templates.sort_by_key(|tpl| (tpl.day_of_week, tpl.departure_time));
            Ok(templates)
        })
    }

    fn list_active_templates(&self, world: WorldId) -> Result<Vec<FlightTemplate>, StoreError> {
        self.read(|t| {
            let mut templates: Vec<FlightTemplate> = t
                .templates
                .values()
                .filter(|tpl| tpl.is_active && t.aircraft_in_world(tpl.aircraft_id, world))
                .cloned()
                .collect();
            templates.sort_by_key(|tpl| (tpl.day_of_week, tpl.departure_time));
            Ok(templates)
        })
    }

    fn insert_pattern(&self, pattern: &MaintenancePattern) -> Result<(), StoreError> {
        self.write(|t| {
            t.patterns.insert(pattern.id, pattern.clone());
            Ok(())
        })
    }

    fn save_pattern(&self, pattern: &MaintenancePattern) -> Result<(), StoreError> {
        self.write(|t| {
            if !t.patterns.contains_key(&pattern.id) {
                return Err(StoreError::not_found("maintenance pattern", pattern.id));
            }
            t.patterns.insert(pattern.id, pattern.clone());
            Ok(())
        })
    }

    fn list_patterns(&self, aircraft: AircraftId) -> Result<Vec<MaintenancePattern>, StoreError> {
        self.read(|t| {
            let mut patterns: Vec<MaintenancePattern> = t
                .patterns
                .values()
                .filter(|p| p.aircraft_id == aircraft)
                .cloned()
                .collect();
            patterns.sort_by_key(|p| (p.check_type, p.day_of_week(), p.start_time));
            Ok(patterns)
        })
    }

    fn list_world_patterns(&self, world: WorldId) -> Result<Vec<MaintenancePattern>, StoreError> {
        self.read(|t| {
            let mut patterns: Vec<MaintenancePattern> = t
                .patterns
                .values()
                .filter(|p| t.aircraft_in_world(p.aircraft_id, world))
                .cloned()
                .collect();
            patterns.sort_by_key(|p| (p.aircraft_id, p.check_type, p.day_of_week(), p.start_time));
            Ok(patterns)
        })
    }

    fn delete_patterns(&self, aircraft: AircraftId) -> Result<usize, StoreError> {
        self.write(|t| {
            let before = t.patterns.len();
            t.patterns.retain(|_, p| p.aircraft_id != aircraft);
            Ok(before - t.patterns.len())
        })
    }

    fn replace_auto_patterns(
        &self,
        aircraft: AircraftId,
        patterns: &[MaintenancePattern],
    ) -> Result<(), StoreError> {
        self.write(|t| {
            t.patterns.retain(|_, p| {
                !(p.aircraft_id == aircraft && p.auto_generated && p.check_type.is_routine())
            });
            for pattern in patterns {
                t.patterns.insert(pattern.id, pattern.clone());
            }
            Ok(())
        })
    }
}
