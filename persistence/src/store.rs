use chrono::NaiveDate;
use timetable::{FlightTemplate, MaintenancePattern};
use uuid::Uuid;

use crate::airport::Airport;
use crate::errors::StoreError;
use crate::model::{
    Aircraft, AircraftId, AircraftStatus, Membership, MembershipId, Route, RouteId, World,
    WorldId, WorldStatus,
};

/// Structured reads and writes of the simulation entities.
///
/// Every call is independent; there are no transactions. Callers that need
/// a write to happen at most once must make that write carry its own marker
/// (see `RouteStats::last_revenue_game_day`).
pub trait Store: Send + Sync {
    fn insert_world(&self, world: &World) -> Result<(), StoreError>;
    fn get_world(&self, id: WorldId) -> Result<World, StoreError>;
    fn list_worlds(&self, status: Option<WorldStatus>) -> Result<Vec<World>, StoreError>;
    /// Writes the clock fields (time, last tick, pause flag, status) only.
    /// The job markers are left as they are.
    fn save_world_clock(&self, world: &World) -> Result<(), StoreError>;
    fn set_maintenance_marker(&self, id: WorldId, day: NaiveDate) -> Result<(), StoreError>;
    fn set_month_marker(&self, id: WorldId, month: &str) -> Result<(), StoreError>;

    fn insert_airport(&self, airport: &Airport) -> Result<(), StoreError>;
    fn get_airport(&self, iata_code: &str) -> Result<Airport, StoreError>;
    fn list_airports(&self) -> Result<Vec<Airport>, StoreError>;

    fn insert_membership(&self, membership: &Membership) -> Result<(), StoreError>;
    fn get_membership(&self, id: MembershipId) -> Result<Membership, StoreError>;
    fn list_memberships(&self, world: WorldId) -> Result<Vec<Membership>, StoreError>;
    /// Adds `delta` to the balance and returns the new balance.
    fn adjust_balance(&self, id: MembershipId, delta: f64) -> Result<f64, StoreError>;

    fn insert_aircraft(&self, aircraft: &Aircraft) -> Result<(), StoreError>;
    /// Replaces the whole record. Background passes use `update_aircraft`
    /// instead, so their writes never undo each other's.
    fn save_aircraft(&self, aircraft: &Aircraft) -> Result<(), StoreError>;
    /// Runs `change` on the current record and stores the result in one
    /// atomic step, returning the updated aircraft. When `change` fails
    /// nothing is written. Fields `change` does not touch keep whatever
    /// other writers stored.
    fn update_aircraft(
        &self,
        id: AircraftId,
        change: &mut dyn FnMut(&mut Aircraft) -> Result<(), StoreError>,
    ) -> Result<Aircraft, StoreError>;
    fn get_aircraft(&self, id: AircraftId) -> Result<Aircraft, StoreError>;
    fn list_aircraft(
        &self,
        world: WorldId,
        status: Option<AircraftStatus>,
    ) -> Result<Vec<Aircraft>, StoreError>;
    fn delete_aircraft(&self, id: AircraftId) -> Result<(), StoreError>;

    /// Inserts or replaces the whole route record, aggregates included.
    fn save_route(&self, route: &Route) -> Result<(), StoreError>;
    fn get_route(&self, id: RouteId) -> Result<Route, StoreError>;
    fn list_routes(&self, world: WorldId) -> Result<Vec<Route>, StoreError>;
    /// Routes of other airlines in `world` flying the same airport pair,
    /// in either direction.
    fn count_competing_routes(
        &self,
        world: WorldId,
        origin: &str,
        destination: &str,
        excluding: MembershipId,
    ) -> Result<usize, StoreError>;

    /// Fails with `DuplicateTemplate` when an active template of the same
    /// aircraft already departs on that day at that time.
    fn insert_template(&self, template: &FlightTemplate) -> Result<(), StoreError>;
    fn save_template(&self, template: &FlightTemplate) -> Result<(), StoreError>;
    fn get_template(&self, id: Uuid) -> Result<FlightTemplate, StoreError>;
    fn list_templates_for_aircraft(
        &self,
        aircraft: AircraftId,
    ) -> Result<Vec<FlightTemplate>, StoreError>;
    fn list_active_templates(&self, world: WorldId) -> Result<Vec<FlightTemplate>, StoreError>;

    fn insert_pattern(&self, pattern: &MaintenancePattern) -> Result<(), StoreError>;
    fn save_pattern(&self, pattern: &MaintenancePattern) -> Result<(), StoreError>;
    fn list_patterns(&self, aircraft: AircraftId) -> Result<Vec<MaintenancePattern>, StoreError>;
    fn list_world_patterns(&self, world: WorldId) -> Result<Vec<MaintenancePattern>, StoreError>;
    fn delete_patterns(&self, aircraft: AircraftId) -> Result<usize, StoreError>;
    /// Drops the aircraft's auto-generated daily and weekly patterns and
    /// inserts `patterns` in their place, in one write.
    fn replace_auto_patterns(
        &self,
        aircraft: AircraftId,
        patterns: &[MaintenancePattern],
    ) -> Result<(), StoreError>;
}
