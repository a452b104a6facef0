use chrono::{Datelike, Duration, NaiveDateTime};
use logger::Logger;
use persistence::{Aircraft, AircraftStatus, Route, RouteId, Store, WorldId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::types::economics::{DemandProvider, EconomicsProvider, RevenueRates};
use crate::types::sim_error::SimError;

const MIN_LOAD_FACTOR: f64 = 0.15;
const MAX_LOAD_FACTOR: f64 = 0.98;
const JITTER: f64 = 0.10;
const PENALTY_PER_COMPETITOR: f64 = 0.08;
const MAX_COMPETITION_PENALTY: f64 = 0.40;

/// Share of passengers in economy, premium, business and first.
const CABIN_MIX: [f64; 4] = [0.75, 0.12, 0.10, 0.03];

/// `baseline × demand factor × (1 − competition) × (1 + jitter)`, clamped.
pub fn load_factor(baseline: f64, demand: f64, competitors: usize, jitter: f64) -> f64 {
    let demand_factor = 0.6 + 0.8 * demand.clamp(0.0, 100.0) / 100.0;
    let penalty = (PENALTY_PER_COMPETITOR * competitors as f64).min(MAX_COMPETITION_PENALTY);
    let jitter = jitter.clamp(-JITTER, JITTER);
    (baseline * demand_factor * (1.0 - penalty) * (1.0 + jitter)).clamp(MIN_LOAD_FACTOR, MAX_LOAD_FACTOR)
}

/// Money and people moved by one round trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripEconomics {
    pub load_factor: f64,
    pub passengers: u32,
    pub revenue: f64,
    pub costs: f64,
    /// Out and back at cruise speed.
    pub block_hours: f64,
}

impl TripEconomics {
    pub fn profit(&self) -> f64 {
        self.revenue - self.costs
    }
}

pub fn settle_trip(
    route: &Route,
    aircraft: &Aircraft,
    load_factor: f64,
    fuel_multiplier: f64,
    rates: &RevenueRates,
) -> TripEconomics {
    let passengers = (aircraft.seats as f64 * load_factor).round() as u32;
    let prices = &route.prices;
    let weighted_price = CABIN_MIX[0] * prices.economy
        + CABIN_MIX[1] * prices.premium
        + CABIN_MIX[2] * prices.business
        + CABIN_MIX[3] * prices.first;
    let revenue = weighted_price * passengers as f64 + route.distance_km * rates.cargo_per_km;

    let block_hours = if aircraft.cruise_speed_kmh > 0.0 {
        2.0 * route.distance_km / aircraft.cruise_speed_kmh
    } else {
        0.0
    };
    let fuel = route.distance_km * rates.fuel_per_km * fuel_multiplier;
    let crew = route.distance_km * rates.crew_per_km;
    let upkeep = route.distance_km * rates.maintenance_per_km;
    let fees = rates.airport_fee_fixed + rates.airport_fee_per_seat * aircraft.seats as f64;

    TripEconomics {
        load_factor,
        passengers,
        revenue,
        costs: fuel + crew + upkeep + fees,
        block_hours,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RevenueOutcome {
    Posted(TripEconomics),
    /// The route already has revenue for this game day.
    AlreadyPosted,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevenuePassReport {
    pub posted: Vec<(RouteId, TripEconomics)>,
    pub already_posted: usize,
    pub failed: usize,
}

pub struct RevenueResolver {
    store: Arc<dyn Store>,
    economics: Arc<dyn EconomicsProvider>,
    demand: Arc<dyn DemandProvider>,
    rates: RevenueRates,
    rng: Mutex<StdRng>,
    logger: Logger,
}

impl RevenueResolver {
    pub fn new(
        store: Arc<dyn Store>,
        economics: Arc<dyn EconomicsProvider>,
        demand: Arc<dyn DemandProvider>,
        rates: RevenueRates,
        logger: Logger,
    ) -> Self {
        RevenueResolver {
            store,
            economics,
            demand,
            rates,
            rng: Mutex::new(StdRng::from_entropy()),
            logger,
        }
    }

    /// Replaces the entropy-seeded generator with a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Posts one completed round trip of `route`. The route record carries
    /// the game day it last posted revenue, and is written before the
    /// balance, so a second call on the same game day is a no-op.
    pub fn resolve_route(
        &self,
        route_id: RouteId,
        aircraft_id: Uuid,
        now: NaiveDateTime,
    ) -> Result<RevenueOutcome, SimError> {
        let today = now.date();
        let mut route = self.store.get_route(route_id)?;
        if route.stats.last_revenue_game_day == Some(today) {
            return Ok(RevenueOutcome::AlreadyPosted);
        }
        let aircraft = self.store.get_aircraft(aircraft_id)?;

        let year = now.year();
        let demand = self.demand.demand(&route.origin, &route.destination, year);
        let competitors = self.store.count_competing_routes(
            route.world_id,
            &route.origin,
            &route.destination,
            route.membership_id,
        )?;
        let jitter = self.rng.lock()?.gen_range(-JITTER..=JITTER);
        let lf = load_factor(self.economics.load_factor_baseline(year), demand, competitors, jitter);
        let trip = settle_trip(&route, &aircraft, lf, self.economics.fuel_multiplier(year), &self.rates);

        let stats = &mut route.stats;
        stats.average_load_factor = (stats.average_load_factor * stats.total_flights as f64 + lf)
            / (stats.total_flights + 1) as f64;
        stats.total_flights += 1;
        stats.total_revenue += trip.revenue;
        stats.total_costs += trip.costs;
        stats.total_passengers += trip.passengers as u64;
        stats.last_revenue_game_day = Some(today);
        self.store.save_route(&route)?;

        self.store.adjust_balance(route.membership_id, trip.profit())?;
        self.store.update_aircraft(aircraft.id, &mut |a| {
            a.flight_hours += trip.block_hours;
            Ok(())
        })?;

        self.logger.info(
            "revenue",
            &format!(
                "{}-{} on {}: {} pax ({:.0}%), profit {:.2}",
                route.origin,
                route.destination,
                today,
                trip.passengers,
                lf * 100.0,
                trip.profit()
            ),
        );
        Ok(RevenueOutcome::Posted(trip))
    }

    /// Posts revenue for every active template whose latest round trip has
    /// landed today, or landed yesterday and was never posted. Aircraft that
    /// are not active fly nothing and earn nothing.
    pub fn resolve_due(&self, world: WorldId, now: NaiveDateTime) -> Result<RevenuePassReport, SimError> {
        let today = now.date();
        let mut report = RevenuePassReport::default();

        for template in self.store.list_active_templates(world)? {
            let Some(trip) = template.last_completed(now) else {
                continue;
            };
            if trip.arrival_date < today - Duration::days(1) {
                continue;
            }
            let route = match self.store.get_route(template.route_id) {
                Ok(route) => route,
                Err(e) => {
                    report.failed += 1;
                    self.logger.error("revenue", &format!("Route {}: {}", template.route_id, e));
                    continue;
                }
            };
            let last_posted = route.stats.last_revenue_game_day;
            if last_posted == Some(today) {
                report.already_posted += 1;
                continue;
            }
            if trip.arrival_date < today && last_posted.map_or(false, |day| day >= trip.arrival_date) {
                continue;
            }
            match self.store.get_aircraft(template.aircraft_id) {
                Ok(aircraft) if aircraft.status == AircraftStatus::Active => {}
                Ok(_) => continue,
                Err(e) => {
                    report.failed += 1;
                    self.logger.error("revenue", &format!("Aircraft {}: {}", template.aircraft_id, e));
                    continue;
                }
            }

            match self.resolve_route(route.id, template.aircraft_id, now) {
                Ok(RevenueOutcome::Posted(economics)) => report.posted.push((route.id, economics)),
                Ok(RevenueOutcome::AlreadyPosted) => report.already_posted += 1,
                Err(e) => {
                    report.failed += 1;
                    self.logger.error(
                        "revenue",
                        &format!("Revenue for route {} failed: {}", route.id, e),
                    );
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::ScheduleOutcome;
    use crate::test_support::Fixture;
    use crate::types::economics::{EraTable, StaticDemand};
    use persistence::{HeavyCheck, Membership};
    use timetable::{CheckType, TimeOfDay};

    fn resolver(fx: &Fixture) -> RevenueResolver {
        RevenueResolver::new(
            fx.store.clone(),
            Arc::new(EraTable),
            Arc::new(StaticDemand::default()),
            RevenueRates::default(),
            Logger::silent(),
        )
        .with_seed(7)
    }

    #[test]
    fn test_load_factor_formula_and_clamp() {
        // 0.73 × (0.6 + 0.4) × (1 − 0.16)
        let lf = load_factor(0.73, 50.0, 2, 0.0);
        assert!((lf - 0.73 * 0.84).abs() < 1e-9);
        assert_eq!(load_factor(0.95, 100.0, 0, 0.1), MAX_LOAD_FACTOR);
        assert_eq!(load_factor(0.30, 0.0, 9, -0.1), MIN_LOAD_FACTOR);
        // The competition penalty stops at 40 %.
        assert_eq!(load_factor(0.5, 50.0, 5, 0.0), load_factor(0.5, 50.0, 12, 0.0));
    }

    #[test]
    fn test_settle_trip_amounts() {
        let fx = Fixture::new();
        let trip = settle_trip(&fx.route, &fx.aircraft, 0.5, 1.3, &RevenueRates::default());
        assert_eq!(trip.passengers, 85);
        assert!((trip.revenue - (180.4 * 85.0 + 650.0 * 0.9)).abs() < 1e-6);
        let hours = 2.0 * 650.0 / 830.0;
        let costs = 650.0 * 6.0 * 1.3 + 650.0 * 2.2 + 650.0 * 1.2 + 400.0 + 4.5 * 170.0;
        assert!((trip.costs - costs).abs() < 1e-6);
        assert!((trip.block_hours - hours).abs() < 1e-9);
    }

    #[test]
    fn test_same_route_same_day_posts_once() {
        let fx = Fixture::new();
        let resolver = resolver(&fx);
        let now = Fixture::game_time("2024-01-01 12:00");

        let first = resolver.resolve_route(fx.route.id, fx.aircraft.id, now).unwrap();
        let RevenueOutcome::Posted(trip) = first else {
            panic!("expected the first call to post");
        };
        let balance = fx.store.get_membership(fx.membership.id).unwrap().balance;
        assert!((balance - (10_000_000.0 + trip.profit())).abs() < 1e-6);

        let second = resolver
            .resolve_route(fx.route.id, fx.aircraft.id, now + Duration::hours(3))
            .unwrap();
        assert_eq!(second, RevenueOutcome::AlreadyPosted);
        assert_eq!(fx.store.get_membership(fx.membership.id).unwrap().balance, balance);

        let route = fx.store.get_route(fx.route.id).unwrap();
        assert_eq!(route.stats.total_flights, 1);
        assert_eq!(route.stats.last_revenue_game_day, Some(now.date()));
        let aircraft = fx.store.get_aircraft(fx.aircraft.id).unwrap();
        assert!((aircraft.flight_hours - trip.block_hours).abs() < 1e-9);
    }

    #[test]
    fn test_posting_leaves_maintenance_state_alone() {
        let fx = Fixture::new();
        let resolver = resolver(&fx);
        let now = Fixture::game_time("2024-01-01 12:00");
        let heavy = HeavyCheck {
            check_type: CheckType::C,
            started_at: now - Duration::hours(1),
        };
        fx.store
            .update_aircraft(fx.aircraft.id, &mut |a| {
                a.status = AircraftStatus::Maintenance;
                a.heavy_check = Some(heavy);
                Ok(())
            })
            .unwrap();

        let RevenueOutcome::Posted(trip) = resolver.resolve_route(fx.route.id, fx.aircraft.id, now).unwrap() else {
            panic!("expected the trip to post");
        };
        let stored = fx.store.get_aircraft(fx.aircraft.id).unwrap();
        assert_eq!(stored.status, AircraftStatus::Maintenance);
        assert_eq!(stored.heavy_check, Some(heavy));
        assert!((stored.flight_hours - trip.block_hours).abs() < 1e-9);
    }

    #[test]
    fn test_competing_airline_lowers_load_factor() {
        let now = Fixture::game_time("2024-01-01 12:00");
        let alone = Fixture::new();
        let RevenueOutcome::Posted(alone_trip) = resolver(&alone)
            .resolve_route(alone.route.id, alone.aircraft.id, now)
            .unwrap()
        else {
            panic!("expected a posting");
        };

        let contested = Fixture::new();
        let rival = Membership::new(contested.world.id, "Rival", 0.0);
        contested.store.insert_membership(&rival).unwrap();
        // Flown in the opposite direction, it still competes.
        let rival_route = Route::new(&rival, "COR", "AEP", 650.0, contested.route.prices);
        contested.store.save_route(&rival_route).unwrap();
        let RevenueOutcome::Posted(contested_trip) = resolver(&contested)
            .resolve_route(contested.route.id, contested.aircraft.id, now)
            .unwrap()
        else {
            panic!("expected a posting");
        };

        let expected = alone_trip.load_factor * (1.0 - PENALTY_PER_COMPETITOR);
        assert!((contested_trip.load_factor - expected).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_due_posts_after_arrival_only() {
        let fx = Fixture::new();
        let departure = TimeOfDay::parse("08:00").unwrap();
        let outcome = fx
            .scheduler()
            .schedule_template(fx.route.id, fx.aircraft.id, 1, departure, 120)
            .unwrap();
        assert!(matches!(outcome, ScheduleOutcome::Scheduled(_)));
        let resolver = resolver(&fx);

        let airborne = Fixture::game_time("2024-01-01 09:00");
        assert!(resolver.resolve_due(fx.world.id, airborne).unwrap().posted.is_empty());

        let landed = Fixture::game_time("2024-01-01 10:30");
        let report = resolver.resolve_due(fx.world.id, landed).unwrap();
        assert_eq!(report.posted.len(), 1);

        let later = Fixture::game_time("2024-01-01 18:00");
        let report = resolver.resolve_due(fx.world.id, later).unwrap();
        assert!(report.posted.is_empty());
        assert_eq!(report.already_posted, 1);
    }

    #[test]
    fn test_resolve_due_skips_grounded_aircraft() {
        let fx = Fixture::new();
        fx.scheduler()
            .schedule_template(fx.route.id, fx.aircraft.id, 1, TimeOfDay::parse("08:00").unwrap(), 120)
            .unwrap();
        let mut aircraft = fx.store.get_aircraft(fx.aircraft.id).unwrap();
        aircraft.status = AircraftStatus::Maintenance;
        fx.store.save_aircraft(&aircraft).unwrap();

        let report = resolver(&fx)
            .resolve_due(fx.world.id, Fixture::game_time("2024-01-01 11:00"))
            .unwrap();
        assert!(report.posted.is_empty());
        assert!(fx.store.get_route(fx.route.id).unwrap().stats.last_revenue_game_day.is_none());
    }
}
