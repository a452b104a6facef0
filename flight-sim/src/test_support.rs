//! A small world with one airline, one aircraft and one route, shared by the
//! unit tests of the services.

use chrono::NaiveDateTime;
use logger::Logger;
use persistence::{
    Aircraft, Airport, CabinPrices, MemoryStore, Membership, RetryPolicy, Route, Store, World,
};
use std::sync::Arc;
use std::time::Duration;
use timetable::SizeCategory;

use crate::maintenance::MaintenanceEngine;
use crate::scheduling::FlightScheduler;
use crate::types::config::MaintenancePolicy;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub world: World,
    pub membership: Membership,
    pub aircraft: Aircraft,
    pub route: Route,
}

impl Fixture {
    /// The world starts on Monday 2024-01-01 at midnight.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let start = Self::game_time("2024-01-01 00:00");
        let world = World::new("Test", 60.0, start);
        store.insert_world(&world).unwrap();
        for airport in [
            Airport::new("AEP", "AR", "Aeroparque Jorge Newbery", -34.5592, -58.4156),
            Airport::new("COR", "AR", "Ingeniero Ambrosio Taravella", -31.3236, -64.2080),
            Airport::new("VCV", "US", "Southern California Logistics", 34.5975, -117.3831),
        ] {
            store.insert_airport(&airport).unwrap();
        }

        let membership = Membership::new(world.id, "Aerolineas Test", 10_000_000.0);
        store.insert_membership(&membership).unwrap();
        let aircraft = Aircraft::new(&membership, "LV-ABC", SizeCategory::NarrowBody, 170, 830.0, "AEP")
            .with_checks_at(start);
        store.insert_aircraft(&aircraft).unwrap();
        let route = Route::new(
            &membership,
            "AEP",
            "COR",
            650.0,
            CabinPrices {
                economy: 120.0,
                premium: 220.0,
                business: 400.0,
                first: 800.0,
            },
        );
        store.save_route(&route).unwrap();

        Fixture {
            store,
            world,
            membership,
            aircraft,
            route,
        }
    }

    pub fn game_time(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").unwrap()
    }

    pub fn quick_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    pub fn maintenance(&self) -> Arc<MaintenanceEngine> {
        let policy = MaintenancePolicy {
            fleet_refresh_delay: Duration::ZERO,
            ..Default::default()
        };
        Arc::new(MaintenanceEngine::new(
            self.store.clone(),
            Logger::silent(),
            policy,
            Self::quick_retry(),
        ))
    }

    pub fn scheduler(&self) -> FlightScheduler {
        FlightScheduler::new(self.store.clone(), self.maintenance(), Logger::silent())
    }
}
