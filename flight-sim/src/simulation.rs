use chrono::NaiveDateTime;
use logger::Logger;
use persistence::{
    Aircraft, Airport, CabinPrices, Membership, Route, RetryPolicy, Store, WorldId,
};
use std::sync::Arc;
use timetable::{SizeCategory, TimeOfDay};

use crate::clock::registry::WorldRegistry;
use crate::clock::{ClockSettings, RealClock};
use crate::jobs::{run_ai_pass, AiDecisionMaker, JobKind, JobScheduler, WorldPassJob};
use crate::lifecycle::AircraftLifecycle;
use crate::maintenance::MaintenanceEngine;
use crate::revenue::RevenueResolver;
use crate::scheduling::{FlightScheduler, ScheduleOutcome};
use crate::types::config::SimConfig;
use crate::types::economics::{EraTable, RevenueRates, StaticDemand};
use crate::types::notification::NotificationSink;
use crate::types::sim_error::SimError;

const JOB_WORKERS: usize = 4;

/// Every service of the simulator, wired to one store, one notification
/// sink and one job scheduler.
pub struct Simulation {
    pub store: Arc<dyn Store>,
    pub registry: Arc<WorldRegistry>,
    pub scheduler: Arc<FlightScheduler>,
    pub maintenance: Arc<MaintenanceEngine>,
    pub revenue: Arc<RevenueResolver>,
    pub lifecycle: Arc<AircraftLifecycle>,
    pub jobs: Arc<JobScheduler>,
    logger: Logger,
}

/// What `load_demo_data` created.
#[derive(Debug, Clone)]
pub struct DemoData {
    pub membership: Membership,
    pub aircraft: Vec<Aircraft>,
    pub routes: Vec<Route>,
    pub templates: usize,
}

impl Simulation {
    pub fn new(
        config: &SimConfig,
        store: Arc<dyn Store>,
        real_clock: Arc<dyn RealClock>,
        sink: Arc<dyn NotificationSink>,
        ai: Arc<dyn AiDecisionMaker>,
        logger: Logger,
    ) -> Self {
        let retry = RetryPolicy::new(config.retry_attempts, config.retry_backoff);
        let registry = Arc::new(WorldRegistry::new(
            Arc::clone(&store),
            real_clock,
            Arc::clone(&sink),
            logger.clone(),
            ClockSettings::from_config(config),
        ));
        let maintenance = Arc::new(MaintenanceEngine::new(
            Arc::clone(&store),
            logger.clone(),
            config.maintenance,
            retry,
        ));
        let scheduler = Arc::new(FlightScheduler::new(
            Arc::clone(&store),
            Arc::clone(&maintenance),
            logger.clone(),
        ));
        let revenue = Arc::new(RevenueResolver::new(
            Arc::clone(&store),
            Arc::new(EraTable),
            Arc::new(StaticDemand::default()),
            RevenueRates::default(),
            logger.clone(),
        ));
        let lifecycle = Arc::new(AircraftLifecycle::new(
            Arc::clone(&store),
            sink,
            config.clone(),
            logger.clone(),
        ));

        let mut jobs = JobScheduler::new(JOB_WORKERS, config.job_poll_interval, logger.clone());
        for kind in JobKind::ALL {
            let job = {
                let registry = Arc::clone(&registry);
                let logger = logger.clone();
                match kind {
                    JobKind::CreditDeduction => {
                        let lifecycle = Arc::clone(&lifecycle);
                        WorldPassJob::new(kind, registry, logger, move |world, now| {
                            lifecycle.monthly_settlement(world, now).map(|_| ())
                        })
                    }
                    JobKind::FlightRevenue => {
                        let revenue = Arc::clone(&revenue);
                        WorldPassJob::new(kind, registry, logger, move |world, now| {
                            revenue.resolve_due(world, now).map(|_| ())
                        })
                    }
                    JobKind::Maintenance => {
                        let maintenance = Arc::clone(&maintenance);
                        WorldPassJob::new(kind, registry, logger, move |world, now| {
                            maintenance.run_pass(world, now).map(|_| ())
                        })
                    }
                    JobKind::ListingResolution => {
                        let lifecycle = Arc::clone(&lifecycle);
                        WorldPassJob::new(kind, registry, logger, move |world, now| {
                            lifecycle.resolve_listings(world, now).map(|_| ())
                        })
                    }
                    JobKind::RecallResolution => {
                        let lifecycle = Arc::clone(&lifecycle);
                        WorldPassJob::new(kind, registry, logger, move |world, now| {
                            lifecycle.resolve_recalls(world, now).map(|_| ())
                        })
                    }
                    JobKind::LeaseExpiry => {
                        let lifecycle = Arc::clone(&lifecycle);
                        WorldPassJob::new(kind, registry, logger, move |world, now| {
                            lifecycle.expire_leases(world, now).map(|_| ())
                        })
                    }
                    JobKind::AiDecisions => {
                        let ai = Arc::clone(&ai);
                        let store = Arc::clone(&store);
                        WorldPassJob::new(kind, registry, logger, move |world, now| {
                            run_ai_pass(store.as_ref(), ai.as_ref(), world, now).map(|_| ())
                        })
                    }
                }
            };
            jobs.register(Arc::new(job), kind.interval(&config.jobs));
        }

        Simulation {
            store,
            registry,
            scheduler,
            maintenance,
            revenue,
            lifecycle,
            jobs: Arc::new(jobs),
            logger,
        }
    }

    /// Starts every stored active world, then the background jobs. Returns
    /// how many worlds are running.
    pub fn start(&self) -> Result<usize, SimError> {
        let started = self.registry.start_all()?;
        self.jobs.start()?;
        self.logger
            .info("simulation", &format!("Started with {} world(s)", started));
        Ok(started)
    }

    /// Lets running jobs finish, then stops and flushes every world.
    pub fn stop(&self) {
        if let Err(e) = self.jobs.stop() {
            self.logger
                .error("simulation", &format!("Stopping jobs failed: {}", e));
        }
        self.registry.stop_all();
        self.logger.info("simulation", "Stopped");
    }

    /// Seeds a world with Argentine airports, one airline, three aircraft and
    /// a weekday timetable out of Aeroparque.
    pub fn load_demo_data(&self, world: WorldId) -> Result<DemoData, SimError> {
        let now = self.registry.game_time(world)?;
        for (iata, country, name, lat, lon) in DEMO_AIRPORTS {
            self.store
                .insert_airport(&Airport::new(iata, country, name, lat, lon))?;
        }

        let membership = Membership::new(world, "Aerolineas Demo", 50_000_000.0);
        self.store.insert_membership(&membership)?;

        let fleet = [
            ("LV-FNA", SizeCategory::NarrowBody, 174, 830.0),
            ("LV-FNB", SizeCategory::NarrowBody, 174, 830.0),
            ("LV-RGA", SizeCategory::Regional, 76, 780.0),
        ];
        let mut aircraft = Vec::new();
        for (registration, category, seats, cruise) in fleet {
            let plane = Aircraft::new(&membership, registration, category, seats, cruise, "AEP")
                .with_checks_at(now);
            self.store.insert_aircraft(&plane)?;
            aircraft.push(plane);
        }

        let mut routes = Vec::new();
        for destination in ["COR", "MDZ", "ROS"] {
            let route = self.demo_route(&membership, "AEP", destination)?;
            self.store.save_route(&route)?;
            routes.push(route);
        }

        let mut templates = 0;
        for (plane, route) in aircraft.iter().zip(&routes) {
            let round_trip = round_trip_minutes(route.distance_km, plane.cruise_speed_kmh);
            for day in 1..=5u8 {
                for departure in [TimeOfDay::hm(7, 0)?, TimeOfDay::hm(15, 30)?] {
                    match self.scheduler.schedule_template(
                        route.id,
                        plane.id,
                        day,
                        departure,
                        round_trip,
                    )? {
                        ScheduleOutcome::Scheduled(_) => templates += 1,
                        ScheduleOutcome::Rejected(conflict) => self.logger.warn(
                            "simulation",
                            &format!("Demo flight skipped: {}", conflict),
                        ),
                    }
                }
            }
        }

        self.logger.info(
            "simulation",
            &format!(
                "Demo data loaded into {}: {} aircraft, {} routes, {} templates",
                world,
                aircraft.len(),
                routes.len(),
                templates
            ),
        );
        Ok(DemoData {
            membership,
            aircraft,
            routes,
            templates,
        })
    }

    fn demo_route(&self, membership: &Membership, origin: &str, destination: &str) -> Result<Route, SimError> {
        let from = self.store.get_airport(origin)?;
        let to = self.store.get_airport(destination)?;
        let distance = from.distance_km(&to);
        let economy = 40.0 + 0.12 * distance;
        Ok(Route::new(
            membership,
            origin,
            destination,
            distance.round(),
            CabinPrices {
                economy,
                premium: economy * 1.6,
                business: economy * 3.0,
                first: economy * 5.0,
            },
        ))
    }

    pub fn game_time(&self, world: WorldId) -> Result<NaiveDateTime, SimError> {
        self.registry.game_time(world)
    }
}

/// Out and back at cruise speed with a 45 minute turn at the far end.
fn round_trip_minutes(distance_km: f64, cruise_speed_kmh: f64) -> i64 {
    let leg = (distance_km / cruise_speed_kmh * 60.0).ceil() as i64 + 20;
    2 * leg + 45
}

const DEMO_AIRPORTS: [(&str, &str, &str, f64, f64); 9] = [
    ("AEP", "ARG", "Aeroparque Jorge Newbery", -34.553, -58.413),
    ("EZE", "ARG", "Aeropuerto Internacional Ministro Pistarini", -34.822, -58.535),
    ("COR", "ARG", "Aeropuerto Internacional Ingeniero Aeronautico Ambrosio Taravella", -31.321, -64.213),
    ("ROS", "ARG", "Aeropuerto Internacional Rosario", -32.948, -60.787),
    ("MDZ", "ARG", "Aeropuerto Internacional El Plumerillo", -32.883, -68.845),
    ("BRC", "ARG", "Aeropuerto Internacional Teniente Luis Candelaria", -41.151, -71.158),
    ("USH", "ARG", "Aeropuerto Internacional Malvinas Argentinas", -54.843, -68.295),
    ("VCV", "USA", "Southern California Logistics Airport", 34.597, -117.383),
    ("MZJ", "USA", "Pinal Airpark", 32.510, -111.325),
];
