use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use logger::Logger;
use persistence::{AircraftStatus, MemoryStore, Store, World};
use simulator::clock::registry::WorldRegistry;
use simulator::clock::{ClockSettings, ManualClock, RealClock};
use simulator::jobs::NoAi;
use simulator::maintenance::apply_check;
use simulator::revenue::RevenueOutcome;
use simulator::scheduling::ScheduleOutcome;
use simulator::simulation::Simulation;
use simulator::types::config::SimConfig;
use simulator::types::notification::{ChannelSink, NullSink};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use timetable::{
    active_occurrences, expand_blocks, CheckType, FlightTemplate, MaintenancePattern,
    ScheduleConflict, TimeOfDay,
};

fn game_time(text: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").unwrap()
}

fn at(text: &str) -> TimeOfDay {
    TimeOfDay::parse(text).unwrap()
}

fn real_start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

fn test_config() -> SimConfig {
    SimConfig {
        tick_interval: StdDuration::from_millis(5),
        retry_backoff: StdDuration::ZERO,
        ..SimConfig::default()
    }
}

// A simulation over a memory store, a manual real clock and a world that
// starts on Monday 1998-06-01 at midnight with demo data loaded.
fn demo_simulation() -> (Simulation, Arc<MemoryStore>, Arc<ManualClock>, World) {
    let store = Arc::new(MemoryStore::new());
    let real = Arc::new(ManualClock::new(real_start()));
    let (sink, _receiver) = ChannelSink::new();
    let sim = Simulation::new(
        &test_config(),
        store.clone(),
        real.clone(),
        Arc::new(sink),
        Arc::new(NoAi),
        Logger::silent(),
    );
    let world = sim
        .registry
        .create_world("Demo", 60.0, game_time("1998-06-01 00:00"), None)
        .unwrap();
    sim.load_demo_data(world.id).unwrap();
    (sim, store, real, world)
}

#[test]
fn test_template_in_flight_only_between_departure_and_arrival() {
    // 2024-01-01 is a Monday.
    let template = FlightTemplate::new(
        uuid_like(1),
        uuid_like(2),
        1,
        at("08:00"),
        600,
    );
    assert_eq!(template.arrival_day_offset, 0);
    let templates = vec![template];
    assert_eq!(active_occurrences(&templates, game_time("2024-01-01 09:00")).len(), 1);
    assert!(active_occurrences(&templates, game_time("2024-01-01 19:00")).is_empty());
}

fn uuid_like(n: u128) -> uuid::Uuid {
    uuid::Uuid::from_u128(n)
}

#[test]
fn test_c_check_expands_into_one_block_per_day() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let pattern = MaintenancePattern::once(uuid_like(7), CheckType::C, date, at("08:00"), 30_240);
    let blocks = expand_blocks(&[pattern], date, date + Duration::days(40));

    assert_eq!(blocks.len(), 21);
    assert_eq!(blocks[0].display_date, date);
    assert_eq!(blocks[0].start_time, at("08:00"));
    assert_eq!(blocks[0].display_duration, 30_240);
    assert!(!blocks[0].is_ongoing);
    for (i, block) in blocks.iter().enumerate().skip(1) {
        assert_eq!(block.display_date, date + Duration::days(i as i64));
        assert!(block.is_ongoing);
        assert_eq!(block.start_time, TimeOfDay::MIDNIGHT);
        assert_eq!(block.display_duration, 1440);
    }
    assert_eq!(blocks[20].display_date, NaiveDate::from_ymd_opt(2024, 1, 21).unwrap());
}

#[test]
fn test_a_check_is_a_single_overnight_block() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let pattern = MaintenancePattern::once(uuid_like(7), CheckType::A, date, at("22:00"), 600);
    let blocks = expand_blocks(&[pattern], date, date + Duration::days(3));
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].spans_overnight);
    assert_eq!(blocks[0].end_time, at("08:00"));
}

#[test]
fn test_catch_up_after_ten_offline_minutes() {
    let store = Arc::new(MemoryStore::new());
    let real = Arc::new(ManualClock::new(real_start()));
    let settings = ClockSettings {
        tick_interval: StdDuration::from_millis(5),
        persist_every: 1,
        retry: persistence::RetryPolicy::new(3, StdDuration::ZERO),
    };
    let registry = WorldRegistry::new(store.clone(), real.clone(), Arc::new(NullSink), Logger::silent(), settings);
    let start = game_time("1995-03-01 06:00");

    let mut running = World::new("Offline", 60.0, start);
    running.last_tick_at = Some(real.now() - Duration::seconds(600));
    store.insert_world(&running).unwrap();
    let mut paused = World::new("Paused", 60.0, start);
    paused.last_tick_at = Some(real.now() - Duration::seconds(600));
    paused.is_paused = true;
    store.insert_world(&paused).unwrap();

    assert_eq!(registry.start_all().unwrap(), 2);
    assert_eq!(registry.game_time(running.id).unwrap(), start + Duration::seconds(36_000));
    assert_eq!(registry.game_time(paused.id).unwrap(), start);

    registry.stop_all();
    assert_eq!(
        store.get_world(running.id).unwrap().current_time,
        start + Duration::seconds(36_000)
    );
}

#[test]
fn test_recording_d_check_cascades_to_every_tier() {
    let (sim, store, _real, world) = demo_simulation();
    let plane = store.list_aircraft(world.id, None).unwrap().remove(0);
    let when = game_time("1998-06-03 10:00");
    let mut expected = plane.clone();
    apply_check(&mut expected, CheckType::D, when);

    let recorded = sim.maintenance.record_check(plane.id, CheckType::D, when).unwrap();
    for tier in CheckType::ALL {
        assert_eq!(recorded.checks.last(tier), Some(when));
    }
    assert_eq!(recorded.a_check_hours, recorded.flight_hours);
    assert_eq!(recorded, expected);
    assert_eq!(store.get_aircraft(plane.id).unwrap(), recorded);
    sim.stop();
}

#[test]
fn test_overlapping_template_is_rejected_and_other_days_accepted() {
    let (sim, store, _real, world) = demo_simulation();
    let plane = store.list_aircraft(world.id, None).unwrap().remove(0);
    let existing = store.list_templates_for_aircraft(plane.id).unwrap();
    let monday_morning = existing
        .iter()
        .find(|t| t.day_of_week == 1 && t.departure_time == at("07:00"))
        .unwrap();

    let outcome = sim
        .scheduler
        .schedule_template(monday_morning.route_id, plane.id, 1, at("08:00"), 60)
        .unwrap();
    match outcome {
        ScheduleOutcome::Rejected(ScheduleConflict::Flight(conflict)) => {
            assert_eq!(conflict.template_id, monday_morning.id);
        }
        other => panic!("expected a flight conflict, got {:?}", other),
    }

    // Saturday has no demo flights.
    let saturday = sim
        .scheduler
        .schedule_template(monday_morning.route_id, plane.id, 6, at("08:00"), 60)
        .unwrap();
    assert!(matches!(saturday, ScheduleOutcome::Scheduled(_)));
    sim.stop();
}

#[test]
fn test_revenue_posts_once_per_route_and_game_day() {
    let (sim, store, real, world) = demo_simulation();
    real.advance(Duration::minutes(12));
    let clock = sim.registry.clock(world.id).unwrap();
    clock.tick_at(real.now()).unwrap();
    let noon = sim.game_time(world.id).unwrap();
    assert_eq!(noon, game_time("1998-06-01 12:00"));

    let membership = store.list_memberships(world.id).unwrap().remove(0);
    let report = sim.revenue.resolve_due(world.id, noon).unwrap();
    assert_eq!(report.posted.len(), 3);
    let profit: f64 = report.posted.iter().map(|(_, trip)| trip.profit()).sum();
    let balance = store.get_membership(membership.id).unwrap().balance;
    assert!((balance - (membership.balance + profit)).abs() < 1e-6);

    let again = sim.revenue.resolve_due(world.id, noon + Duration::minutes(5)).unwrap();
    assert!(again.posted.is_empty());
    let (route_id, _) = report.posted[0];
    let plane = store.list_aircraft(world.id, None).unwrap().remove(0);
    assert_eq!(
        sim.revenue.resolve_route(route_id, plane.id, noon).unwrap(),
        RevenueOutcome::AlreadyPosted
    );
    assert_eq!(store.get_membership(membership.id).unwrap().balance, balance);
    sim.stop();
}

#[test]
fn test_background_jobs_run_world_passes() {
    let (sim, store, real, world) = demo_simulation();
    real.advance(Duration::minutes(12));
    sim.registry.clock(world.id).unwrap().tick_at(real.now()).unwrap();

    let dispatched = sim.jobs.poll_at(Instant::now()).unwrap();
    assert_eq!(dispatched.len(), 7);
    sim.jobs.wait_idle().unwrap();

    let stored = store.get_world(world.id).unwrap();
    assert_eq!(stored.last_maintenance_day, NaiveDate::from_ymd_opt(1998, 6, 1));
    assert_eq!(stored.last_processed_month.as_deref(), Some("1998-06"));
    assert!(store
        .list_routes(world.id)
        .unwrap()
        .iter()
        .all(|route| route.stats.total_flights == 1));
    assert!(store
        .list_aircraft(world.id, None)
        .unwrap()
        .iter()
        .all(|plane| plane.status == AircraftStatus::Active));

    // Nothing is due again a moment later.
    let immediately = sim.jobs.poll_at(Instant::now()).unwrap();
    assert!(immediately.is_empty());
    sim.stop();
}
