use chrono::NaiveDateTime;
use logger::Logger;
use persistence::{MemoryStore, Store};
use simulator::clock::SystemClock;
use simulator::jobs::NoAi;
use simulator::simulation::Simulation;
use simulator::types::config::SimConfig;
use simulator::types::notification::LogSink;
use simulator::types::sim_error::SimError;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

fn clean_scr() {
    print!("\x1B[2J\x1B[1;1H");
    let _ = io::stdout().flush();
}

fn prompt_input(prompt: &str) -> Result<String, SimError> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| SimError::Other(format!("could not read input: {}", e)))?;
    Ok(input.trim().to_string())
}

fn parse_time(input: &str) -> Result<NaiveDateTime, SimError> {
    NaiveDateTime::parse_from_str(input, TIME_FORMAT)
        .map_err(|_| SimError::InvalidInput(format!("'{}' is not a YYYY-MM-DD HH:MM time", input)))
}

fn create_world(sim: &Simulation) -> Result<Uuid, SimError> {
    clean_scr();
    let name = prompt_input("Enter the world name: ")?;
    let acceleration: f64 = prompt_input("Enter the acceleration (game seconds per real second): ")?
        .parse()
        .map_err(|_| SimError::InvalidInput("acceleration must be a number".to_string()))?;
    let start = parse_time(&prompt_input("Enter the start time (YYYY-MM-DD HH:MM): ")?)?;
    let end_input = prompt_input("Enter the end time (YYYY-MM-DD HH:MM, empty for none): ")?;
    let end = if end_input.is_empty() {
        None
    } else {
        Some(parse_time(&end_input)?)
    };

    let world = sim.registry.create_world(&name, acceleration, start, end)?;
    println!("World '{}' created: {}", world.name, world.id);
    Ok(world.id)
}

fn list_worlds(sim: &Simulation) -> Result<(), SimError> {
    clean_scr();
    let worlds = sim.store.list_worlds(None)?;
    if worlds.is_empty() {
        println!("No worlds yet. Use create-world.");
        return Ok(());
    }
    println!("{:<38} {:<20} {:<10} {:<7} Game time", "Id", "Name", "Status", "Speed");
    for world in worlds {
        let loaded = sim.registry.clock(world.id);
        let state = match &loaded {
            Some(clock) if clock.is_paused() => "paused",
            Some(clock) if clock.is_completed() => "completed",
            Some(_) => "running",
            None => world.status.as_str(),
        };
        let game_time = sim.game_time(world.id)?;
        println!(
            "{:<38} {:<20} {:<10} x{:<6} {}",
            world.id,
            world.name,
            state,
            world.acceleration_factor,
            game_time.format(TIME_FORMAT)
        );
    }
    Ok(())
}

fn in_flight(sim: &Simulation, world: Uuid) -> Result<(), SimError> {
    clean_scr();
    let now = sim.game_time(world)?;
    let flights = sim.scheduler.in_flight(world, now)?;
    println!("{} flight(s) airborne at {}", flights.len(), now.format(TIME_FORMAT));
    for flight in flights {
        let route = sim.store.get_route(flight.route_id)?;
        let aircraft = sim.store.get_aircraft(flight.aircraft_id)?;
        println!(
            "  {:<8} {}-{}  departed {}  lands {}",
            aircraft.registration,
            route.origin,
            route.destination,
            flight.departure.format(TIME_FORMAT),
            flight.arrival.format(TIME_FORMAT)
        );
    }
    Ok(())
}

/// The world named on the command line, or the one last used.
fn target_world(args: &[&str], current: Option<Uuid>) -> Result<Uuid, SimError> {
    match args.get(1) {
        Some(raw) => Uuid::parse_str(raw)
            .map_err(|_| SimError::InvalidInput(format!("'{}' is not a world id", raw))),
        None => current.ok_or_else(|| {
            SimError::InvalidInput("no world selected; pass a world id".to_string())
        }),
    }
}

fn build_logger(config: &SimConfig, dir_override: Option<PathBuf>) -> Logger {
    let dir = dir_override.unwrap_or_else(|| config.log_dir.clone());
    match Logger::new(&dir, "simulator") {
        Ok(logger) => logger.with_min_level(config.log_level),
        Err(e) => {
            eprintln!("Cannot log to {}: {}. Logging to the console.", dir.display(), e);
            Logger::console().with_min_level(config.log_level)
        }
    }
}

fn main() -> Result<(), SimError> {
    let config = SimConfig::from_env()?;
    let log_dir = env::args().nth(1).map(PathBuf::from);
    let logger = build_logger(&config, log_dir);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let sim = Simulation::new(
        &config,
        store,
        Arc::new(SystemClock),
        Arc::new(LogSink::new(logger.clone())),
        Arc::new(NoAi),
        logger,
    );
    sim.start()?;

    let mut current: Option<Uuid> = None;
    loop {
        let command = match prompt_input("Enter command (type 'help' for options): ") {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{}", e);
                break;
            }
        };
        let args: Vec<&str> = command.split_whitespace().collect();
        if args.is_empty() {
            continue;
        }

        let result = match args[0] {
            "create-world" => create_world(&sim).map(|id| current = Some(id)),
            "list-worlds" => list_worlds(&sim),
            "pause" => target_world(&args, current).and_then(|id| {
                sim.registry.pause_world(id, None)?;
                println!("World {} paused", id);
                Ok(())
            }),
            "resume" => target_world(&args, current).and_then(|id| {
                sim.registry.resume_world(id)?;
                println!("World {} resumed", id);
                Ok(())
            }),
            "stop" => target_world(&args, current).and_then(|id| {
                sim.registry.stop_world(id)?;
                if current == Some(id) {
                    current = None;
                }
                println!("World {} stopped", id);
                Ok(())
            }),
            "time" => target_world(&args, current).and_then(|id| {
                println!("{}", sim.game_time(id)?.format(TIME_FORMAT));
                Ok(())
            }),
            "demo-data" => target_world(&args, current).and_then(|id| {
                clean_scr();
                let demo = sim.load_demo_data(id)?;
                println!(
                    "Demo data added: {} aircraft, {} routes, {} weekly flights",
                    demo.aircraft.len(),
                    demo.routes.len(),
                    demo.templates
                );
                Ok(())
            }),
            "in-flight" => target_world(&args, current).and_then(|id| in_flight(&sim, id)),
            "-h" | "help" => {
                print_help();
                Ok(())
            }
            "exit" => break,
            _ => {
                eprintln!("Invalid command. Use help for options.");
                Ok(())
            }
        };

        if let Err(e) = result {
            eprintln!("{}", e);
        }
    }

    sim.stop();
    Ok(())
}

fn print_help() {
    clean_scr();
    println!("Available commands:");
    println!("  create-world");
    println!("    Creates and starts a new world. You'll be prompted for each detail.");
    println!("  list-worlds");
    println!("    Shows every world with its state and game time.");
    println!("  pause [world-id]");
    println!("    Freezes the world's clock.");
    println!("  resume [world-id]");
    println!("    Restarts a paused world's clock.");
    println!("  stop [world-id]");
    println!("    Stops the world's clock and saves it.");
    println!("  time [world-id]");
    println!("    Prints the world's game time.");
    println!("  demo-data [world-id]");
    println!("    Adds airports, an airline, three aircraft and a weekday timetable.");
    println!("  in-flight [world-id]");
    println!("    Lists the flights airborne right now.");
    println!("  exit");
    println!("    Saves every world and closes this application.");
    println!();
    println!("Without a world id, commands act on the last world created.");
}
