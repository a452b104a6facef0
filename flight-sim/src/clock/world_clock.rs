use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use logger::Logger;
use persistence::{Store, World, WorldStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use uuid::Uuid;

use super::{ClockSettings, RealClock};
use crate::types::notification::{Notification, NotificationSink};
use crate::types::sim_error::SimError;

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced(NaiveDateTime),
    /// Paused or already completed; time did not move.
    Skipped,
    /// The end date was reached on this tick.
    Completed(NaiveDateTime),
}

struct ClockState {
    world: World,
    /// Real instant the last advancement was measured from.
    last_tick_ref: DateTime<Utc>,
    tick_count: u64,
}

/// The accelerated clock of a single world.
///
/// Game time advances by `real elapsed x acceleration` on every tick of a
/// dedicated thread and is written back to the store every
/// `persist_every` ticks, on pause, and on stop. Catch-up for the time the
/// world was not ticking happens once, in `start`.
pub struct WorldClock {
    world_id: Uuid,
    state: Mutex<ClockState>,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
    store: Arc<dyn Store>,
    real_clock: Arc<dyn RealClock>,
    sink: Arc<dyn NotificationSink>,
    logger: Logger,
    settings: ClockSettings,
}

fn scaled(elapsed: Duration, acceleration: f64) -> Duration {
    let real_ms = elapsed.num_milliseconds().max(0) as f64;
    Duration::milliseconds((real_ms * acceleration).round() as i64)
}

impl WorldClock {
    pub fn new(
        world: World,
        store: Arc<dyn Store>,
        real_clock: Arc<dyn RealClock>,
        sink: Arc<dyn NotificationSink>,
        logger: Logger,
        settings: ClockSettings,
    ) -> Arc<Self> {
        let now = real_clock.now();
        Arc::new(WorldClock {
            world_id: world.id,
            state: Mutex::new(ClockState {
                world,
                last_tick_ref: now,
                tick_count: 0,
            }),
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
            store,
            real_clock,
            sink,
            logger,
            settings,
        })
    }

    pub fn world_id(&self) -> Uuid {
        self.world_id
    }

    fn target(&self) -> String {
        format!("clock:{}", self.world_id)
    }

    /// Current in-memory state of the world.
    pub fn snapshot(&self) -> Result<World, SimError> {
        Ok(self.state.lock()?.world.clone())
    }

    pub fn game_time(&self) -> Result<NaiveDateTime, SimError> {
        Ok(self.state.lock()?.world.current_time)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.world.is_paused)
            .unwrap_or(false)
    }

    pub fn is_completed(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.world.status == WorldStatus::Completed)
            .unwrap_or(false)
    }

    /// Reconciles the clock with the time it spent offline.
    ///
    /// If the world ticked before and is not paused, `(now - last_tick_at) x
    /// acceleration` is added to game time, clamped to the end date (which
    /// completes the world). The reconciled state is persisted with
    /// `last_tick_at = now`. Returns `true` when the world is completed.
    pub fn catch_up(&self) -> Result<bool, SimError> {
        let now = self.real_clock.now();
        let completed = {
            let mut state = self.state.lock()?;
            if state.world.status != WorldStatus::Completed && !state.world.is_paused {
                if let Some(last) = state.world.last_tick_at {
                    let advance = scaled(now - last, state.world.acceleration_factor);
                    state.world.current_time += advance;
                    self.logger.info(
                        &self.target(),
                        &format!(
                            "Caught up {} game seconds after {} real seconds offline",
                            advance.num_seconds(),
                            (now - last).num_seconds()
                        ),
                    );
                }
                clamp_to_end(&mut state.world);
            }
            state.world.last_tick_at = Some(now);
            state.last_tick_ref = now;
            state.world.status == WorldStatus::Completed
        };
        self.flush()?;
        if completed {
            self.notify_completed()?;
        }
        Ok(completed)
    }

    /// Catches up and launches the tick thread, unless the world is
    /// completed or paused (a paused world starts ticking on `resume`).
    pub fn start(self: &Arc<Self>) -> Result<(), SimError> {
        if self.catch_up()? {
            return Ok(());
        }
        if self.is_paused() {
            return Ok(());
        }
        self.spawn_loop()
    }

    fn spawn_loop(self: &Arc<Self>) -> Result<(), SimError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let clock = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("world-clock-{}", self.world_id))
            .spawn(move || {
                while clock.running.load(Ordering::SeqCst) {
                    let started = Instant::now();
                    match clock.tick_at(clock.real_clock.now()) {
                        Ok(TickOutcome::Completed(_)) => break,
                        Ok(_) => {}
                        Err(e) => clock.logger.error(&clock.target(), &format!("Tick failed: {}", e)),
                    }
                    thread::sleep(clock.settings.tick_interval.saturating_sub(started.elapsed()));
                }
                clock.running.store(false, Ordering::SeqCst);
            })
            .map_err(|_| {
                self.running.store(false, Ordering::SeqCst);
                SimError::TimerStartError(format!("could not start clock of world {}", self.world_id))
            })?;
        *self.handle.lock()? = Some(handle);
        self.logger.info(&self.target(), "Clock started");
        Ok(())
    }

    /// Advances game time by the real time elapsed since the previous tick.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Result<TickOutcome, SimError> {
        let (outcome, persist) = {
            let mut state = self.state.lock()?;
            if state.world.is_paused || state.world.status == WorldStatus::Completed {
                return Ok(TickOutcome::Skipped);
            }
            let advance = scaled(now - state.last_tick_ref, state.world.acceleration_factor);
            state.world.current_time += advance;
            state.world.last_tick_at = Some(now);
            state.last_tick_ref = now;
            state.tick_count += 1;

            if clamp_to_end(&mut state.world) {
                (TickOutcome::Completed(state.world.current_time), true)
            } else {
                let persist = state.tick_count % self.settings.persist_every == 0;
                (TickOutcome::Advanced(state.world.current_time), persist)
            }
        };

        if persist {
            // A failed write stays in memory and goes out with the next flush.
            if let Err(e) = self.flush() {
                self.logger
                    .warn(&self.target(), &format!("Persist failed, will retry: {}", e));
            }
        }

        match outcome {
            TickOutcome::Advanced(game_time) => self.sink.push(Notification::WorldTick {
                world_id: self.world_id,
                game_time,
            }),
            TickOutcome::Completed(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.notify_completed()?;
            }
            TickOutcome::Skipped => {}
        }
        Ok(outcome)
    }

    /// Freezes game time and persists the pause. Without an outside time
    /// the clock first advances to the current real instant, so the part of
    /// a tick interval since the last tick is not lost.
    pub fn pause(&self, at: Option<NaiveDateTime>) -> Result<(), SimError> {
        let now = self.real_clock.now();
        let completed = {
            let mut state = self.state.lock()?;
            let mut completed = false;
            match at {
                Some(at) => state.world.current_time = at,
                None if !state.world.is_paused && state.world.status != WorldStatus::Completed => {
                    let advance = scaled(now - state.last_tick_ref, state.world.acceleration_factor);
                    state.world.current_time += advance;
                    completed = clamp_to_end(&mut state.world);
                }
                None => {}
            }
            state.world.last_tick_at = Some(now);
            state.last_tick_ref = now;
            state.world.is_paused = true;
            completed
        };
        self.logger.info(&self.target(), "Clock paused");
        self.flush()?;
        if completed {
            self.running.store(false, Ordering::SeqCst);
            self.notify_completed()?;
        }
        Ok(())
    }

    /// Clears the pause and measures the next tick from now.
    pub fn resume(self: &Arc<Self>) -> Result<(), SimError> {
        {
            let mut state = self.state.lock()?;
            if state.world.status == WorldStatus::Completed {
                return Err(SimError::WorldCompleted(self.world_id));
            }
            let now = self.real_clock.now();
            state.world.is_paused = false;
            state.world.last_tick_at = Some(now);
            state.last_tick_ref = now;
        }
        self.flush()?;
        self.logger.info(&self.target(), "Clock resumed");
        self.spawn_loop()
    }

    /// Stops the tick thread and writes the final state.
    pub fn stop(&self) -> Result<(), SimError> {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.handle.lock()?.take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                self.logger.error(&self.target(), "Clock thread panicked");
            }
        }
        self.logger.info(&self.target(), "Clock stopped");
        self.flush()
    }

    /// Writes the clock fields to the store, retrying transient failures.
    pub fn flush(&self) -> Result<(), SimError> {
        let world = self.snapshot()?;
        self.settings
            .retry
            .run(&self.logger, "save world clock", || self.store.save_world_clock(&world))?;
        Ok(())
    }

    fn notify_completed(&self) -> Result<(), SimError> {
        let game_time = self.game_time()?;
        self.logger
            .info(&self.target(), &format!("World completed at {}", game_time));
        self.sink.push(Notification::WorldCompleted {
            world_id: self.world_id,
            game_time,
        });
        Ok(())
    }
}

/// Clamps to the end date if it was reached. Returns `true` on completion.
fn clamp_to_end(world: &mut World) -> bool {
    match world.end_date {
        Some(end) if world.current_time >= end => {
            world.current_time = end;
            world.status = WorldStatus::Completed;
            true
        }
        _ => false,
    }
}
