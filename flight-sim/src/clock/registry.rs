use chrono::NaiveDateTime;
use logger::Logger;
use persistence::{Store, World, WorldStatus};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::world_clock::WorldClock;
use super::{ClockSettings, RealClock};
use crate::types::notification::NotificationSink;
use crate::types::sim_error::SimError;

/// Owns the clock of every loaded world, keyed by world id.
pub struct WorldRegistry {
    clocks: RwLock<HashMap<Uuid, Arc<WorldClock>>>,
    store: Arc<dyn Store>,
    real_clock: Arc<dyn RealClock>,
    sink: Arc<dyn NotificationSink>,
    logger: Logger,
    settings: ClockSettings,
}

impl WorldRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        real_clock: Arc<dyn RealClock>,
        sink: Arc<dyn NotificationSink>,
        logger: Logger,
        settings: ClockSettings,
    ) -> Self {
        WorldRegistry {
            clocks: RwLock::new(HashMap::new()),
            store,
            real_clock,
            sink,
            logger,
            settings,
        }
    }

    /// Persists a new world and starts its clock.
    pub fn create_world(
        &self,
        name: &str,
        acceleration_factor: f64,
        start: NaiveDateTime,
        end_date: Option<NaiveDateTime>,
    ) -> Result<World, SimError> {
        if acceleration_factor <= 0.0 {
            return Err(SimError::InvalidInput(format!(
                "acceleration must be positive, got {}",
                acceleration_factor
            )));
        }
        if let Some(end) = end_date {
            if end <= start {
                return Err(SimError::InvalidInput(
                    "end date must be after the start".to_string(),
                ));
            }
        }
        let mut world = World::new(name, acceleration_factor, start);
        world.end_date = end_date;
        self.store.insert_world(&world)?;
        self.logger.info(
            "registry",
            &format!("Created world '{}' ({}) at x{}", name, world.id, acceleration_factor),
        );
        self.start_world(world.id)?;
        Ok(world)
    }

    /// Loads a world from the store and starts its clock. A world that is
    /// already loaded is left alone.
    pub fn start_world(&self, id: Uuid) -> Result<Arc<WorldClock>, SimError> {
        if let Some(clock) = self.clock(id) {
            return Ok(clock);
        }
        let world = self.store.get_world(id).map_err(|e| match e {
            persistence::StoreError::NotFound { .. } => SimError::WorldNotFound(id),
            other => SimError::Store(other),
        })?;
        if world.status == WorldStatus::Completed {
            return Err(SimError::WorldCompleted(id));
        }

        let clock = WorldClock::new(
            world,
            Arc::clone(&self.store),
            Arc::clone(&self.real_clock),
            Arc::clone(&self.sink),
            self.logger.clone(),
            self.settings,
        );
        clock.start()?;
        self.clocks.write()?.insert(id, Arc::clone(&clock));
        Ok(clock)
    }

    /// Starts every active world in the store. Returns how many started;
    /// a world that fails is logged and skipped.
    pub fn start_all(&self) -> Result<usize, SimError> {
        let worlds = self.store.list_worlds(Some(WorldStatus::Active))?;
        let mut started = 0;
        for world in worlds {
            match self.start_world(world.id) {
                Ok(_) => started += 1,
                Err(e) => self.logger.error(
                    "registry",
                    &format!("Could not start world {}: {}", world.id, e),
                ),
            }
        }
        Ok(started)
    }

    pub fn pause_world(&self, id: Uuid, at: Option<NaiveDateTime>) -> Result<(), SimError> {
        self.require(id)?.pause(at)
    }

    pub fn resume_world(&self, id: Uuid) -> Result<(), SimError> {
        self.require(id)?.resume()
    }

    /// Stops the clock, flushes it once and unloads the world.
    pub fn stop_world(&self, id: Uuid) -> Result<(), SimError> {
        let clock = self
            .clocks
            .write()?
            .remove(&id)
            .ok_or(SimError::WorldNotFound(id))?;
        clock.stop()
    }

    pub fn stop_all(&self) {
        let clocks: Vec<Arc<WorldClock>> = match self.clocks.write() {
            Ok(mut clocks) => clocks.drain().map(|(_, clock)| clock).collect(),
            Err(_) => return,
        };
        for clock in clocks {
            if let Err(e) = clock.stop() {
                self.logger.error(
                    "registry",
                    &format!("Final flush of world {} failed: {}", clock.world_id(), e),
                );
            }
        }
    }

    /// Game time of a loaded world, or the stored time of one that is not.
    pub fn game_time(&self, id: Uuid) -> Result<NaiveDateTime, SimError> {
        match self.clock(id) {
            Some(clock) => clock.game_time(),
            None => Ok(self.store.get_world(id)?.current_time),
        }
    }

    pub fn world_ids(&self) -> Vec<Uuid> {
        self.clocks
            .read()
            .map(|clocks| clocks.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Loaded worlds that are neither paused nor completed, with their game time.
    pub fn running_worlds(&self) -> Vec<(Uuid, NaiveDateTime)> {
        let clocks: Vec<Arc<WorldClock>> = match self.clocks.read() {
            Ok(clocks) => clocks.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        clocks
            .into_iter()
            .filter(|clock| !clock.is_paused() && !clock.is_completed())
            .filter_map(|clock| clock.game_time().ok().map(|time| (clock.world_id(), time)))
            .collect()
    }

    pub fn clock(&self, id: Uuid) -> Option<Arc<WorldClock>> {
        self.clocks.read().ok()?.get(&id).cloned()
    }

    fn require(&self, id: Uuid) -> Result<Arc<WorldClock>, SimError> {
        self.clock(id).ok_or(SimError::WorldNotFound(id))
    }
}
