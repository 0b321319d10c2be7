//! Scheduler - owns the world and runs systems once per tick in registration order

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand_chacha::ChaCha8Rng;
use tracing::{debug, error};

use crate::ecs::World;
use crate::error::Result;
use crate::rng::RngManager;

/// Per-tick values handed to every system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemContext {
    pub tick: u64,
    /// Milliseconds since the previous tick.
    pub dt: f64,
    /// Simulation clock in milliseconds, as passed to [`Game::advance`].
    pub now_ms: f64,
}

/// System trait - each stage of the tick implements this
pub trait System: Send {
    fn name(&self) -> &str;
    fn run(&mut self, ctx: &SystemContext, world: &mut World, rng: &mut ChaCha8Rng) -> Result<()>;
}

/// Statistics for a single tick
#[derive(Debug, Clone)]
pub struct TickStats {
    pub tick: u64,
    pub dt: f64,
    pub duration: Duration,
    pub system_times: Vec<(String, Duration)>,
}

pub struct Game {
    world: World,
    systems: Vec<Box<dyn System>>,
    rng: RngManager,
    running: bool,
    last_timestamp: f64,
    tick_count: u64,
    stats_history: VecDeque<TickStats>,
    max_stats_history: usize,
}

impl Game {
    pub fn new(seed: u64) -> Self {
        Self {
            world: World::new(),
            systems: Vec::new(),
            rng: RngManager::new(seed),
            running: false,
            last_timestamp: 0.0,
            tick_count: 0,
            stats_history: VecDeque::new(),
            max_stats_history: 100,
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.add_system(system);
        self
    }

    /// Registers a system. A system with the same name is replaced in place,
    /// keeping its original position in the run order.
    pub fn add_system(&mut self, system: impl System + 'static) {
        let boxed: Box<dyn System> = Box::new(system);
        match self
            .systems
            .iter()
            .position(|existing| existing.name() == boxed.name())
        {
            Some(index) => self.systems[index] = boxed,
            None => self.systems.push(boxed),
        }
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|system| system.name()).collect()
    }

    /// Captures the epoch timestamp and allows [`Game::advance`] to run.
    pub fn start(&mut self, now_ms: f64) {
        self.last_timestamp = now_ms;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Runs one tick. Returns `Ok(None)` while stopped.
    ///
    /// The first system error aborts the tick and is returned as-is.
    pub fn advance(&mut self, now_ms: f64) -> Result<Option<TickStats>> {
        if !self.running {
            return Ok(None);
        }

        let tick_start = Instant::now();
        let dt = now_ms - self.last_timestamp;
        self.last_timestamp = now_ms;
        self.tick_count += 1;

        self.world.rebuild_index();

        let ctx = SystemContext {
            tick: self.tick_count,
            dt,
            now_ms,
        };
        let mut system_times = Vec::with_capacity(self.systems.len());
        for system in &mut self.systems {
            let system_start = Instant::now();
            let rng = self.rng.stream(system.name());
            if let Err(err) = system.run(&ctx, &mut self.world, rng) {
                error!(tick = ctx.tick, system = system.name(), error = %err, "system failed");
                return Err(err);
            }
            system_times.push((system.name().to_string(), system_start.elapsed()));
        }

        let stats = TickStats {
            tick: self.tick_count,
            dt,
            duration: tick_start.elapsed(),
            system_times,
        };
        debug!(tick = stats.tick, dt, duration_us = stats.duration.as_micros() as u64, "tick");

        self.stats_history.push_back(stats.clone());
        if self.stats_history.len() > self.max_stats_history {
            self.stats_history.pop_front();
        }

        Ok(Some(stats))
    }

    /// Get recent tick statistics
    pub fn recent_stats(&self) -> impl Iterator<Item = &TickStats> {
        self.stats_history.iter()
    }

    /// Get average tick time from recent history
    pub fn average_tick_time(&self) -> Option<Duration> {
        if self.stats_history.is_empty() {
            return None;
        }

        let total: Duration = self.stats_history.iter().map(|s| s.duration).sum();
        Some(total / self.stats_history.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::ecs::{ComponentKind, EntityId};
    use crate::entities::EntityKind;
    use crate::error::SimError;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<(String, SystemContext)>>>,
    }

    impl System for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&mut self, ctx: &SystemContext, _world: &mut World, _rng: &mut ChaCha8Rng) -> Result<()> {
            self.log.lock().unwrap().push((self.name.to_string(), *ctx));
            Ok(())
        }
    }

    struct Failing;

    impl System for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn run(&mut self, _ctx: &SystemContext, _world: &mut World, _rng: &mut ChaCha8Rng) -> Result<()> {
            Err(SimError::UnknownEntity {
                entity: EntityId::new("nobody"),
            })
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<(String, SystemContext)>>>) -> Recorder {
        Recorder {
            name,
            log: Arc::clone(log),
        }
    }

    #[test]
    fn test_advance_is_noop_until_started() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut game = Game::new(42).with_system(recorder("a", &log));

        assert!(game.advance(10.0).unwrap().is_none());
        assert_eq!(game.tick_count(), 0);
        assert!(log.lock().unwrap().is_empty());

        game.start(100.0);
        let stats = game.advance(116.0).unwrap().unwrap();
        assert_eq!(stats.tick, 1);
        assert_eq!(stats.dt, 16.0);

        game.stop();
        assert!(game.advance(200.0).unwrap().is_none());
    }

    #[test]
    fn test_systems_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut game = Game::new(42)
            .with_system(recorder("input", &log))
            .with_system(recorder("physics", &log))
            .with_system(recorder("collision", &log));

        // Re-adding keeps the original slot.
        game.add_system(recorder("input", &log));
        assert_eq!(game.system_names(), vec!["input", "physics", "collision"]);

        game.start(0.0);
        game.advance(8.0).unwrap();
        game.advance(20.0).unwrap();

        let log = log.lock().unwrap();
        let names: Vec<&str> = log.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["input", "physics", "collision", "input", "physics", "collision"]
        );
        assert_eq!(log[3].1.dt, 12.0);
        assert_eq!(log[3].1.tick, 2);
        assert_eq!(log[3].1.now_ms, 20.0);
    }

    #[test]
    fn test_index_is_rebuilt_each_tick() {
        let mut game = Game::new(1);
        let id = EntityId::new("floor");
        game.world_mut().add_entity(id.clone(), EntityKind::Floor);
        game.world_mut().insert(&id, crate::components::TopCollidable);

        game.start(0.0);
        game.advance(1.0).unwrap();
        assert_eq!(game.world().entities_with(ComponentKind::TopCollidable), vec![id]);
    }

    #[test]
    fn test_system_error_stops_the_tick() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut game = Game::new(42)
            .with_system(Failing)
            .with_system(recorder("after", &log));
        game.start(0.0);

        assert!(matches!(game.advance(1.0), Err(SimError::UnknownEntity { .. })));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stats_history() {
        let mut game = Game::new(42);
        game.start(0.0);
        for t in 1..=3 {
            game.advance(t as f64).unwrap();
        }
        assert_eq!(game.recent_stats().count(), 3);
        assert!(game.average_tick_time().is_some());
    }
}
