use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::input::apply_input;
use crate::components::Control;
use crate::config::PhysicsConfig;
use crate::ecs::{ComponentKind, World};
use crate::error::Result;
use crate::network::{SessionManager, SharedSessions};
use crate::scheduler::{System, SystemContext};

/// Server-side input: replays each session's held keys onto the entities it owns.
pub struct SessionInput {
    sessions: SharedSessions,
    physics: PhysicsConfig,
}

impl SessionInput {
    pub fn new(sessions: SharedSessions, physics: PhysicsConfig) -> Self {
        Self { sessions, physics }
    }
}

impl System for SessionInput {
    fn name(&self) -> &str {
        "session_input"
    }

    fn run(&mut self, ctx: &SystemContext, world: &mut World, _rng: &mut ChaCha8Rng) -> Result<()> {
        let mut sessions = SessionManager::lock(&self.sessions);

        for id in world.entities_with(ComponentKind::Control) {
            let control = world.require_mut::<Control>(&id)?;
            control.is_controllable = control
                .controllable_by
                .as_deref()
                .is_some_and(|owner| sessions.contains(owner));
        }

        for session in sessions.iter_mut() {
            for id in &session.controllable_entities {
                if !world.has::<Control>(id) {
                    debug!(session = %session.id, entity = %id, "owned entity missing, skipping input");
                    continue;
                }
                apply_input(world, id, &mut session.input, &self.physics, ctx.now_ms)?;
            }
        }
        Ok(())
    }
}
