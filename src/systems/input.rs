use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand_chacha::ChaCha8Rng;

use crate::components::{Control, Force2D, Forces, Jump, Mass, Velocity};
use crate::config::PhysicsConfig;
use crate::ecs::{ComponentKind, EntityId, World};
use crate::error::Result;
use crate::network::{Message, SessionId};
use crate::scheduler::{System, SystemContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MoveLeft,
    MoveRight,
    Jump,
}

impl Action {
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            Action::MoveLeft => &["a", "ArrowLeft"],
            Action::MoveRight => &["d", "ArrowRight"],
            Action::Jump => &["w", "ArrowUp"],
        }
    }

    pub fn from_key(key: &str) -> Option<Action> {
        [Action::MoveLeft, Action::MoveRight, Action::Jump]
            .into_iter()
            .find(|action| action.keys().contains(&key))
    }
}

/// Held keys for one controller plus the start time of its current jump.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    keys: BTreeSet<String>,
    jump_started_at: Option<f64>,
}

impl InputState {
    /// Returns `true` if the key was not already held.
    pub fn key_pressed(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    /// Returns `true` if the key was held.
    pub fn key_released(&mut self, key: &str) -> bool {
        self.keys.remove(key)
    }

    pub fn is_active(&self, action: Action) -> bool {
        action.keys().iter().any(|key| self.keys.contains(*key))
    }

    pub fn held_keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

/// Applies the held keys to one controllable entity.
///
/// Moving adds to the control-velocity accumulator. A jump kicks the vertical velocity once,
/// then keeps pushing upward while the key stays held, for at most `max_jump_time_ms`.
pub fn apply_input(
    world: &mut World,
    id: &EntityId,
    input: &mut InputState,
    physics: &PhysicsConfig,
    now_ms: f64,
) -> Result<()> {
    let control = world.require_mut::<Control>(id)?;
    if input.is_active(Action::MoveRight) {
        control.control_velocity.dx += physics.player_move_velocity;
    }
    if input.is_active(Action::MoveLeft) {
        control.control_velocity.dx -= physics.player_move_velocity;
    }

    if !world.has::<Jump>(id) || !input.is_active(Action::Jump) {
        return Ok(());
    }

    if world.require::<Jump>(id)?.can_jump {
        input.jump_started_at = Some(now_ms);
        world.require_mut::<Velocity>(id)?.dy += physics.player_jump_initial_velocity;
        world.require_mut::<Jump>(id)?.can_jump = false;
    }

    let within_jump = input
        .jump_started_at
        .is_some_and(|started| now_ms - started < physics.max_jump_time_ms);
    if within_jump {
        let mass = world.require::<Mass>(id)?.mass;
        world
            .require_mut::<Forces>(id)?
            .push(Force2D::vertical(mass * physics.player_jump_acceleration));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct ClientInput {
    state: InputState,
    outgoing: Vec<Message>,
}

/// Shared handle the host feeds key events into. Newly pressed and released keys are also
/// queued as network messages for the client publisher.
#[derive(Debug, Clone, Default)]
pub struct InputHandle {
    inner: Arc<Mutex<ClientInput>>,
}

impl InputHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClientInput> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn key_pressed(&self, key: &str) {
        let mut input = self.lock();
        if input.state.key_pressed(key) {
            input.outgoing.push(Message::NewInput(key.to_string()));
        }
    }

    pub fn key_released(&self, key: &str) {
        let mut input = self.lock();
        if input.state.key_released(key) {
            input.outgoing.push(Message::RemoveInput(key.to_string()));
        }
    }

    pub fn take_messages(&self) -> Vec<Message> {
        std::mem::take(&mut self.lock().outgoing)
    }
}

/// Client-side input: drives every entity the local session controls.
pub struct Input {
    session_id: SessionId,
    handle: InputHandle,
    physics: PhysicsConfig,
}

impl Input {
    pub fn new(session_id: impl Into<SessionId>, handle: InputHandle, physics: PhysicsConfig) -> Self {
        Self {
            session_id: session_id.into(),
            handle,
            physics,
        }
    }
}

impl System for Input {
    fn name(&self) -> &str {
        "input"
    }

    fn run(&mut self, ctx: &SystemContext, world: &mut World, _rng: &mut ChaCha8Rng) -> Result<()> {
        let mut guard = self.handle.lock();
        for id in world.entities_with(ComponentKind::Control) {
            let control = world.require_mut::<Control>(&id)?;
            control.is_controllable = control.is_owned_by(&self.session_id);
            if control.is_controllable {
                apply_input(world, &id, &mut guard.state, &self.physics, ctx.now_ms)?;
            }
        }
        Ok(())
    }
}
