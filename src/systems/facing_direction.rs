use rand_chacha::ChaCha8Rng;

use crate::components::{Control, Direction, FacingDirection as Facing, Velocity};
use crate::ecs::{ComponentKind, World};
use crate::error::Result;
use crate::scheduler::{System, SystemContext};

/// Turns entities toward the sign of their total horizontal velocity.
pub struct FacingDirection;

impl FacingDirection {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FacingDirection {
    fn default() -> Self {
        Self::new()
    }
}

impl System for FacingDirection {
    fn name(&self) -> &str {
        "facing_direction"
    }

    fn run(&mut self, _ctx: &SystemContext, world: &mut World, _rng: &mut ChaCha8Rng) -> Result<()> {
        for id in world.entities_with(ComponentKind::FacingDirection) {
            let Some(velocity) = world.get::<Velocity>(&id) else {
                continue;
            };
            let mut total = *velocity;
            if let Some(control) = world.get::<Control>(&id) {
                total.add(&control.control_velocity);
            }

            let facing = world.require_mut::<Facing>(&id)?;
            if total.dx > 0.0 {
                facing.facing = Direction::Right;
            } else if total.dx < 0.0 {
                facing.facing = Direction::Left;
            }
        }
        Ok(())
    }
}
