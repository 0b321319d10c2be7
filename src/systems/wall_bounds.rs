use rand_chacha::ChaCha8Rng;

use crate::components::BoundingBox;
use crate::ecs::{ComponentKind, World};
use crate::error::Result;
use crate::scheduler::{System, SystemContext};

/// Keeps wall-bounded entities horizontally inside `[0, world_width]`.
pub struct WallBounds {
    world_width: f64,
}

impl WallBounds {
    pub fn new(world_width: f64) -> Self {
        Self { world_width }
    }
}

impl System for WallBounds {
    fn name(&self) -> &str {
        "wall_bounds"
    }

    fn run(&mut self, _ctx: &SystemContext, world: &mut World, _rng: &mut ChaCha8Rng) -> Result<()> {
        for id in world.entities_with(ComponentKind::WallBounded) {
            let Some(bounding_box) = world.get_mut::<BoundingBox>(&id) else {
                continue;
            };
            let half_width = bounding_box.dimension.width / 2.0;
            let max_x = (self.world_width - half_width).max(half_width);
            bounding_box.center.x = bounding_box.center.x.clamp(half_width, max_x);
        }
        Ok(())
    }
}
