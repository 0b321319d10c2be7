use rand_chacha::ChaCha8Rng;

use crate::components::{BoundingBox, Control, Force2D, Forces, Gravity, Jump, Mass, Moment, Velocity};
use crate::ecs::{ComponentKind, EntityId, World};
use crate::error::Result;
use crate::scheduler::{System, SystemContext};

/// Semi-implicit Euler integrator.
///
/// Pass one turns accumulated forces into velocity, pass two turns velocity into position.
/// `dt` is used as given, so results depend on the tick length.
pub struct Physics {
    gravity: f64,
}

impl Physics {
    pub fn new(gravity: f64) -> Self {
        Self { gravity }
    }

    fn integrate_forces(&self, world: &mut World, id: &EntityId, dt: f64) -> Result<()> {
        let mass = world.require::<Mass>(id)?.mass;
        let inertia = world.require::<Moment>(id)?.inertia;
        let dy = world.require::<Velocity>(id)?.dy;
        let terminal_velocity = world.get::<Gravity>(id).map(|g| g.terminal_velocity);

        let forces = world.require_mut::<Forces>(id)?;
        if terminal_velocity.is_some_and(|terminal| dy < terminal) {
            forces.push(Force2D::vertical(mass * self.gravity));
        }
        let sum = forces.sum();
        forces.forces.clear();

        let ddx = sum.fx / mass;
        let ddy = sum.fy / mass;
        let velocity = world.require_mut::<Velocity>(id)?;
        velocity.dx += ddx * dt;
        velocity.dy += ddy * dt;
        velocity.d_theta += sum.torque * dt / inertia;

        // falling: no longer standing on anything
        if ddy > 0.0 {
            if let Some(jump) = world.get_mut::<Jump>(id) {
                jump.can_jump = false;
            }
        }
        Ok(())
    }

    fn integrate_position(world: &mut World, id: &EntityId, dt: f64) {
        let Some(velocity) = world.get::<Velocity>(id) else {
            return;
        };
        let mut total = *velocity;
        if let Some(control) = world.get_mut::<Control>(id) {
            total.add(&control.control_velocity);
            control.control_velocity = Velocity::ZERO;
        }

        if let Some(bounding_box) = world.get_mut::<BoundingBox>(id) {
            bounding_box.center.x += total.dx * dt;
            bounding_box.center.y += total.dy * dt;
            let rotation = bounding_box.rotation() + total.d_theta * dt;
            bounding_box.set_rotation(rotation);
        }
    }
}

impl Default for Physics {
    fn default() -> Self {
        Self::new(crate::config::PhysicsConfig::default().gravity)
    }
}

impl System for Physics {
    fn name(&self) -> &str {
        "physics"
    }

    fn run(&mut self, ctx: &SystemContext, world: &mut World, _rng: &mut ChaCha8Rng) -> Result<()> {
        for id in world.entities_with(ComponentKind::Forces) {
            self.integrate_forces(world, &id, ctx.dt)?;
        }

        for id in world.entities_with(ComponentKind::Velocity) {
            if world.has::<BoundingBox>(&id) {
                Self::integrate_position(world, &id, ctx.dt);
            }
        }
        Ok(())
    }
}
