//! Broad phase over every collidable box, exact overlap test, then floor response

use std::collections::BTreeSet;
use std::f64::consts::FRAC_PI_2;

use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::components::{BoundingBox, Collide, Force2D, Forces, Gravity, Jump, Mass, TopCollidable, Velocity};
use crate::ecs::{ComponentKind, EntityId, World};
use crate::error::{Result, SimError};
use crate::math::{Coord2D, Dimension2D};
use crate::scheduler::{System, SystemContext};
use crate::spatial::{BoxedEntry, BroadPhase};

pub struct Collision {
    broad_phase: Box<dyn BroadPhase>,
    gravity: f64,
}

impl Collision {
    pub fn new(broad_phase: Box<dyn BroadPhase>, gravity: f64) -> Self {
        Self {
            broad_phase,
            gravity,
        }
    }

    /// Collidable entities with a bounding box, in id order.
    fn collidable_entities(world: &World) -> BTreeSet<EntityId> {
        [ComponentKind::Collide, ComponentKind::TopCollidable]
            .into_iter()
            .flat_map(|kind| world.entities_with(kind))
            .filter(|id| world.has::<BoundingBox>(id))
            .collect()
    }

    /// Resizes the broad phase to exactly cover every entry, then inserts them.
    fn rebuild_broad_phase(&mut self, entries: &[BoxedEntry]) {
        self.broad_phase.clear();
        if entries.is_empty() {
            return;
        }

        let mut top_left = Coord2D::new(f64::INFINITY, f64::INFINITY);
        let mut bottom_right = Coord2D::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for entry in entries {
            top_left.x = top_left.x.min(entry.min_x());
            top_left.y = top_left.y.min(entry.min_y());
            bottom_right.x = bottom_right.x.max(entry.max_x());
            bottom_right.y = bottom_right.y.max(entry.max_y());
        }

        self.broad_phase.set_top_left(top_left);
        self.broad_phase.set_dimension(Dimension2D::new(
            bottom_right.x - top_left.x,
            bottom_right.y - top_left.y,
        ));
        for entry in entries {
            self.broad_phase.insert(entry);
        }
    }

    fn colliding_pairs(&self, world: &World, entries: &[BoxedEntry]) -> Result<Vec<(EntityId, EntityId)>> {
        let mut pairs = Vec::new();
        for entry in entries {
            let bounding_box = world.require::<BoundingBox>(&entry.id)?;
            for neighbor_id in self.broad_phase.neighbor_ids(entry) {
                let Some(neighbor_box) = world.get::<BoundingBox>(&neighbor_id) else {
                    continue;
                };
                if bounding_box.is_colliding_with(neighbor_box) {
                    pairs.push((entry.id.clone(), neighbor_id));
                }
            }
        }
        Ok(pairs)
    }

    /// Lands `a` on top of floor `b`. Only `a` moves; floors are immovable.
    fn resolve_floor(&self, world: &mut World, a: &EntityId, b: &EntityId) -> Result<()> {
        if !world.has::<Collide>(a) || !world.has::<TopCollidable>(b) {
            return Ok(());
        }
        let (Some(mover), Some(floor)) = (
            world.get::<BoundingBox>(a).copied(),
            world.get::<BoundingBox>(b).copied(),
        ) else {
            return Ok(());
        };
        let dy = world.get::<Velocity>(a).map_or(0.0, |velocity| velocity.dy);

        // moving up through the floor from below
        if mover.center.y > floor.center.y || dy < 0.0 {
            return Ok(());
        }
        if floor.is_rotated() {
            return Err(SimError::RotatedFloor { entity: b.clone() });
        }

        if let Some(velocity) = world.get_mut::<Velocity>(a) {
            velocity.dy = 0.0;
        }

        if world.has::<Gravity>(a) {
            let mass = world.require::<Mass>(a)?.mass;
            world
                .require_mut::<Forces>(a)?
                .push(Force2D::vertical(-mass * self.gravity));
        }

        if let Some(jump) = world.get_mut::<Jump>(a) {
            jump.can_jump = true;
        }

        let resting_y = floor.center.y - floor.dimension.height / 2.0 - push_out_of_floor(&mover, &floor);
        trace!(entity = %a, floor = %b, resting_y, "landed");
        world.require_mut::<BoundingBox>(a)?.center.y = resting_y;
        Ok(())
    }
}

/// Distance from the mover's center to the floor surface once resting on it.
///
/// For an unrotated box this is half its height. For a rotated box the lowest vertex sits
/// at a horizontal offset from the center; when that vertex hangs past the floor's edge the
/// box rests on the edge instead and sinks by the overhang times the slope.
pub fn push_out_of_floor(mover: &BoundingBox, floor: &BoundingBox) -> f64 {
    let Dimension2D { width, height } = mover.dimension;
    let half_outscribed = mover.outscribed_dimension().height / 2.0;
    let x = mover.center.x;

    let mut rads = mover.rotation_in_pi();
    if rads == 0.0 {
        return half_outscribed;
    }
    let mut dx = (width * rads.cos() - height * rads.sin()) / 2.0;
    if rads >= FRAC_PI_2 {
        rads -= FRAC_PI_2;
        dx = (height * rads.cos() - width * rads.sin()) / 2.0;
    }

    let clipped_x = x + dx;
    let sink = if x >= floor.center.x {
        let bounded_x = clipped_x.min(floor.center.x + floor.dimension.width / 2.0);
        (clipped_x - bounded_x) * rads.tan()
    } else {
        let bounded_x = clipped_x.max(floor.center.x - floor.dimension.width / 2.0);
        (bounded_x - clipped_x) * (FRAC_PI_2 - rads).tan()
    };

    if !sink.is_finite() {
        return half_outscribed;
    }
    half_outscribed - sink.max(0.0)
}

impl System for Collision {
    fn name(&self) -> &str {
        "collision"
    }

    fn run(&mut self, _ctx: &SystemContext, world: &mut World, _rng: &mut ChaCha8Rng) -> Result<()> {
        let mut entries = Vec::new();
        for id in Self::collidable_entities(world) {
            let bounding_box = world.require::<BoundingBox>(&id)?;
            entries.push(BoxedEntry::new(
                id,
                bounding_box.center,
                bounding_box.outscribed_dimension(),
            ));
        }

        self.rebuild_broad_phase(&entries);
        let pairs = self.colliding_pairs(world, &entries)?;
        for (a, b) in pairs {
            self.resolve_floor(world, &a, &b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityKind;
    use crate::rng::RngManager;
    use crate::spatial::{Grid, QuadTree};

    const G: f64 = 0.0075;

    fn floor(world: &mut World, id: &str, x: f64, y: f64, width: f64, rotation: f64) -> EntityId {
        let id = EntityId::new(id);
        world.add_entity(id.clone(), EntityKind::Floor);
        world.insert(&id, TopCollidable);
        world.insert(
            &id,
            BoundingBox::new(Coord2D::new(x, y), Dimension2D::new(width, 10.0), rotation),
        );
        id
    }

    fn mover(world: &mut World, id: &str, x: f64, y: f64, dy: f64) -> EntityId {
        let id = EntityId::new(id);
        world.add_entity(id.clone(), EntityKind::Player);
        world.insert(&id, Collide);
        world.insert(&id, Mass::new(10.0));
        world.insert(&id, Forces::default());
        world.insert(&id, Gravity::default());
        world.insert(&id, Jump::default());
        world.insert(&id, Velocity::new(0.0, dy, 0.0));
        world.insert(
            &id,
            BoundingBox::new(Coord2D::new(x, y), Dimension2D::new(64.0, 64.0), 0.0),
        );
        id
    }

    fn run(world: &mut World, broad_phase: Box<dyn BroadPhase>) -> Result<()> {
        world.rebuild_index();
        let ctx = SystemContext { tick: 1, dt: 8.0, now_ms: 8.0 };
        Collision::new(broad_phase, G).run(&ctx, world, RngManager::new(1).stream("collision"))
    }

    #[test]
    fn test_landing_on_floor() {
        for broad_phase in [
            Box::new(Grid::default()) as Box<dyn BroadPhase>,
            Box::new(QuadTree::new(Coord2D::default(), Dimension2D::new(600.0, 800.0), 10, 10)),
        ] {
            let mut world = World::new();
            let floor_id = floor(&mut world, "floor", 300.0, 795.0, 600.0, 0.0);
            let player = mover(&mut world, "player", 300.0, 760.0, 0.5);

            run(&mut world, broad_phase).unwrap();

            assert_eq!(world.get::<Velocity>(&player).unwrap().dy, 0.0);
            assert!(world.get::<Jump>(&player).unwrap().can_jump);
            assert_eq!(world.get::<BoundingBox>(&player).unwrap().center.y, 790.0 - 32.0);
            assert_eq!(world.get::<Forces>(&player).unwrap().sum().fy, -10.0 * G);
            // The floor never moves.
            assert_eq!(world.get::<BoundingBox>(&floor_id).unwrap().center.y, 795.0);
        }
    }

    #[test]
    fn test_moving_up_through_floor_is_ignored() {
        let mut world = World::new();
        floor(&mut world, "floor", 300.0, 795.0, 600.0, 0.0);
        let player = mover(&mut world, "player", 300.0, 770.0, -0.5);

        run(&mut world, Box::new(Grid::default())).unwrap();
        assert_eq!(world.get::<BoundingBox>(&player).unwrap().center.y, 770.0);
        assert_eq!(world.get::<Velocity>(&player).unwrap().dy, -0.5);
    }

    #[test]
    fn test_below_floor_center_is_ignored() {
        let mut world = World::new();
        floor(&mut world, "floor", 300.0, 500.0, 600.0, 0.0);
        let player = mover(&mut world, "player", 300.0, 520.0, 0.5);

        run(&mut world, Box::new(Grid::default())).unwrap();
        assert_eq!(world.get::<BoundingBox>(&player).unwrap().center.y, 520.0);
    }

    #[test]
    fn test_rotated_floor_is_rejected() {
        let mut world = World::new();
        let floor_id = floor(&mut world, "floor", 300.0, 795.0, 600.0, 10.0);
        mover(&mut world, "player", 300.0, 760.0, 0.5);

        match run(&mut world, Box::new(Grid::default())) {
            Err(SimError::RotatedFloor { entity }) => assert_eq!(entity, floor_id),
            other => panic!("expected rotated floor error, got {other:?}"),
        }
    }

    #[test]
    fn test_separated_boxes_untouched() {
        let mut world = World::new();
        floor(&mut world, "floor", 300.0, 795.0, 600.0, 0.0);
        let player = mover(&mut world, "player", 300.0, 100.0, 0.5);

        run(&mut world, Box::new(Grid::default())).unwrap();
        assert_eq!(world.get::<BoundingBox>(&player).unwrap().center.y, 100.0);
        assert!(!world.get::<Jump>(&player).unwrap().can_jump);
    }

    #[test]
    fn test_push_out_unrotated_is_half_height() {
        let floor_box = BoundingBox::new(Coord2D::new(0.0, 0.0), Dimension2D::new(100.0, 10.0), 0.0);
        let mover_box = BoundingBox::new(Coord2D::new(10.0, -20.0), Dimension2D::new(20.0, 30.0), 0.0);
        assert_eq!(push_out_of_floor(&mover_box, &floor_box), 15.0);
    }

    #[test]
    fn test_push_out_rotated_over_floor_uses_outscribed_height() {
        let floor_box = BoundingBox::new(Coord2D::new(0.0, 0.0), Dimension2D::new(1000.0, 10.0), 0.0);
        let mover_box = BoundingBox::new(Coord2D::new(0.0, -30.0), Dimension2D::new(20.0, 20.0), 45.0);
        let expected = 20.0 * std::f64::consts::SQRT_2 / 2.0;
        assert!((push_out_of_floor(&mover_box, &floor_box) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_push_out_sinks_past_floor_edge() {
        let floor_box = BoundingBox::new(Coord2D::new(0.0, 0.0), Dimension2D::new(100.0, 10.0), 0.0);
        let mover_box = BoundingBox::new(Coord2D::new(60.0, -20.0), Dimension2D::new(20.0, 20.0), 30.0);
        let half_outscribed = mover_box.outscribed_dimension().height / 2.0;
        let push = push_out_of_floor(&mover_box, &floor_box);
        assert!(push < half_outscribed);
    }
}
