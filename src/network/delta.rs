use rand::Rng;

use super::codec::state_hash;
use super::EntityUpdateBody;
use crate::components::NetworkUpdateable;
use crate::ecs::{ComponentKind, World};
use crate::entities::EntityFactory;
use crate::error::Result;

/// Per-entity throttle: an entity is reported when its jittered timer has elapsed
/// and its serialized state hashes differently from the last report.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeltaTracker;

impl DeltaTracker {
    pub fn new() -> Self {
        Self
    }

    pub fn due_updates<R: Rng + ?Sized>(
        &self,
        world: &mut World,
        factory: &EntityFactory,
        dt: f64,
        rng: &mut R,
    ) -> Result<Vec<EntityUpdateBody>> {
        let mut updates = Vec::new();
        for id in world.entities_with(ComponentKind::NetworkUpdateable) {
            let updateable = world.require_mut::<NetworkUpdateable>(&id)?;
            if !updateable.is_publish {
                continue;
            }
            updateable.next_update_in_ms -= dt;
            if updateable.next_update_in_ms > 0.0 {
                continue;
            }
            let interval = updateable.update_interval;

            let args = factory.serialize(world, &id)?;
            let hash = state_hash(&args);

            let updateable = world.require_mut::<NetworkUpdateable>(&id)?;
            updateable.next_update_in_ms = interval.sample(rng);
            if updateable.last_hash == Some(hash) {
                continue;
            }
            updateable.last_hash = Some(hash);
            updates.push(EntityUpdateBody { id, args });
        }
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::components::BoundingBox;
    use crate::ecs::EntityId;
    use crate::entities::EntityKind;
    use crate::rng::{JitterRange, RngManager};

    fn setup(interval: JitterRange) -> (World, EntityFactory, EntityId) {
        let factory = EntityFactory::default();
        let mut world = World::new();
        let id = EntityId::new("floor");
        factory
            .build(&mut world, EntityKind::Floor, &id, &json!({ "floorWidth": 100.0 }))
            .unwrap();
        world.insert(&id, NetworkUpdateable::new(interval));
        world.rebuild_index();
        (world, factory, id)
    }

    #[test]
    fn test_unchanged_state_reported_once() {
        let (mut world, factory, _) = setup(JitterRange::fixed(0.0));
        let mut rng = RngManager::new(3);
        let tracker = DeltaTracker::new();

        assert_eq!(tracker.due_updates(&mut world, &factory, 8.0, rng.stream("d")).unwrap().len(), 1);
        assert!(tracker.due_updates(&mut world, &factory, 8.0, rng.stream("d")).unwrap().is_empty());
        assert!(tracker.due_updates(&mut world, &factory, 8.0, rng.stream("d")).unwrap().is_empty());
    }

    #[test]
    fn test_change_waits_for_timer() {
        let (mut world, factory, id) = setup(JitterRange::fixed(20.0));
        let mut rng = RngManager::new(3);
        let tracker = DeltaTracker::new();

        // First report is immediate, then the timer is armed at 20ms.
        assert_eq!(tracker.due_updates(&mut world, &factory, 8.0, rng.stream("d")).unwrap().len(), 1);
        world.get_mut::<BoundingBox>(&id).unwrap().center.x += 1.0;

        assert!(tracker.due_updates(&mut world, &factory, 8.0, rng.stream("d")).unwrap().is_empty());
        assert!(tracker.due_updates(&mut world, &factory, 8.0, rng.stream("d")).unwrap().is_empty());
        let updates = tracker.due_updates(&mut world, &factory, 8.0, rng.stream("d")).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, id);
        assert_eq!(updates[0].args["boundingBox"]["center"]["x"], json!(301.0));
    }

    #[test]
    fn test_subscribe_only_entities_are_skipped() {
        let (mut world, factory, id) = setup(JitterRange::fixed(0.0));
        world.insert(&id, NetworkUpdateable::subscribe_only(JitterRange::fixed(0.0)));
        let mut rng = RngManager::new(3);
        assert!(DeltaTracker::new()
            .due_updates(&mut world, &factory, 8.0, rng.stream("d"))
            .unwrap()
            .is_empty());
    }
}
