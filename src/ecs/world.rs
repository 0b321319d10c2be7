//! World - entity registry, component storages and the component index

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::component::{Component, ComponentKind, ComponentStorage, TypedComponentStorage};
use super::EntityId;
use crate::components::{
    BoundingBox, Collide, Control, FacingDirection, Forces, Gravity, Jump, Mass, Moment,
    NetworkUpdateable, TopCollidable, Velocity, WallBounded,
};
use crate::entities::EntityKind;
use crate::error::{Result, SimError};

/// Owns every entity and its components. Only mutated from inside a tick.
#[derive(Default)]
pub struct World {
    entities: BTreeMap<EntityId, EntityKind>,
    index: HashMap<ComponentKind, BTreeSet<EntityId>>,
    bounding_boxes: TypedComponentStorage<BoundingBox>,
    velocities: TypedComponentStorage<Velocity>,
    forces: TypedComponentStorage<Forces>,
    masses: TypedComponentStorage<Mass>,
    moments: TypedComponentStorage<Moment>,
    gravities: TypedComponentStorage<Gravity>,
    jumps: TypedComponentStorage<Jump>,
    controls: TypedComponentStorage<Control>,
    collides: TypedComponentStorage<Collide>,
    top_collidables: TypedComponentStorage<TopCollidable>,
    wall_bounded: TypedComponentStorage<WallBounded>,
    network_updateables: TypedComponentStorage<NetworkUpdateable>,
    facing_directions: TypedComponentStorage<FacingDirection>,
}

macro_rules! component_storage {
    ($($ty:ident => $field:ident),* $(,)?) => {
        $(
            impl Component for $ty {
                const KIND: ComponentKind = ComponentKind::$ty;

                fn storage(world: &World) -> &TypedComponentStorage<Self> {
                    &world.$field
                }

                fn storage_mut(world: &mut World) -> &mut TypedComponentStorage<Self> {
                    &mut world.$field
                }
            }
        )*

        impl World {
            fn storage_of(&self, kind: ComponentKind) -> &dyn ComponentStorage {
                match kind {
                    $(ComponentKind::$ty => &self.$field as &dyn ComponentStorage,)*
                }
            }

            fn storages_mut(&mut self) -> Vec<&mut dyn ComponentStorage> {
                vec![$(&mut self.$field as &mut dyn ComponentStorage),*]
            }
        }
    };
}

component_storage!(
    BoundingBox => bounding_boxes,
    Velocity => velocities,
    Forces => forces,
    Mass => masses,
    Moment => moments,
    Gravity => gravities,
    Jump => jumps,
    Control => controls,
    Collide => collides,
    TopCollidable => top_collidables,
    WallBounded => wall_bounded,
    NetworkUpdateable => network_updateables,
    FacingDirection => facing_directions,
);

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity. An existing entity with the same id is replaced, components included.
    pub fn add_entity(&mut self, id: EntityId, kind: EntityKind) {
        if self.entities.contains_key(&id) {
            self.clear_components(&id);
        }
        self.entities.insert(id, kind);
    }

    /// Removes an entity and all of its components. Absent ids are a no-op.
    pub fn remove_entity(&mut self, id: &EntityId) -> Option<EntityKind> {
        let kind = self.entities.remove(id)?;
        self.clear_components(id);
        for ids in self.index.values_mut() {
            ids.remove(id);
        }
        Some(kind)
    }

    pub fn get_entity(&self, id: &EntityId) -> Option<EntityKind> {
        self.entities.get(id).copied()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = (&EntityId, EntityKind)> {
        self.entities.iter().map(|(id, kind)| (id, *kind))
    }

    /// Attaches a component, replacing any component of the same kind. Ignored for unknown ids.
    pub fn insert<T: Component>(&mut self, id: &EntityId, component: T) {
        if !self.entities.contains_key(id) {
            return;
        }
        T::storage_mut(self).insert(id.clone(), component);
    }

    pub fn get<T: Component>(&self, id: &EntityId) -> Option<&T> {
        T::storage(self).get(id)
    }

    pub fn get_mut<T: Component>(&mut self, id: &EntityId) -> Option<&mut T> {
        T::storage_mut(self).get_mut(id)
    }

    pub fn has<T: Component>(&self, id: &EntityId) -> bool {
        T::storage(self).has(id)
    }

    /// Like [`World::get`], but a missing component is an invariant violation.
    pub fn require<T: Component>(&self, id: &EntityId) -> Result<&T> {
        self.get::<T>(id).ok_or_else(|| SimError::MissingComponent {
            entity: id.clone(),
            kind: T::KIND,
        })
    }

    pub fn require_mut<T: Component>(&mut self, id: &EntityId) -> Result<&mut T> {
        T::storage_mut(self)
            .get_mut(id)
            .ok_or_else(|| SimError::MissingComponent {
                entity: id.clone(),
                kind: T::KIND,
            })
    }

    /// Rebuilds the kind → entity-id index by scanning every entity's components.
    pub fn rebuild_index(&mut self) {
        let mut index: HashMap<ComponentKind, BTreeSet<EntityId>> = HashMap::new();
        for id in self.entities.keys() {
            for kind in ComponentKind::ALL {
                if self.storage_of(kind).has(id) {
                    index.entry(kind).or_default().insert(id.clone());
                }
            }
        }
        self.index = index;
    }

    /// Ids holding `kind` as of the last index rebuild, minus any removed since.
    pub fn entities_with(&self, kind: ComponentKind) -> Vec<EntityId> {
        self.index
            .get(&kind)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn clear_components(&mut self, id: &EntityId) {
        for storage in self.storages_mut() {
            storage.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Coord2D, Dimension2D};

    fn unit_box() -> BoundingBox {
        BoundingBox::new(Coord2D::new(0.0, 0.0), Dimension2D::new(1.0, 1.0), 0.0)
    }

    #[test]
    fn test_world_entity_lifecycle() {
        let mut world = World::new();
        let a = EntityId::new("a");
        let b = EntityId::new("b");

        world.add_entity(a.clone(), EntityKind::Player);
        world.add_entity(b.clone(), EntityKind::Floor);
        assert_eq!(world.entity_count(), 2);
        assert_eq!(world.get_entity(&a), Some(EntityKind::Player));

        assert_eq!(world.remove_entity(&a), Some(EntityKind::Player));
        assert!(world.get_entity(&a).is_none());
        assert!(world.remove_entity(&a).is_none());
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_world_components() {
        let mut world = World::new();
        let id = EntityId::new("p");
        world.add_entity(id.clone(), EntityKind::Player);
        world.insert(&id, unit_box());
        world.insert(&id, Velocity::new(0.5, 0.5, 0.0));

        assert!(world.has::<BoundingBox>(&id));
        assert!(world.has::<Velocity>(&id));
        assert!(!world.has::<Mass>(&id));

        if let Some(velocity) = world.get_mut::<Velocity>(&id) {
            velocity.dx = 1.0;
        }
        assert_eq!(world.get::<Velocity>(&id).map(|v| v.dx), Some(1.0));
    }

    #[test]
    fn test_insert_for_unknown_entity_is_ignored() {
        let mut world = World::new();
        let ghost = EntityId::new("ghost");
        world.insert(&ghost, Mass::new(1.0));
        assert!(!world.has::<Mass>(&ghost));
    }

    #[test]
    fn test_require_reports_missing_kind() {
        let mut world = World::new();
        let id = EntityId::new("p");
        world.add_entity(id.clone(), EntityKind::Player);

        match world.require::<Mass>(&id) {
            Err(SimError::MissingComponent { entity, kind }) => {
                assert_eq!(entity, id);
                assert_eq!(kind, ComponentKind::Mass);
            }
            other => panic!("expected missing component, got {other:?}"),
        }
    }

    #[test]
    fn test_index_rebuild_tracks_components() {
        let mut world = World::new();
        let a = EntityId::new("a");
        let b = EntityId::new("b");
        world.add_entity(a.clone(), EntityKind::Player);
        world.add_entity(b.clone(), EntityKind::Floor);
        world.insert(&a, Collide);
        world.insert(&a, unit_box());
        world.insert(&b, unit_box());

        assert!(world.entities_with(ComponentKind::BoundingBox).is_empty());
        world.rebuild_index();
        assert_eq!(world.entities_with(ComponentKind::BoundingBox), vec![a.clone(), b.clone()]);
        assert_eq!(world.entities_with(ComponentKind::Collide), vec![a.clone()]);

        world.remove_entity(&a);
        assert_eq!(world.entities_with(ComponentKind::BoundingBox), vec![b]);
        assert!(world.entities_with(ComponentKind::Collide).is_empty());
    }

    #[test]
    fn test_re_adding_entity_drops_old_components() {
        let mut world = World::new();
        let id = EntityId::new("a");
        world.add_entity(id.clone(), EntityKind::Player);
        world.insert(&id, Mass::new(2.0));

        world.add_entity(id.clone(), EntityKind::Floor);
        assert!(!world.has::<Mass>(&id));
        assert_eq!(world.get_entity(&id), Some(EntityKind::Floor));
    }
}
