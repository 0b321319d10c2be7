//! Component kinds and per-kind storage

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EntityId, World};

/// Closed set of component kinds. Every component type maps to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    BoundingBox,
    Velocity,
    Forces,
    Mass,
    Moment,
    Gravity,
    Jump,
    Control,
    Collide,
    TopCollidable,
    WallBounded,
    NetworkUpdateable,
    FacingDirection,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 13] = [
        ComponentKind::BoundingBox,
        ComponentKind::Velocity,
        ComponentKind::Forces,
        ComponentKind::Mass,
        ComponentKind::Moment,
        ComponentKind::Gravity,
        ComponentKind::Jump,
        ComponentKind::Control,
        ComponentKind::Collide,
        ComponentKind::TopCollidable,
        ComponentKind::WallBounded,
        ComponentKind::NetworkUpdateable,
        ComponentKind::FacingDirection,
    ];
}

/// A component type with a fixed kind tag and a dedicated storage in the [`World`].
pub trait Component: fmt::Debug + Send + Sync + Sized + 'static {
    const KIND: ComponentKind;

    fn storage(world: &World) -> &TypedComponentStorage<Self>;
    fn storage_mut(world: &mut World) -> &mut TypedComponentStorage<Self>;
}

/// Type-erased storage operations, used when the world must touch every kind at once.
pub trait ComponentStorage: Send + Sync {
    fn remove(&mut self, entity_id: &EntityId);
    fn has(&self, entity_id: &EntityId) -> bool;
    fn clear(&mut self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage for one component kind, keyed by entity id. At most one component per entity.
pub struct TypedComponentStorage<T: Component> {
    data: HashMap<EntityId, T>,
}

impl<T: Component> TypedComponentStorage<T> {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Inserts or replaces the entity's component of this kind.
    pub fn insert(&mut self, entity_id: EntityId, component: T) -> Option<T> {
        self.data.insert(entity_id, component)
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<&T> {
        self.data.get(entity_id)
    }

    pub fn get_mut(&mut self, entity_id: &EntityId) -> Option<&mut T> {
        self.data.get_mut(entity_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &T)> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&EntityId, &mut T)> {
        self.data.iter_mut()
    }
}

impl<T: Component> Default for TypedComponentStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ComponentStorage for TypedComponentStorage<T> {
    fn remove(&mut self, entity_id: &EntityId) {
        self.data.remove(entity_id);
    }

    fn has(&self, entity_id: &EntityId) -> bool {
        self.data.contains_key(entity_id)
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
