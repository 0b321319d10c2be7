//! Entity kinds and the builder registry used to create, serialize and update them

mod floor;
mod player;

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Config, NetworkConfig, PhysicsConfig, WorldConfig};
use crate::ecs::{EntityId, World};
use crate::error::{Result, SimError};
use crate::rng::JitterRange;

pub use floor::FLOOR_HEIGHT;
pub use player::{PLAYER_SIZE, PLAYER_SPAWN};

/// Closed set of entity types that can cross the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Floor,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Player, EntityKind::Floor];

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Player => "Player",
            EntityKind::Floor => "Floor",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunables the builders read when constructing entities.
#[derive(Debug, Clone, Default)]
pub struct EntitySettings {
    pub world: WorldConfig,
    pub physics: PhysicsConfig,
    pub network: NetworkConfig,
}

impl From<&Config> for EntitySettings {
    fn from(config: &Config) -> Self {
        Self {
            world: config.world.clone(),
            physics: config.physics.clone(),
            network: config.network.clone(),
        }
    }
}

/// Attaches the kind's components to an already registered entity, then applies `args`.
pub type SpawnFn = fn(&mut World, &EntityId, &Value, &EntitySettings) -> Result<()>;
/// Wire attributes for an entity.
pub type SerializeFn = fn(&World, &EntityId) -> Result<Value>;
/// Merges wire attributes into an existing entity.
pub type SetFromFn = fn(&mut World, &EntityId, &Value) -> Result<()>;

#[derive(Clone, Copy)]
pub struct EntityBuilder {
    pub spawn: SpawnFn,
    pub serialize: SerializeFn,
    pub set_from: SetFromFn,
    pub update_interval: fn(&NetworkConfig) -> JitterRange,
}

/// Maps every [`EntityKind`] to its builder. Checked once at startup with [`EntityFactory::validate`].
#[derive(Clone)]
pub struct EntityFactory {
    builders: HashMap<EntityKind, EntityBuilder>,
    settings: EntitySettings,
}

impl EntityFactory {
    /// Factory with no builders registered.
    pub fn empty(settings: EntitySettings) -> Self {
        Self {
            builders: HashMap::new(),
            settings,
        }
    }

    /// Factory with the builders for every built-in kind.
    pub fn new(settings: EntitySettings) -> Self {
        Self::empty(settings)
            .with_builder(EntityKind::Player, player::builder())
            .with_builder(EntityKind::Floor, floor::builder())
    }

    pub fn with_builder(mut self, kind: EntityKind, builder: EntityBuilder) -> Self {
        self.builders.insert(kind, builder);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for kind in EntityKind::ALL {
            if !self.builders.contains_key(&kind) {
                return Err(SimError::MissingBuilder { kind });
            }
        }
        Ok(())
    }

    fn builder(&self, kind: EntityKind) -> Result<&EntityBuilder> {
        self.builders
            .get(&kind)
            .ok_or(SimError::MissingBuilder { kind })
    }

    /// Registers `id` as a fresh `kind` entity built from `args`. An existing entity with the
    /// same id is replaced, but only once `args` are known to be valid.
    pub fn build(&self, world: &mut World, kind: EntityKind, id: &EntityId, args: &Value) -> Result<()> {
        let builder = self.builder(kind)?;

        let mut scratch = World::new();
        scratch.add_entity(id.clone(), kind);
        (builder.spawn)(&mut scratch, id, args, &self.settings)?;

        world.add_entity(id.clone(), kind);
        if let Err(err) = (builder.spawn)(world, id, args, &self.settings) {
            world.remove_entity(id);
            return Err(err);
        }
        Ok(())
    }

    pub fn serialize(&self, world: &World, id: &EntityId) -> Result<Value> {
        let kind = world
            .get_entity(id)
            .ok_or_else(|| SimError::UnknownEntity { entity: id.clone() })?;
        (self.builder(kind)?.serialize)(world, id)
    }

    pub fn set_from(&self, world: &mut World, id: &EntityId, args: &Value) -> Result<()> {
        let kind = world
            .get_entity(id)
            .ok_or_else(|| SimError::UnknownEntity { entity: id.clone() })?;
        (self.builder(kind)?.set_from)(world, id, args)
    }

    pub fn update_interval(&self, kind: EntityKind) -> Result<JitterRange> {
        Ok((self.builder(kind)?.update_interval)(&self.settings.network))
    }
}

impl Default for EntityFactory {
    fn default() -> Self {
        Self::new(EntitySettings::default())
    }
}

/// Decodes builder arguments, tagging failures with the entity they were meant for.
pub(crate) fn parse_args<T: DeserializeOwned>(id: &EntityId, args: &Value) -> Result<T> {
    let parsed = if args.is_null() {
        T::deserialize(Value::Object(Default::default()))
    } else {
        T::deserialize(args)
    };
    parsed.map_err(|err| SimError::InvalidArgs {
        entity: id.clone(),
        reason: err.to_string(),
    })
}
