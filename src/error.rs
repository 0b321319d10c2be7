use thiserror::Error;

use crate::ecs::{ComponentKind, EntityId};
use crate::entities::EntityKind;

pub type Result<T, E = SimError> = std::result::Result<T, E>;

/// Failures raised inside a tick. Any of these aborts the tick that produced it.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("entity {entity} does not have component {kind:?}")]
    MissingComponent { entity: EntityId, kind: ComponentKind },

    #[error(
        "entity {entity} has a TopCollidable component and a non-zero rotation, which is not supported"
    )]
    RotatedFloor { entity: EntityId },

    #[error("no entity with id {entity}")]
    UnknownEntity { entity: EntityId },

    #[error("no builder registered for entity kind {kind:?}")]
    MissingBuilder { kind: EntityKind },

    #[error("invalid arguments for entity {entity}: {reason}")]
    InvalidArgs { entity: EntityId, reason: String },

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection is not open")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
