use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_args, EntityBuilder, EntitySettings};
use crate::components::{
    BoundingBox, Collide, Control, Direction, FacingDirection, Forces, Gravity, Jump, Mass,
    Moment, Velocity, WallBounded,
};
use crate::ecs::{EntityId, World};
use crate::error::Result;
use crate::math::{Coord2D, Dimension2D};

pub const PLAYER_SPAWN: Coord2D = Coord2D::new(300.0, 100.0);
pub const PLAYER_SIZE: Dimension2D = Dimension2D::new(64.0, 64.0);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PlayerArgs {
    control: Option<ControlArgs>,
    #[serde(flatten)]
    state: PlayerUpdate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlArgs {
    #[serde(default)]
    controllable_by: Option<String>,
}

/// Attributes a peer may overwrite. Ownership is fixed at spawn and never taken from updates.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PlayerUpdate {
    bounding_box: Option<BoundingBox>,
    velocity: Option<Velocity>,
    jump: Option<Jump>,
    facing: Option<Direction>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerState<'a> {
    control: ControlState<'a>,
    bounding_box: &'a BoundingBox,
    velocity: &'a Velocity,
    jump: Option<&'a Jump>,
    facing: Option<Direction>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ControlState<'a> {
    controllable_by: Option<&'a str>,
}

pub(super) fn builder() -> EntityBuilder {
    EntityBuilder {
        spawn,
        serialize,
        set_from,
        update_interval: |network| network.player_update_interval_ms,
    }
}

fn spawn(world: &mut World, id: &EntityId, args: &Value, settings: &EntitySettings) -> Result<()> {
    let args: PlayerArgs = parse_args(id, args)?;
    let physics = &settings.physics;

    world.insert(id, BoundingBox::new(PLAYER_SPAWN, PLAYER_SIZE, 0.0));
    world.insert(id, Velocity::ZERO);
    world.insert(id, Mass::new(physics.player_mass));
    world.insert(id, Moment::new(physics.player_moment));
    world.insert(id, Forces::default());
    world.insert(id, Gravity::new(physics.terminal_velocity));
    world.insert(id, Jump::default());
    world.insert(
        id,
        Control {
            controllable_by: args.control.and_then(|control| control.controllable_by),
            ..Control::default()
        },
    );
    world.insert(id, Collide);
    world.insert(id, WallBounded);
    world.insert(id, FacingDirection::default());

    apply(world, id, args.state);
    Ok(())
}

fn serialize(world: &World, id: &EntityId) -> Result<Value> {
    let state = PlayerState {
        control: ControlState {
            controllable_by: world
                .get::<Control>(id)
                .and_then(|control| control.controllable_by.as_deref()),
        },
        bounding_box: world.require::<BoundingBox>(id)?,
        velocity: world.require::<Velocity>(id)?,
        jump: world.get::<Jump>(id),
        facing: world.get::<FacingDirection>(id).map(|facing| facing.facing),
    };
    Ok(serde_json::to_value(state)?)
}

fn set_from(world: &mut World, id: &EntityId, args: &Value) -> Result<()> {
    let update: PlayerUpdate = parse_args(id, args)?;
    apply(world, id, update);
    Ok(())
}

fn apply(world: &mut World, id: &EntityId, update: PlayerUpdate) {
    if let Some(bounding_box) = update.bounding_box {
        world.insert(id, bounding_box);
    }
    if let Some(velocity) = update.velocity {
        world.insert(id, velocity);
    }
    if let Some(jump) = update.jump {
        world.insert(id, jump);
    }
    if let Some(facing) = update.facing {
        world.insert(id, FacingDirection { facing });
    }
}
