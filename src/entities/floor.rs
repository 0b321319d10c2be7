use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_args, EntityBuilder, EntitySettings};
use crate::components::{BoundingBox, TopCollidable};
use crate::ecs::{EntityId, World};
use crate::error::Result;
use crate::math::{Coord2D, Dimension2D};

pub const FLOOR_HEIGHT: f64 = 10.0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FloorArgs {
    floor_width: f64,
    #[serde(default)]
    bounding_box: Option<BoundingBox>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FloorUpdate {
    bounding_box: Option<BoundingBox>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FloorState<'a> {
    floor_width: f64,
    bounding_box: &'a BoundingBox,
}

pub(super) fn builder() -> EntityBuilder {
    EntityBuilder {
        spawn,
        serialize,
        set_from,
        update_interval: |network| network.floor_update_interval_ms,
    }
}

/// Without an explicit box the floor sits centered on the bottom edge of the world.
fn spawn(world: &mut World, id: &EntityId, args: &Value, settings: &EntitySettings) -> Result<()> {
    let args: FloorArgs = parse_args(id, args)?;
    let bounding_box = args.bounding_box.unwrap_or_else(|| {
        BoundingBox::new(
            Coord2D::new(
                settings.world.width / 2.0,
                settings.world.height - FLOOR_HEIGHT / 2.0,
            ),
            Dimension2D::new(args.floor_width, FLOOR_HEIGHT),
            0.0,
        )
    });

    world.insert(id, bounding_box);
    world.insert(id, TopCollidable);
    Ok(())
}

fn serialize(world: &World, id: &EntityId) -> Result<Value> {
    let bounding_box = world.require::<BoundingBox>(id)?;
    let state = FloorState {
        floor_width: bounding_box.dimension.width,
        bounding_box,
    };
    Ok(serde_json::to_value(state)?)
}

fn set_from(world: &mut World, id: &EntityId, args: &Value) -> Result<()> {
    let update: FloorUpdate = parse_args(id, args)?;
    if let Some(bounding_box) = update.bounding_box {
        world.insert(id, bounding_box);
    }
    Ok(())
}
