//! Game wiring for the server, a networked client, and a standalone local game
//!
//! System order is fixed here: input, facing direction, physics, collision, wall bounds,
//! network update.

use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::ecs::EntityId;
use crate::entities::{EntityFactory, EntityKind, EntitySettings};
use crate::error::Result;
use crate::network::server::{self, spawn_networked, ServerLink};
use crate::network::{ClientMessageProcessor, ServerMessageProcessor, SessionId, SharedSessions, Transport};
use crate::scheduler::Game;
use crate::spatial;
use crate::systems::{
    ClientNetworkUpdate, Collision, FacingDirection, Input, InputHandle, Physics, ServerNetworkUpdate,
    SessionInput, WallBounds,
};

const OUTBOUND_CAPACITY: usize = 1024;

fn factory(config: &Config) -> Result<EntityFactory> {
    let factory = EntityFactory::new(EntitySettings::from(config));
    factory.validate()?;
    Ok(factory)
}

fn with_simulation_systems(game: Game, config: &Config) -> Game {
    game.with_system(FacingDirection::new())
        .with_system(Physics::new(config.physics.gravity))
        .with_system(Collision::new(
            spatial::from_config(&config.world),
            config.physics.gravity,
        ))
        .with_system(WallBounds::new(config.world.width))
}

fn floor_args(config: &Config) -> serde_json::Value {
    json!({ "floorWidth": config.world.width })
}

/// Authoritative game with one floor spanning the bottom of the world. Players are spawned
/// as sessions connect through the returned link.
pub fn server_game(config: &Config, sessions: SharedSessions) -> Result<(Game, ServerLink)> {
    let factory = factory(config)?;
    let (link, receiver, publisher) =
        server::channel(OUTBOUND_CAPACITY, config.network.publish_interval_ms);

    let mut game = Game::new(config.seed)
        .with_system(SessionInput::new(sessions.clone(), config.physics.clone()));
    game = with_simulation_systems(game, config);

    let floor = EntityId::generate();
    spawn_networked(game.world_mut(), &factory, EntityKind::Floor, &floor, &floor_args(config))?;
    info!(entity = %floor, "floor spawned");

    game.add_system(ServerNetworkUpdate::new(
        receiver,
        ServerMessageProcessor::new(sessions, factory),
        publisher,
    ));
    Ok((game, link))
}

/// Predictive client game. Entities arrive from the server over `transport`.
pub fn client_game(
    config: &Config,
    session_id: impl Into<SessionId>,
    transport: Box<dyn Transport>,
    input: InputHandle,
) -> Result<Game> {
    let session_id = session_id.into();
    let processor = ClientMessageProcessor::new(
        session_id.clone(),
        factory(config)?,
        config.network.reconcile_threshold,
    );

    let game = Game::new(config.seed).with_system(Input::new(
        session_id,
        input.clone(),
        config.physics.clone(),
    ));
    let mut game = with_simulation_systems(game, config);
    game.add_system(ClientNetworkUpdate::new(transport, processor).with_input(input));
    Ok(game)
}

/// Offline game with one floor and one uncontrolled player dropped onto it.
pub fn local_game(config: &Config) -> Result<(Game, EntityId)> {
    let factory = factory(config)?;
    let mut game = with_simulation_systems(Game::new(config.seed), config);

    factory.build(game.world_mut(), EntityKind::Floor, &EntityId::generate(), &floor_args(config))?;
    let player = EntityId::generate();
    factory.build(game.world_mut(), EntityKind::Player, &player, &json!({}))?;
    Ok((game, player))
}
