//! Authoritative side: session lifecycle, client authority checks, throttled broadcast

use std::collections::BTreeMap;

use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::codec::{decode_message, encode};
use super::{EntityAddBody, EntityUpdateBody, Message, SessionId, SessionManager, SharedSessions};
use crate::components::NetworkUpdateable;
use crate::ecs::{EntityId, World};
use crate::entities::{EntityFactory, EntityKind};
use crate::error::Result;
use crate::rng::JitterRange;

/// Events the transport collaborator hands to the tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Connected(SessionId),
    Disconnected(SessionId),
    Frame(SessionId, String),
}

/// One encoded frame. `target: None` goes to every connected session.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Option<SessionId>,
    pub frame: String,
}

impl Outbound {
    pub fn is_for(&self, session_id: &str) -> bool {
        self.target.as_deref().map_or(true, |target| target == session_id)
    }
}

/// Cloneable handle the transport uses to reach the server tick.
#[derive(Debug, Clone)]
pub struct ServerLink {
    pub inbound: mpsc::UnboundedSender<Inbound>,
    pub outbound: broadcast::Sender<Outbound>,
}

impl ServerLink {
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound.subscribe()
    }
}

/// Creates the channel pair between transport and tick.
pub fn channel(
    outbound_capacity: usize,
    publish_interval: JitterRange,
) -> (ServerLink, ServerMessageReceiver, ServerMessagePublisher) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, _) = broadcast::channel(outbound_capacity);
    let link = ServerLink {
        inbound: inbound_tx,
        outbound: outbound_tx.clone(),
    };
    (
        link,
        ServerMessageReceiver { inbound: inbound_rx },
        ServerMessagePublisher::new(outbound_tx, publish_interval),
    )
}

/// Buffers inbound events until the tick drains them.
pub struct ServerMessageReceiver {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl ServerMessageReceiver {
    pub fn drain(&mut self) -> Vec<Inbound> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbound.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Batches outbound messages and flushes them on its own jittered interval.
pub struct ServerMessagePublisher {
    outbound: broadcast::Sender<Outbound>,
    broadcasts: Vec<Message>,
    direct: Vec<(SessionId, Message)>,
    updates: BTreeMap<EntityId, Value>,
    publish_interval: JitterRange,
    next_publish_in_ms: f64,
}

impl ServerMessagePublisher {
    pub fn new(outbound: broadcast::Sender<Outbound>, publish_interval: JitterRange) -> Self {
        Self {
            outbound,
            broadcasts: Vec::new(),
            direct: Vec::new(),
            updates: BTreeMap::new(),
            publish_interval,
            next_publish_in_ms: 0.0,
        }
    }

    pub fn broadcast(&mut self, message: Message) {
        self.broadcasts.push(message);
    }

    pub fn send_to(&mut self, session_id: impl Into<SessionId>, message: Message) {
        self.direct.push((session_id.into(), message));
    }

    /// Queues an entity update. A later update for the same entity replaces the earlier one.
    pub fn queue_update(&mut self, update: EntityUpdateBody) {
        self.updates.insert(update.id, update.args);
    }

    /// Drops pending updates for entities that no longer exist.
    pub fn forget(&mut self, ids: &[EntityId]) {
        for id in ids {
            self.updates.remove(id);
        }
    }

    pub fn pending(&self) -> usize {
        self.broadcasts.len() + self.direct.len() + self.updates.len()
    }

    /// Advances the flush timer by `dt`. When it elapses, every pending message goes out:
    /// direct messages as their own frames, everything else as one broadcast frame whose
    /// entity updates are merged into a single `UPDATE_ENTITIES`.
    ///
    /// Returns the number of frames handed to the channel.
    pub fn publish<R: Rng + ?Sized>(&mut self, dt: f64, rng: &mut R) -> Result<usize> {
        self.next_publish_in_ms -= dt;
        if self.next_publish_in_ms > 0.0 {
            return Ok(0);
        }
        self.next_publish_in_ms = self.publish_interval.sample(rng);

        let mut frames = Vec::new();
        for (session_id, message) in self.direct.drain(..) {
            frames.push(Outbound {
                target: Some(session_id),
                frame: encode(&[message])?,
            });
        }

        let mut batch = std::mem::take(&mut self.broadcasts);
        if !self.updates.is_empty() {
            let updates = std::mem::take(&mut self.updates)
                .into_iter()
                .map(|(id, args)| EntityUpdateBody { id, args })
                .collect();
            batch.push(Message::UpdateEntities(updates));
        }
        if !batch.is_empty() {
            frames.push(Outbound {
                target: None,
                frame: encode(&batch)?,
            });
        }

        let sent = frames.len();
        for frame in frames {
            if self.outbound.send(frame).is_err() {
                debug!("no subscribers, dropping outbound frame");
            }
        }
        Ok(sent)
    }
}

/// Registers an entity the server owns and syncs, e.g. level geometry at startup.
pub fn spawn_networked(
    world: &mut World,
    factory: &EntityFactory,
    kind: EntityKind,
    id: &EntityId,
    args: &Value,
) -> Result<()> {
    factory.build(world, kind, id, args)?;
    world.insert(id, NetworkUpdateable::new(factory.update_interval(kind)?));
    Ok(())
}

/// Applies inbound events to the world and the session registry.
pub struct ServerMessageProcessor {
    sessions: SharedSessions,
    factory: EntityFactory,
}

impl ServerMessageProcessor {
    pub fn new(sessions: SharedSessions, factory: EntityFactory) -> Self {
        Self { sessions, factory }
    }

    pub fn factory(&self) -> &EntityFactory {
        &self.factory
    }

    pub fn process(
        &self,
        world: &mut World,
        inbound: Inbound,
        publisher: &mut ServerMessagePublisher,
    ) -> Result<()> {
        match inbound {
            Inbound::Connected(session_id) => self.connect(world, session_id, publisher),
            Inbound::Disconnected(session_id) => {
                self.disconnect(world, &session_id, publisher);
                Ok(())
            }
            Inbound::Frame(session_id, frame) => match decode_message(&frame) {
                Ok(message) => {
                    self.apply_client_message(world, &session_id, message);
                    Ok(())
                }
                Err(err) => {
                    warn!(session = %session_id, error = %err, "dropping malformed message");
                    Ok(())
                }
            },
        }
    }

    /// Spawns the session's player. Everyone hears about the new player; the newcomer
    /// additionally gets a snapshot of everything that already existed.
    fn connect(
        &self,
        world: &mut World,
        session_id: SessionId,
        publisher: &mut ServerMessagePublisher,
    ) -> Result<()> {
        let mut sessions = SessionManager::lock(&self.sessions);
        let Some(session) = sessions.get_mut(&session_id) else {
            warn!(session = %session_id, "connection for unknown session ignored");
            return Ok(());
        };
        if session.connected {
            debug!(session = %session_id, "session already connected");
            return Ok(());
        }

        let mut snapshot = Vec::new();
        let existing: Vec<(EntityId, EntityKind)> =
            world.entities().map(|(id, kind)| (id.clone(), kind)).collect();
        for (id, kind) in existing {
            snapshot.push(EntityAddBody {
                args: self.factory.serialize(world, &id)?,
                id,
                entity_name: kind,
            });
        }

        let player = EntityId::generate();
        spawn_networked(
            world,
            &self.factory,
            EntityKind::Player,
            &player,
            &json!({ "control": { "controllableBy": session_id } }),
        )?;
        session.connected = true;
        session.controllable_entities.insert(player.clone());

        publisher.broadcast(Message::NewEntities(vec![EntityAddBody {
            args: self.factory.serialize(world, &player)?,
            id: player.clone(),
            entity_name: EntityKind::Player,
        }]));
        if !snapshot.is_empty() {
            publisher.send_to(session_id.clone(), Message::NewEntities(snapshot));
        }
        info!(session = %session_id, entity = %player, "session connected");
        Ok(())
    }

    fn disconnect(&self, world: &mut World, session_id: &str, publisher: &mut ServerMessagePublisher) {
        let Some(session) = SessionManager::lock(&self.sessions).remove(session_id) else {
            debug!(session = %session_id, "disconnect for unknown session");
            return;
        };

        let removed: Vec<EntityId> = session
            .controllable_entities
            .into_iter()
            .filter(|id| world.remove_entity(id).is_some())
            .collect();
        if !removed.is_empty() {
            publisher.forget(&removed);
            publisher.broadcast(Message::RemoveEntities(removed));
        }
        info!(session = %session_id, "session disconnected");
    }

    fn apply_client_message(&self, world: &mut World, session_id: &str, message: Message) {
        let mut sessions = SessionManager::lock(&self.sessions);
        let Some(session) = sessions.get_mut(session_id) else {
            debug!(session = %session_id, "message from unknown session");
            return;
        };

        match message {
            Message::NewInput(key) => {
                session.input.key_pressed(&key);
            }
            Message::RemoveInput(key) => {
                session.input.key_released(&key);
            }
            Message::UpdateEntities(updates) => {
                for EntityUpdateBody { id, args } in updates {
                    let owner = sessions.owner_of(&id).map(|owner| owner.id.as_str());
                    if owner != Some(session_id) {
                        warn!(session = %session_id, entity = %id, "update for entity not owned by session rejected");
                        continue;
                    }
                    if !world.contains(&id) {
                        debug!(entity = %id, "update for removed entity");
                        continue;
                    }
                    if let Err(err) = self.factory.set_from(world, &id, &args) {
                        warn!(session = %session_id, entity = %id, error = %err, "dropping invalid update");
                    }
                }
            }
            Message::NewEntities(_) | Message::RemoveEntities(_) => {
                warn!(session = %session_id, "clients may not create or remove entities");
            }
        }
    }
}
