//! Client side: apply server messages locally and batch outgoing ones

use tracing::{debug, warn};

use super::codec::{decode_batch, encode};
use super::{EntityAddBody, EntityUpdateBody, Message, SessionId, Transport};
use crate::components::{BoundingBox, Control, NetworkUpdateable};
use crate::ecs::{EntityId, World};
use crate::entities::EntityFactory;
use crate::error::{Result, SimError};

/// Decodes every frame that arrived on `transport`. Undecodable frames are logged and dropped.
pub fn receive_messages(transport: &mut dyn Transport) -> Vec<Message> {
    let mut messages = Vec::new();
    for frame in transport.receive() {
        match decode_batch(&frame) {
            Ok(batch) => messages.extend(batch),
            Err(err) => warn!(error = %err, "dropping malformed frame from server"),
        }
    }
    messages
}

/// Applies server messages to the local world.
pub struct ClientMessageProcessor {
    session_id: SessionId,
    factory: EntityFactory,
    reconcile_threshold: f64,
}

impl ClientMessageProcessor {
    pub fn new(session_id: impl Into<SessionId>, factory: EntityFactory, reconcile_threshold: f64) -> Self {
        Self {
            session_id: session_id.into(),
            factory,
            reconcile_threshold,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn factory(&self) -> &EntityFactory {
        &self.factory
    }

    pub fn process(&self, world: &mut World, message: Message) -> Result<()> {
        match message {
            Message::NewEntities(bodies) => {
                for body in bodies {
                    self.add_entity(world, body)?;
                }
            }
            Message::RemoveEntities(ids) => {
                for id in ids {
                    if world.remove_entity(&id).is_none() {
                        debug!(entity = %id, "remove for unknown entity");
                    }
                }
            }
            Message::UpdateEntities(updates) => {
                for update in updates {
                    self.update_entity(world, update)?;
                }
            }
            Message::NewInput(_) | Message::RemoveInput(_) => {
                warn!("input messages are only meaningful to the server");
            }
        }
        Ok(())
    }

    fn add_entity(&self, world: &mut World, body: EntityAddBody) -> Result<()> {
        let EntityAddBody { id, entity_name, args } = body;
        match self.factory.build(world, entity_name, &id, &args) {
            Ok(()) => {}
            Err(SimError::InvalidArgs { entity, reason }) => {
                warn!(entity = %entity, kind = %entity_name, reason = %reason, "dropping entity with invalid args");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        if self.is_local(world, &id) {
            // Locally owned entities are authoritative here and flow back to the server.
            let interval = self.factory.update_interval(entity_name)?;
            world.insert(&id, NetworkUpdateable::new(interval));
        }
        Ok(())
    }

    /// Server state for locally owned entities is ignored. For everything else, a small
    /// positional drift is kept so remote entities do not jitter between snapshots.
    fn update_entity(&self, world: &mut World, update: EntityUpdateBody) -> Result<()> {
        let EntityUpdateBody { id, args } = update;
        if !world.contains(&id) {
            debug!(entity = %id, "update for unknown entity");
            return Ok(());
        }
        if self.is_local(world, &id) {
            return Ok(());
        }

        let local_center = world.get::<BoundingBox>(&id).map(|bounds| bounds.center);
        match self.factory.set_from(world, &id, &args) {
            Ok(()) => {}
            Err(SimError::InvalidArgs { entity, reason }) => {
                warn!(entity = %entity, reason = %reason, "dropping invalid update");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        if let (Some(local), Some(bounds)) = (local_center, world.get_mut::<BoundingBox>(&id)) {
            if local.distance(bounds.center) < self.reconcile_threshold {
                bounds.center = local;
            }
        }
        Ok(())
    }

    fn is_local(&self, world: &World, id: &EntityId) -> bool {
        world
            .get::<Control>(id)
            .is_some_and(|control| control.is_owned_by(&self.session_id))
    }
}

/// Queues messages between flushes.
#[derive(Debug, Default)]
pub struct ClientMessagePublisher {
    queue: Vec<Message>,
}

impl ClientMessagePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: Message) {
        self.queue.push(message);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Sends every queued message as its own frame. Messages are dropped, not retried, when
    /// the transport is closed or a send fails. Returns the number of frames sent.
    pub fn publish(&mut self, transport: &mut dyn Transport) -> Result<usize> {
        let queue = std::mem::take(&mut self.queue);
        if queue.is_empty() {
            return Ok(0);
        }
        if !transport.is_open() {
            debug!(dropped = queue.len(), "transport closed, dropping outgoing messages");
            return Ok(0);
        }
        let total = queue.len();
        for (sent, message) in queue.iter().enumerate() {
            if let Err(err) = transport.send(encode(message)?) {
                warn!(error = %err, dropped = total - sent, "failed to send to server");
                return Ok(sent);
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::TransportError;
    use crate::math::Coord2D;

    #[derive(Default)]
    struct RecordingTransport {
        open: bool,
        sent: Vec<String>,
        incoming: Vec<String>,
    }

    impl Transport for RecordingTransport {
        fn is_open(&self) -> bool {
            self.open
        }

        fn send(&mut self, frame: String) -> Result<(), TransportError> {
            self.sent.push(frame);
            Ok(())
        }

        fn receive(&mut self) -> Vec<String> {
            std::mem::take(&mut self.incoming)
        }
    }

    fn player_body(id: &str, owner: &str, x: f64) -> EntityAddBody {
        EntityAddBody {
            id: EntityId::new(id),
            entity_name: crate::entities::EntityKind::Player,
            args: json!({
                "control": { "controllableBy": owner },
                "boundingBox": { "center": { "x": x, "y": 100.0 }, "dimension": { "width": 64.0, "height": 64.0 }, "rotation": 0.0 }
            }),
        }
    }

    #[test]
    fn test_only_local_entities_become_publishers() {
        let processor = ClientMessageProcessor::new("me", EntityFactory::default(), 5.0);
        let mut world = World::new();
        processor
            .process(
                &mut world,
                Message::NewEntities(vec![player_body("mine", "me", 300.0), player_body("theirs", "you", 300.0)]),
            )
            .unwrap();

        assert!(world.has::<NetworkUpdateable>(&EntityId::new("mine")));
        assert!(!world.has::<NetworkUpdateable>(&EntityId::new("theirs")));
    }

    #[test]
    fn test_updates_for_local_entities_are_ignored() {
        let processor = ClientMessageProcessor::new("me", EntityFactory::default(), 5.0);
        let mut world = World::new();
        processor
            .process(&mut world, Message::NewEntities(vec![player_body("mine", "me", 300.0)]))
            .unwrap();

        let update = EntityUpdateBody {
            id: EntityId::new("mine"),
            args: player_body("mine", "me", 500.0).args,
        };
        processor.process(&mut world, Message::UpdateEntities(vec![update])).unwrap();
        let center = world.get::<BoundingBox>(&EntityId::new("mine")).unwrap().center;
        assert_eq!(center, Coord2D::new(300.0, 100.0));
    }

    #[test]
    fn test_small_drift_keeps_local_position() {
        let processor = ClientMessageProcessor::new("me", EntityFactory::default(), 5.0);
        let mut world = World::new();
        processor
            .process(&mut world, Message::NewEntities(vec![player_body("other", "you", 300.0)]))
            .unwrap();
        let id = EntityId::new("other");

        let nudge = EntityUpdateBody { id: id.clone(), args: player_body("other", "you", 302.0).args };
        processor.process(&mut world, Message::UpdateEntities(vec![nudge])).unwrap();
        assert_eq!(world.get::<BoundingBox>(&id).unwrap().center.x, 300.0);

        let jump = EntityUpdateBody { id: id.clone(), args: player_body("other", "you", 340.0).args };
        processor.process(&mut world, Message::UpdateEntities(vec![jump])).unwrap();
        assert_eq!(world.get::<BoundingBox>(&id).unwrap().center.x, 340.0);
    }

    #[test]
    fn test_remove_and_unknown_update() {
        let processor = ClientMessageProcessor::new("me", EntityFactory::default(), 5.0);
        let mut world = World::new();
        processor
            .process(&mut world, Message::NewEntities(vec![player_body("other", "you", 300.0)]))
            .unwrap();
        processor
            .process(&mut world, Message::RemoveEntities(vec![EntityId::new("other"), EntityId::new("ghost")]))
            .unwrap();
        assert_eq!(world.entity_count(), 0);

        let update = EntityUpdateBody { id: EntityId::new("other"), args: json!({}) };
        assert!(processor.process(&mut world, Message::UpdateEntities(vec![update])).is_ok());
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_invalid_floor_is_dropped() {
        let processor = ClientMessageProcessor::new("me", EntityFactory::default(), 5.0);
        let mut world = World::new();
        let body = EntityAddBody {
            id: EntityId::new("f"),
            entity_name: crate::entities::EntityKind::Floor,
            args: json!({}),
        };
        processor.process(&mut world, Message::NewEntities(vec![body])).unwrap();
        assert!(!world.contains(&EntityId::new("f")));
    }

    #[test]
    fn test_invalid_new_for_known_entity_keeps_it() {
        let processor = ClientMessageProcessor::new("me", EntityFactory::default(), 5.0);
        let mut world = World::new();
        let add = |args| {
            Message::NewEntities(vec![EntityAddBody {
                id: EntityId::new("f"),
                entity_name: crate::entities::EntityKind::Floor,
                args,
            }])
        };
        processor.process(&mut world, add(json!({ "floorWidth": 300.0 }))).unwrap();
        processor.process(&mut world, add(json!({ "floorWidth": [1, 2] }))).unwrap();
        assert!(world.contains(&EntityId::new("f")));
        assert!(world.has::<crate::components::TopCollidable>(&EntityId::new("f")));
    }

    #[test]
    fn test_publisher_sends_one_frame_per_message() {
        let mut publisher = ClientMessagePublisher::new();
        let mut transport = RecordingTransport { open: true, ..Default::default() };
        publisher.add_message(Message::NewInput("w".into()));
        publisher.add_message(Message::RemoveInput("w".into()));
        assert_eq!(publisher.publish(&mut transport).unwrap(), 2);
        assert_eq!(
            transport.sent,
            vec![
                r#"{"body":"w","type":"NEW_INPUT"}"#.to_string(),
                r#"{"body":"w","type":"REMOVE_INPUT"}"#.to_string(),
            ]
        );
        assert_eq!(publisher.pending(), 0);
    }

    #[test]
    fn test_closed_transport_drops_queue() {
        let mut publisher = ClientMessagePublisher::new();
        let mut transport = RecordingTransport::default();
        publisher.add_message(Message::NewInput("w".into()));
        assert_eq!(publisher.publish(&mut transport).unwrap(), 0);
        assert!(transport.sent.is_empty());
        assert_eq!(publisher.pending(), 0);
    }

    #[test]
    fn test_receive_skips_bad_frames() {
        let mut transport = RecordingTransport {
            open: true,
            incoming: vec![
                "not json".to_string(),
                r#"[{"type":"REMOVE_ENTITIES","body":["a"]}]"#.to_string(),
            ],
            ..Default::default()
        };
        let messages = receive_messages(&mut transport);
        assert_eq!(messages, vec![Message::RemoveEntities(vec![EntityId::new("a")])]);
    }
}
