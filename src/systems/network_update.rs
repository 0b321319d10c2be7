//! Network sync systems, registered last so they see the tick's final state

use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::input::InputHandle;
use crate::ecs::World;
use crate::error::Result;
use crate::network::client::receive_messages;
use crate::network::{
    ClientMessageProcessor, ClientMessagePublisher, DeltaTracker, Message, ServerMessageProcessor,
    ServerMessagePublisher, ServerMessageReceiver, Transport,
};
use crate::scheduler::{System, SystemContext};

/// Applies inbound server state, then sends local input and changed local entities.
pub struct ClientNetworkUpdate {
    transport: Box<dyn Transport>,
    processor: ClientMessageProcessor,
    publisher: ClientMessagePublisher,
    tracker: DeltaTracker,
    input: Option<InputHandle>,
}

impl ClientNetworkUpdate {
    pub fn new(transport: Box<dyn Transport>, processor: ClientMessageProcessor) -> Self {
        Self {
            transport,
            processor,
            publisher: ClientMessagePublisher::new(),
            tracker: DeltaTracker::new(),
            input: None,
        }
    }

    /// Forwards key transitions from `input` to the server.
    pub fn with_input(mut self, input: InputHandle) -> Self {
        self.input = Some(input);
        self
    }
}

impl System for ClientNetworkUpdate {
    fn name(&self) -> &str {
        "network_update"
    }

    fn run(&mut self, ctx: &SystemContext, world: &mut World, rng: &mut ChaCha8Rng) -> Result<()> {
        for message in receive_messages(self.transport.as_mut()) {
            self.processor.process(world, message)?;
        }

        if let Some(input) = &self.input {
            for message in input.take_messages() {
                self.publisher.add_message(message);
            }
        }

        let updates = self
            .tracker
            .due_updates(world, self.processor.factory(), ctx.dt, rng)?;
        if !updates.is_empty() {
            self.publisher.add_message(Message::UpdateEntities(updates));
        }

        self.publisher.publish(self.transport.as_mut())?;
        Ok(())
    }
}

/// Applies buffered client events, queues changed entities, and flushes on the publish interval.
pub struct ServerNetworkUpdate {
    receiver: ServerMessageReceiver,
    processor: ServerMessageProcessor,
    publisher: ServerMessagePublisher,
    tracker: DeltaTracker,
}

impl ServerNetworkUpdate {
    pub fn new(
        receiver: ServerMessageReceiver,
        processor: ServerMessageProcessor,
        publisher: ServerMessagePublisher,
    ) -> Self {
        Self {
            receiver,
            processor,
            publisher,
            tracker: DeltaTracker::new(),
        }
    }
}

impl System for ServerNetworkUpdate {
    fn name(&self) -> &str {
        "network_update"
    }

    fn run(&mut self, ctx: &SystemContext, world: &mut World, rng: &mut ChaCha8Rng) -> Result<()> {
        let inbound = self.receiver.drain();
        if !inbound.is_empty() {
            debug!(tick = ctx.tick, count = inbound.len(), "applying inbound messages");
        }
        for message in inbound {
            self.processor.process(world, message, &mut self.publisher)?;
        }

        for update in self
            .tracker
            .due_updates(world, self.processor.factory(), ctx.dt, rng)?
        {
            self.publisher.queue_update(update);
        }

        self.publisher.publish(ctx.dt, rng)?;
        Ok(())
    }
}
