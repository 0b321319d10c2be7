//! Network synchronization: message taxonomy, codec, and the client and server sides

pub mod client;
pub mod codec;
pub mod delta;
pub mod loopback;
pub mod server;
pub mod session;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ecs::EntityId;
use crate::entities::EntityKind;
use crate::error::TransportError;

pub use client::{ClientMessageProcessor, ClientMessagePublisher};
pub use delta::DeltaTracker;
pub use loopback::LoopbackTransport;
pub use server::{Inbound, Outbound, ServerLink, ServerMessageProcessor, ServerMessagePublisher, ServerMessageReceiver};
pub use session::{Session, SessionManager, SharedSessions, SocketClaim};

/// Opaque session identity handed over by the transport collaborator.
pub type SessionId = String;

/// Wire envelope: `{"type": "...", "body": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    NewEntities(Vec<EntityAddBody>),
    RemoveEntities(Vec<EntityId>),
    UpdateEntities(Vec<EntityUpdateBody>),
    NewInput(String),
    RemoveInput(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAddBody {
    pub id: EntityId,
    pub entity_name: EntityKind,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdateBody {
    pub id: EntityId,
    pub args: Value,
}

/// Client side of a duplex, message-oriented connection.
pub trait Transport: Send {
    fn is_open(&self) -> bool;
    fn send(&mut self, frame: String) -> Result<(), TransportError>;
    /// Frames that arrived since the previous call, oldest first.
    fn receive(&mut self) -> Vec<String>;
}
