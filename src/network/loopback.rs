//! In-process transport wired straight to a server's channels

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast;
use tracing::warn;

use super::server::{Inbound, Outbound, ServerLink};
use super::{SessionId, Transport};
use crate::error::TransportError;

/// Client transport for a server running in the same process. Used by headless
/// simulations and tests in place of a WebSocket.
pub struct LoopbackTransport {
    session_id: SessionId,
    link: ServerLink,
    outbound: broadcast::Receiver<Outbound>,
    open: bool,
}

impl LoopbackTransport {
    /// Subscribes to the server's outbound frames and announces the session.
    pub fn connect(link: &ServerLink, session_id: impl Into<SessionId>) -> Result<Self, TransportError> {
        let session_id = session_id.into();
        let outbound = link.subscribe();
        link.inbound
            .send(Inbound::Connected(session_id.clone()))
            .map_err(|_| TransportError::Closed)?;
        Ok(Self {
            session_id,
            link: link.clone(),
            outbound,
            open: true,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        // The server may already be gone; nothing left to tell it then.
        let _ = self
            .link
            .inbound
            .send(Inbound::Disconnected(self.session_id.clone()));
    }
}

impl Transport for LoopbackTransport {
    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.link
            .inbound
            .send(Inbound::Frame(self.session_id.clone(), frame))
            .map_err(|_| TransportError::Closed)
    }

    fn receive(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        if !self.open {
            return frames;
        }
        loop {
            match self.outbound.try_recv() {
                Ok(outbound) if outbound.is_for(&self.session_id) => frames.push(outbound.frame),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(session = %self.session_id, skipped, "client fell behind, frames lost");
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    self.open = false;
                    break;
                }
            }
        }
        frames
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.close();
    }
}
