use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use super::SessionId;
use crate::config::ServerConfig;
use crate::ecs::EntityId;
use crate::systems::InputState;

pub const DEFAULT_ASSIGNMENT_GRACE: Duration = Duration::from_secs(30);

/// Session registry shared between the transport collaborator and the tick.
pub type SharedSessions = Arc<Mutex<SessionManager>>;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub controllable_entities: BTreeSet<EntityId>,
    pub input: InputState,
    pub connected: bool,
    /// A socket has been accepted for this session.
    pub socket_claimed: bool,
    pub assigned_at: Instant,
}

impl Session {
    fn new(id: SessionId, assigned_at: Instant) -> Self {
        Self {
            id,
            controllable_entities: BTreeSet::new(),
            input: InputState::default(),
            connected: false,
            socket_claimed: false,
            assigned_at,
        }
    }
}

/// Outcome of [`SessionManager::claim_socket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketClaim {
    Claimed,
    Unknown,
    AlreadyClaimed,
}

#[derive(Debug)]
pub struct SessionManager {
    sessions: BTreeMap<SessionId, Session>,
    max_sessions: usize,
    assignment_grace: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            max_sessions,
            assignment_grace: DEFAULT_ASSIGNMENT_GRACE,
        }
    }

    /// How long an assigned session may wait for its socket before its slot is reclaimed.
    pub fn with_assignment_grace(mut self, grace: Duration) -> Self {
        self.assignment_grace = grace;
        self
    }

    pub fn shared(max_sessions: usize) -> SharedSessions {
        Arc::new(Mutex::new(Self::new(max_sessions)))
    }

    pub fn shared_from_config(server: &ServerConfig) -> SharedSessions {
        let manager = Self::new(server.max_players)
            .with_assignment_grace(Duration::from_millis(server.session_grace_ms));
        Arc::new(Mutex::new(manager))
    }

    /// Locks a shared registry. A poisoned lock still holds consistent data, so it is recovered.
    pub fn lock(shared: &SharedSessions) -> MutexGuard<'_, SessionManager> {
        shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a fresh session id, or `None` once the registry is full.
    pub fn create_session(&mut self) -> Option<SessionId> {
        self.create_session_at(Instant::now())
    }

    /// Like [`SessionManager::create_session`], reclaiming stale assignments as of `now` first.
    pub fn create_session_at(&mut self, now: Instant) -> Option<SessionId> {
        self.expire_unconnected(now);
        if self.is_full() {
            return None;
        }
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(id.clone(), Session::new(id.clone(), now));
        Some(id)
    }

    /// Drops sessions that never got a socket within the assignment grace period.
    pub fn expire_unconnected(&mut self, now: Instant) -> Vec<SessionId> {
        let grace = self.assignment_grace;
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|session| {
                !session.connected
                    && !session.socket_claimed
                    && now.saturating_duration_since(session.assigned_at) >= grace
            })
            .map(|session| session.id.clone())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
            debug!(session = %id, "unconnected session expired");
        }
        expired
    }

    /// Reserves the session for a single socket.
    pub fn claim_socket(&mut self, id: &str) -> SocketClaim {
        match self.sessions.get_mut(id) {
            None => SocketClaim::Unknown,
            Some(session) if session.socket_claimed || session.connected => SocketClaim::AlreadyClaimed,
            Some(session) => {
                session.socket_claimed = true;
                SocketClaim::Claimed
            }
        }
    }

    /// Registers a session with a caller-chosen id. Returns `false` if full or already present.
    pub fn insert_session(&mut self, id: impl Into<SessionId>) -> bool {
        let id = id.into();
        if self.is_full() || self.sessions.contains_key(&id) {
            return false;
        }
        self.sessions.insert(id.clone(), Session::new(id, Instant::now()));
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    /// Session owning `entity`, if any.
    pub fn owner_of(&self, entity: &EntityId) -> Option<&Session> {
        self.sessions
            .values()
            .find(|session| session.controllable_entities.contains(entity))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }
}
