use std::collections::{BTreeSet, HashMap};

use log::warn;

use conduit_shared::{PeerId, SessionId};

use crate::ConduitServerError;

/// Bidirectional map between transport peers and the session ids the
/// application sees.
///
/// Ids are always the smallest positive value not currently assigned, so a
/// freed id is handed out again on the very next connect. Id 0 is reserved
/// for "unbound" and never assigned.
pub struct SessionTable {
    peers: HashMap<SessionId, PeerId>,
    sessions: HashMap<PeerId, SessionId>,
    /// Freed ids below `next_fresh`
    released: BTreeSet<u32>,
    /// Smallest id never handed out; u64 so it can step past `u32::MAX`
    next_fresh: u64,
    max_id: u32,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::with_max_id(u32::MAX)
    }

    /// A table that refuses to assign ids greater than `max_id`
    pub fn with_max_id(max_id: u32) -> Self {
        Self {
            peers: HashMap::new(),
            sessions: HashMap::new(),
            released: BTreeSet::new(),
            next_fresh: 1,
            max_id,
        }
    }

    /// Assigns a session id to a newly connected `peer`. A peer that is
    /// already mapped keeps its existing id.
    pub fn connect(&mut self, peer: PeerId) -> Result<SessionId, ConduitServerError> {
        if let Some(session_id) = self.sessions.get(&peer) {
            warn!("{} connected twice, keeping {}", peer, session_id);
            return Ok(*session_id);
        }

        let session_id = SessionId::new(self.allocate()?);
        self.peers.insert(session_id, peer);
        self.sessions.insert(peer, session_id);
        Ok(session_id)
    }

    /// Removes the mapping for `peer`, returning the id it held
    pub fn remove_peer(&mut self, peer: &PeerId) -> Option<SessionId> {
        let session_id = self.sessions.remove(peer)?;
        self.peers.remove(&session_id);
        self.release(session_id.value());
        Some(session_id)
    }

    /// Removes the mapping for `session_id`, returning the peer it belonged to
    pub fn remove_session(&mut self, session_id: &SessionId) -> Option<PeerId> {
        let peer = self.peers.remove(session_id)?;
        self.sessions.remove(&peer);
        self.release(session_id.value());
        Some(peer)
    }

    pub fn peer(&self, session_id: &SessionId) -> Option<PeerId> {
        self.peers.get(session_id).copied()
    }

    pub fn session(&self, peer: &PeerId) -> Option<SessionId> {
        self.sessions.get(peer).copied()
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.peers.contains_key(session_id)
    }

    pub fn session_ids(&self) -> impl Iterator<Item = &SessionId> {
        self.peers.keys()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    fn allocate(&mut self) -> Result<u32, ConduitServerError> {
        if let Some(id) = self.released.pop_first() {
            return Ok(id);
        }
        if self.next_fresh > u64::from(self.max_id) {
            return Err(ConduitServerError::SessionIdExhausted { max: self.max_id });
        }
        let id = self.next_fresh as u32;
        self.next_fresh += 1;
        Ok(id)
    }

    fn release(&mut self, id: u32) {
        self.released.insert(id);
        // keep the free set small by folding a freed tail back into the fresh range
        while self.next_fresh > 1 && self.released.remove(&((self.next_fresh - 1) as u32)) {
            self.next_fresh -= 1;
        }
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
