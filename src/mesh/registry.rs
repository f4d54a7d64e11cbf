use std::collections::HashMap;

use crate::file_transfer::receiver::IncomingTransfer;
use crate::file_transfer::sender::OutboundQueue;
use crate::mesh::peer_link::PeerLink;
use crate::mesh::transport::{DataChannel, PeerConnection};
use crate::signaling::protocol::SessionId;

/// Everything the local session holds for one remote session. Removing the
/// entry releases all of it at once.
pub struct PeerEntry {
    pub link: PeerLink,
    pub connection: Box<dyn PeerConnection>,
    pub channel: Option<Box<dyn DataChannel>>,
    pub incoming: Option<IncomingTransfer>,
    pub outbound: OutboundQueue,
}

impl PeerEntry {
    pub fn new(link: PeerLink, connection: Box<dyn PeerConnection>) -> Self {
        Self {
            link,
            connection,
            channel: None,
            incoming: None,
            outbound: OutboundQueue::new(),
        }
    }

    /// Closes the channel and the connection; transfer state is dropped with `self`.
    pub fn shutdown(mut self) {
        if let Some(mut ch) = self.channel.take() {
            ch.close();
        }
        self.connection.close();
    }
}

/// Arena of peer entries keyed by remote session id. At most one entry per id.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<SessionId, PeerEntry>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry. Refuses (and hands the entry back) if one exists.
    pub fn insert(&mut self, entry: PeerEntry) -> Result<(), PeerEntry> {
        let id = entry.link.remote_id().clone();
        if self.peers.contains_key(&id) {
            return Err(entry);
        }
        self.peers.insert(id, entry);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&PeerEntry> {
        self.peers.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PeerEntry> {
        self.peers.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<PeerEntry> {
        self.peers.remove(id)
    }

    /// Remote ids, sorted for deterministic iteration.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&SessionId, &mut PeerEntry)> {
        self.peers.iter_mut()
    }

    pub fn drain(&mut self) -> Vec<(SessionId, PeerEntry)> {
        self.peers.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
