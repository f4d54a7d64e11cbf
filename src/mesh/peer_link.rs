use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::media::track::{LocalTrack, TrackKind};
use crate::mesh::link_state::{LinkState, Role};
use crate::mesh::transport::IceCandidate;
use crate::signaling::protocol::SessionId;

#[derive(Debug, Clone)]
struct PendingCandidate {
    candidate: IceCandidate,
    received_at: Instant,
}

/// Negotiation bookkeeping for one remote session.
#[derive(Debug)]
pub struct PeerLink {
    remote_id: SessionId,
    role: Role,
    state: LinkState,
    has_remote_description: bool,
    local_description_sent: bool,
    renegotiate_pending: bool,
    ever_stable: bool,
    /// Remote candidates that arrived before any remote description.
    pending_remote: Vec<PendingCandidate>,
    /// Local candidates gathered before our first description went out.
    held_local: Vec<IceCandidate>,
    outgoing: HashMap<TrackKind, Arc<LocalTrack>>,
}

impl PeerLink {
    pub fn new(remote_id: SessionId, role: Role) -> Self {
        Self {
            remote_id,
            role,
            state: LinkState::New,
            has_remote_description: false,
            local_description_sent: false,
            renegotiate_pending: false,
            ever_stable: false,
            pending_remote: Vec::new(),
            held_local: Vec::new(),
            outgoing: HashMap::new(),
        }
    }

    pub fn remote_id(&self) -> &SessionId {
        &self.remote_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Moves to `to` if the state machine allows it.
    pub fn transition(&mut self, to: LinkState) -> bool {
        if !self.state.can_transition(to) {
            return false;
        }
        self.state = to;
        if to == LinkState::Stable {
            self.ever_stable = true;
        }
        true
    }

    pub fn has_remote_description(&self) -> bool {
        self.has_remote_description
    }

    pub fn mark_remote_description(&mut self) {
        self.has_remote_description = true;
    }

    pub fn local_description_sent(&self) -> bool {
        self.local_description_sent
    }

    /// Records that a description went out; returns the candidates held
    /// until now, in gathering order.
    pub fn mark_local_description_sent(&mut self) -> Vec<IceCandidate> {
        self.local_description_sent = true;
        std::mem::take(&mut self.held_local)
    }

    pub fn hold_local(&mut self, candidate: IceCandidate) {
        self.held_local.push(candidate);
    }

    pub fn renegotiate_pending(&self) -> bool {
        self.renegotiate_pending
    }

    pub fn set_renegotiate_pending(&mut self, pending: bool) {
        self.renegotiate_pending = pending;
    }

    /// Returns the flag and clears it.
    pub fn take_renegotiate_pending(&mut self) -> bool {
        std::mem::take(&mut self.renegotiate_pending)
    }

    pub fn ever_stable(&self) -> bool {
        self.ever_stable
    }

    pub fn queue_remote_candidate(&mut self, candidate: IceCandidate, now: Instant) {
        self.pending_remote.push(PendingCandidate {
            candidate,
            received_at: now,
        });
    }

    pub fn pending_remote_len(&self) -> usize {
        self.pending_remote.len()
    }

    /// Empties the pending queue. Returns the candidates younger than `ttl`
    /// in arrival order, and how many were dropped as expired.
    pub fn take_pending(&mut self, now: Instant, ttl: Duration) -> (Vec<IceCandidate>, usize) {
        let mut expired = 0;
        let fresh = std::mem::take(&mut self.pending_remote)
            .into_iter()
            .filter_map(|p| {
                if now.saturating_duration_since(p.received_at) > ttl {
                    expired += 1;
                    None
                } else {
                    Some(p.candidate)
                }
            })
            .collect();
        (fresh, expired)
    }

    /// Drops queued candidates older than `ttl`; returns how many.
    pub fn expire_pending(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.pending_remote.len();
        self.pending_remote
            .retain(|p| now.saturating_duration_since(p.received_at) <= ttl);
        before - self.pending_remote.len()
    }

    pub fn outgoing(&self, kind: TrackKind) -> Option<&Arc<LocalTrack>> {
        self.outgoing.get(&kind)
    }

    pub fn set_outgoing(&mut self, track: Arc<LocalTrack>) {
        self.outgoing.insert(track.kind(), track);
    }

    pub fn clear_outgoing(&mut self, kind: TrackKind) -> Option<Arc<LocalTrack>> {
        self.outgoing.remove(&kind)
    }
}
