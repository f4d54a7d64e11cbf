use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::MeshSettings;
use crate::log::log_sink::LogSink;
use crate::media::RenegotiationPolicy;
use crate::media::track::{OutgoingTracks, TrackKind};
use crate::mesh::errors::NegotiationError;
use crate::mesh::link_state::{LinkState, Role};
use crate::mesh::peer_link::PeerLink;
use crate::mesh::registry::{PeerEntry, PeerRegistry};
use crate::mesh::transport::{
    DataChannel, IceCandidate, PeerConnection, PeerConnectionFactory, SdpKind, SessionDescription,
};
use crate::signaling::protocol::{SessionId, SignalingMsg};
use crate::signaling_client::SignalingOutbox;
use crate::{sink_debug, sink_info, sink_trace, sink_warn};

/// Label of the data channel the initiator opens on every link.
pub const FILE_CHANNEL_LABEL: &str = "file-transfer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    PeerLeft,
    LocalLeave,
    NegotiationFailed(String),
    ConnectionFailed(String),
}

/// What the coordinator reports to the session after handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    /// The link reached `stable` for the first time.
    PeerConnected { session_id: SessionId },
    /// A later offer/answer round completed on an existing link.
    Renegotiated { session_id: SessionId },
    PeerClosed {
        session_id: SessionId,
        reason: CloseReason,
    },
    RemoteTrack {
        session_id: SessionId,
        kind: TrackKind,
        label: String,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct TrackDelta {
    changed: bool,
    topology: bool,
}

/// Builds, negotiates and tears down one peer link per remote session.
///
/// All methods run on the session's event-loop thread; nothing here blocks.
/// Outbound signaling goes through the outbox handed in at construction.
pub struct MeshCoordinator {
    local_id: SessionId,
    registry: PeerRegistry,
    outbox: Arc<dyn SignalingOutbox>,
    factory: Box<dyn PeerConnectionFactory>,
    settings: MeshSettings,
    events: Vec<MeshEvent>,
    log: Arc<dyn LogSink>,
}

impl MeshCoordinator {
    pub fn new(
        local_id: SessionId,
        outbox: Arc<dyn SignalingOutbox>,
        factory: Box<dyn PeerConnectionFactory>,
        settings: MeshSettings,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            local_id,
            registry: PeerRegistry::new(),
            outbox,
            factory,
            settings,
            events: Vec::new(),
            log,
        }
    }

    pub fn local_id(&self) -> &SessionId {
        &self.local_id
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PeerRegistry {
        &mut self.registry
    }

    pub fn link_state(&self, remote_id: &str) -> Option<LinkState> {
        self.registry.get(remote_id).map(|e| e.link.state())
    }

    pub fn peer_ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    /// Events accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<MeshEvent> {
        std::mem::take(&mut self.events)
    }

    /// The lexicographically smaller id is the polite side of a glare.
    fn is_polite_toward(&self, remote_id: &str) -> bool {
        self.local_id.as_str() < remote_id
    }

    // ---- Relay events ----------------------------------------------------

    /// Room joined: offer to every member already there.
    pub fn on_all_users(&mut self, session_ids: &[SessionId], tracks: &OutgoingTracks) {
        for id in session_ids {
            if *id == self.local_id {
                continue;
            }
            if self.registry.contains(id) {
                sink_debug!(self.log, "already linked to {}; reusing", id);
                continue;
            }
            match self.open_link(id, Role::Initiator, tracks) {
                Ok(()) => self.start_offer(id),
                Err(e) => sink_warn!(self.log, "could not open link to {}: {}", id, e),
            }
        }
    }

    pub fn on_offer(&mut self, from: &SessionId, sdp: Vec<u8>, tracks: &OutgoingTracks) {
        let offer = match SessionDescription::from_payload(SdpKind::Offer, sdp) {
            Ok(o) => o,
            Err(e) => {
                self.fail_link(from, e);
                return;
            }
        };

        if !self.registry.contains(from) {
            if let Err(e) = self.open_link(from, Role::Responder, tracks) {
                sink_warn!(self.log, "could not answer {}: {}", from, e);
                return;
            }
        }

        let polite = self.is_polite_toward(from);
        let ttl = self.settings.pending_candidate_ttl;
        let Some(entry) = self.registry.get_mut(from) else {
            return;
        };

        match entry.link.state() {
            LinkState::Offering | LinkState::AwaitingAnswer => {
                if !polite {
                    sink_debug!(
                        self.log,
                        "glare with {}: keeping our offer, ignoring theirs",
                        from
                    );
                    return;
                }
                sink_debug!(self.log, "glare with {}: rolling back our offer", from);
                if let Err(e) = entry.connection.rollback() {
                    self.fail_link(from, e);
                    return;
                }
                // our changes still need their own round
                entry.link.set_renegotiate_pending(true);
            }
            LinkState::New | LinkState::Stable => {}
            state => {
                sink_warn!(self.log, "offer from {} in state {}; dropped", from, state);
                return;
            }
        }

        entry.link.transition(LinkState::Answering);
        let first = !entry.link.ever_stable();
        let answer = match answer_offer(entry, &offer, ttl, &self.log) {
            Ok(a) => a,
            Err(e) => {
                self.fail_link(from, e);
                return;
            }
        };
        let held = entry.link.mark_local_description_sent();
        entry.link.transition(LinkState::Stable);
        let reoffer = entry.link.take_renegotiate_pending();

        self.send(SignalingMsg::Answer {
            from: self.local_id.clone(),
            to: from.clone(),
            sdp: answer.to_payload(),
        });
        for c in &held {
            self.send_candidate(from, c);
        }
        self.reached_stable(from, first);
        if reoffer {
            self.start_offer(from);
        }
    }

    pub fn on_answer(&mut self, from: &SessionId, sdp: Vec<u8>) {
        let answer = SessionDescription::from_payload(SdpKind::Answer, sdp);
        let ttl = self.settings.pending_candidate_ttl;
        let Some(entry) = self.registry.get_mut(from) else {
            sink_debug!(self.log, "answer from unlinked {}; dropped", from);
            return;
        };
        if entry.link.state() != LinkState::AwaitingAnswer {
            sink_warn!(
                self.log,
                "answer from {} in state {}; dropped",
                from,
                entry.link.state()
            );
            return;
        }

        let applied = answer.and_then(|a| apply_remote_description(entry, &a, ttl, &self.log));
        if let Err(e) = applied {
            self.fail_link(from, e);
            return;
        }
        let first = !entry.link.ever_stable();
        entry.link.transition(LinkState::Stable);
        let reoffer = entry.link.take_renegotiate_pending();

        self.reached_stable(from, first);
        if reoffer {
            self.start_offer(from);
        }
    }

    pub fn on_ice(&mut self, from: &SessionId, payload: &[u8]) {
        let candidate = match IceCandidate::from_payload(payload) {
            Ok(c) => c,
            Err(e) => {
                sink_warn!(self.log, "candidate from {} dropped: {}", from, e);
                return;
            }
        };
        let Some(entry) = self.registry.get_mut(from) else {
            sink_debug!(self.log, "candidate from unlinked {}; dropped", from);
            return;
        };
        if entry.link.has_remote_description() {
            if let Err(e) = entry.connection.add_ice_candidate(&candidate) {
                sink_warn!(self.log, "candidate from {} rejected: {}", from, e);
            }
        } else {
            entry.link.queue_remote_candidate(candidate, Instant::now());
            sink_trace!(
                self.log,
                "queued candidate from {} ({} pending)",
                from,
                entry.link.pending_remote_len()
            );
        }
    }

    pub fn on_peer_left(&mut self, session_id: &SessionId) {
        if !self.close_link(session_id, CloseReason::PeerLeft) {
            sink_debug!(self.log, "peer-left for unlinked {}", session_id);
        }
    }

    // ---- Peer connection events -----------------------------------------

    /// A candidate gathered by our side of the link toward `remote_id`.
    pub fn on_local_candidate(&mut self, remote_id: &SessionId, candidate: IceCandidate) {
        let Some(entry) = self.registry.get_mut(remote_id) else {
            return;
        };
        if !entry.link.local_description_sent() {
            entry.link.hold_local(candidate);
            return;
        }
        self.send_candidate(remote_id, &candidate);
    }

    pub fn on_remote_track(&mut self, remote_id: &SessionId, kind: TrackKind, label: String) {
        if self.registry.contains(remote_id) {
            sink_info!(self.log, "{} track from {}", kind, remote_id);
            self.events.push(MeshEvent::RemoteTrack {
                session_id: remote_id.clone(),
                kind,
                label,
            });
        }
    }

    /// The remote side opened its data channel toward us.
    ///
    /// After glare both sides hold a channel of their own. The one created by
    /// the impolite side survives on both ends; the other is closed.
    pub fn on_data_channel(&mut self, remote_id: &SessionId, mut channel: Box<dyn DataChannel>) {
        let polite = self.is_polite_toward(remote_id);
        let Some(entry) = self.registry.get_mut(remote_id) else {
            channel.close();
            return;
        };
        if entry.channel.is_some() && !polite {
            sink_debug!(self.log, "keeping own data channel toward {}", remote_id);
            channel.close();
            return;
        }
        if let Some(mut own) = entry.channel.replace(channel) {
            own.close();
        }
        sink_debug!(self.log, "data channel from {} attached", remote_id);
    }

    pub fn on_connection_failed(&mut self, remote_id: &SessionId, reason: String) {
        sink_warn!(self.log, "connection to {} failed: {}", remote_id, reason);
        self.close_link(remote_id, CloseReason::ConnectionFailed(reason));
    }

    // ---- Local actions ---------------------------------------------------

    /// Mirrors `wanted` onto every link, then renegotiates the links the
    /// policy asks for. Returns how many links were asked to renegotiate.
    pub fn sync_outgoing_tracks(
        &mut self,
        wanted: &OutgoingTracks,
        policy: RenegotiationPolicy,
    ) -> usize {
        let mut failed = Vec::new();
        let mut renegotiate = Vec::new();
        for (id, entry) in self.registry.iter_mut() {
            match apply_tracks(entry, wanted) {
                Ok(delta) => {
                    if policy.should_renegotiate(delta.changed, delta.topology) {
                        renegotiate.push(id.clone());
                    }
                }
                Err(e) => failed.push((id.clone(), e)),
            }
        }
        for (id, e) in failed {
            self.fail_link(&id, e);
        }
        renegotiate.sort();
        for id in &renegotiate {
            self.start_offer(id);
        }
        renegotiate.len()
    }

    /// Offers now on every stable link; deferred on links mid-negotiation.
    pub fn renegotiate_all(&mut self) {
        for id in self.registry.ids() {
            self.start_offer(&id);
        }
    }

    /// Drops queued remote candidates older than the configured lifetime.
    pub fn expire_pending_candidates(&mut self, now: Instant) -> usize {
        let ttl = self.settings.pending_candidate_ttl;
        let mut total = 0;
        for (id, entry) in self.registry.iter_mut() {
            let dropped = entry.link.expire_pending(now, ttl);
            if dropped > 0 {
                sink_warn!(
                    self.log,
                    "dropped {} candidate(s) from {} that waited over {:?}",
                    dropped,
                    id,
                    ttl
                );
            }
            total += dropped;
        }
        total
    }

    /// Closes every link (room exit). Returns how many were closed.
    pub fn leave(&mut self) -> usize {
        let mut drained = self.registry.drain();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        let n = drained.len();
        for (id, entry) in drained {
            self.finish_close(id, entry, CloseReason::LocalLeave);
        }
        n
    }

    /// Removes the link and everything hanging off it. Returns `false` if
    /// there was none.
    pub fn close_link(&mut self, remote_id: &str, reason: CloseReason) -> bool {
        match self.registry.remove(remote_id) {
            Some(entry) => {
                self.finish_close(remote_id.to_string(), entry, reason);
                true
            }
            None => false,
        }
    }

    // ---- Internals ---------------------------------------------------------

    fn finish_close(&mut self, id: SessionId, mut entry: PeerEntry, reason: CloseReason) {
        entry.link.transition(LinkState::Closed);
        if let Some(partial) = &entry.incoming {
            sink_info!(
                self.log,
                "discarding partial transfer {:?} from {} ({}/{} bytes)",
                partial.name(),
                id,
                partial.received(),
                partial.declared_size()
            );
        }
        entry.shutdown();
        sink_info!(self.log, "link to {} closed ({:?})", id, reason);
        self.events.push(MeshEvent::PeerClosed {
            session_id: id,
            reason,
        });
    }

    fn fail_link(&mut self, remote_id: &str, err: NegotiationError) {
        sink_warn!(self.log, "negotiation with {} failed: {}", remote_id, err);
        self.close_link(remote_id, CloseReason::NegotiationFailed(err.to_string()));
    }

    fn open_link(
        &mut self,
        remote_id: &SessionId,
        role: Role,
        tracks: &OutgoingTracks,
    ) -> Result<(), NegotiationError> {
        let connection = self.factory.create(remote_id, &self.settings.stun_server)?;
        let mut entry = PeerEntry::new(PeerLink::new(remote_id.clone(), role), connection);
        if let Err(e) = prepare_entry(&mut entry, role, tracks) {
            entry.shutdown();
            return Err(e);
        }
        if let Err(dup) = self.registry.insert(entry) {
            dup.shutdown();
        }
        sink_info!(self.log, "opened link to {} as {:?}", remote_id, role);
        Ok(())
    }

    fn start_offer(&mut self, remote_id: &str) {
        let Some(entry) = self.registry.get_mut(remote_id) else {
            return;
        };
        match entry.link.state() {
            LinkState::New | LinkState::Stable => {}
            LinkState::Closed => return,
            state => {
                sink_debug!(
                    self.log,
                    "renegotiation with {} deferred (state {})",
                    remote_id,
                    state
                );
                entry.link.set_renegotiate_pending(true);
                return;
            }
        }

        entry.link.set_renegotiate_pending(false);
        entry.link.transition(LinkState::Offering);
        let offer = match create_local_offer(entry.connection.as_mut()) {
            Ok(o) => o,
            Err(e) => {
                self.fail_link(remote_id, e);
                return;
            }
        };
        entry.link.transition(LinkState::AwaitingAnswer);
        let held = entry.link.mark_local_description_sent();

        self.send(SignalingMsg::Offer {
            from: self.local_id.clone(),
            to: remote_id.to_string(),
            sdp: offer.to_payload(),
        });
        for c in &held {
            self.send_candidate(remote_id, c);
        }
    }

    fn reached_stable(&mut self, remote_id: &SessionId, first: bool) {
        let session_id = remote_id.clone();
        if first {
            sink_info!(self.log, "link to {} is stable", remote_id);
            self.events.push(MeshEvent::PeerConnected { session_id });
        } else {
            sink_debug!(self.log, "link to {} renegotiated", remote_id);
            self.events.push(MeshEvent::Renegotiated { session_id });
        }
    }

    fn send_candidate(&self, remote_id: &str, candidate: &IceCandidate) {
        match candidate.to_payload() {
            Ok(payload) => self.send(SignalingMsg::Ice {
                from: self.local_id.clone(),
                to: remote_id.to_string(),
                candidate: payload,
            }),
            Err(e) => sink_warn!(self.log, "could not encode candidate: {}", e),
        }
    }

    fn send(&self, msg: SignalingMsg) {
        let name = msg.name();
        if let Err(e) = self.outbox.send_signal(msg) {
            sink_warn!(self.log, "could not send {} to relay: {}", name, e);
        }
    }
}

fn prepare_entry(
    entry: &mut PeerEntry,
    role: Role,
    tracks: &OutgoingTracks,
) -> Result<(), NegotiationError> {
    for track in tracks.iter() {
        entry.connection.add_track(track)?;
        entry.link.set_outgoing(track.clone());
    }
    if role == Role::Initiator {
        entry.channel = Some(entry.connection.create_data_channel(FILE_CHANNEL_LABEL)?);
    }
    Ok(())
}

fn create_local_offer(pc: &mut dyn PeerConnection) -> Result<SessionDescription, NegotiationError> {
    let offer = pc.create_offer()?;
    pc.set_local_description(&offer)?;
    Ok(offer)
}

/// Applies a remote description, then flushes the candidates that were
/// waiting for it in arrival order.
fn apply_remote_description(
    entry: &mut PeerEntry,
    desc: &SessionDescription,
    ttl: Duration,
    log: &Arc<dyn LogSink>,
) -> Result<(), NegotiationError> {
    entry.connection.set_remote_description(desc)?;
    entry.link.mark_remote_description();

    let (fresh, expired) = entry.link.take_pending(Instant::now(), ttl);
    if expired > 0 {
        sink_warn!(
            log,
            "dropped {} expired candidate(s) from {}",
            expired,
            entry.link.remote_id()
        );
    }
    for c in &fresh {
        if let Err(e) = entry.connection.add_ice_candidate(c) {
            sink_warn!(
                log,
                "queued candidate from {} rejected: {}",
                entry.link.remote_id(),
                e
            );
        }
    }
    Ok(())
}

fn answer_offer(
    entry: &mut PeerEntry,
    offer: &SessionDescription,
    ttl: Duration,
    log: &Arc<dyn LogSink>,
) -> Result<SessionDescription, NegotiationError> {
    apply_remote_description(entry, offer, ttl, log)?;
    let answer = entry.connection.create_answer()?;
    entry.connection.set_local_description(&answer)?;
    Ok(answer)
}

fn apply_tracks(
    entry: &mut PeerEntry,
    wanted: &OutgoingTracks,
) -> Result<TrackDelta, NegotiationError> {
    let mut delta = TrackDelta::default();
    for kind in TrackKind::ALL {
        let current = entry.link.outgoing(kind).cloned();
        match (current, wanted.get(kind)) {
            (Some(cur), Some(want)) if Arc::ptr_eq(&cur, want) => {}
            (Some(_), Some(want)) => {
                entry.connection.replace_track(kind, want)?;
                entry.link.set_outgoing(want.clone());
                delta.changed = true;
            }
            (None, Some(want)) => {
                entry.connection.add_track(want)?;
                entry.link.set_outgoing(want.clone());
                delta.changed = true;
                delta.topology = true;
            }
            (Some(_), None) => {
                entry.connection.remove_track(kind)?;
                entry.link.clear_outgoing(kind);
                delta.changed = true;
                delta.topology = true;
            }
            (None, None) => {}
        }
    }
    Ok(delta)
}
