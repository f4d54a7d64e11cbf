//! In-memory peer connection, data channel and factory. They record every
//! call for inspection through a cloneable probe and never touch the network;
//! used by the crate's tests and for dry runs without a media stack.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::file_transfer::TransferError;
use crate::media::track::{LocalTrack, TrackKind};
use crate::mesh::errors::NegotiationError;
use crate::mesh::transport::{
    DataChannel, DataMessage, IceCandidate, PeerConnection, PeerConnectionFactory, SdpKind,
    SessionDescription,
};
use crate::signaling::protocol::SessionId;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---- Data channel ---------------------------------------------------------

#[derive(Debug, Default)]
struct ChannelState {
    open: bool,
    closed: bool,
    sent: Vec<DataMessage>,
    buffered: usize,
    binary_bytes: usize,
}

/// Channel whose sends stay "buffered" until the probe drains them.
pub struct MockDataChannel {
    label: String,
    state: Arc<Mutex<ChannelState>>,
}

impl MockDataChannel {
    pub fn open(label: &str) -> Self {
        let ch = Self::connecting(label);
        lock(&ch.state).open = true;
        ch
    }

    pub fn connecting(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: Arc::new(Mutex::new(ChannelState::default())),
        }
    }

    pub fn probe(&self) -> MockChannelProbe {
        MockChannelProbe {
            state: self.state.clone(),
        }
    }
}

impl DataChannel for MockDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        let st = lock(&self.state);
        st.open && !st.closed
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransferError> {
        if !self.is_open() {
            return Err(TransferError::ChannelClosed);
        }
        lock(&self.state).sent.push(DataMessage::Text(text.to_string()));
        Ok(())
    }

    fn send_binary(&mut self, data: Bytes) -> Result<(), TransferError> {
        if !self.is_open() {
            return Err(TransferError::ChannelClosed);
        }
        let mut st = lock(&self.state);
        st.buffered += data.len();
        st.binary_bytes += data.len();
        st.sent.push(DataMessage::Binary(data));
        Ok(())
    }

    fn buffered_amount(&self) -> usize {
        lock(&self.state).buffered
    }

    fn close(&mut self) {
        lock(&self.state).closed = true;
    }
}

#[derive(Clone)]
pub struct MockChannelProbe {
    state: Arc<Mutex<ChannelState>>,
}

impl MockChannelProbe {
    pub fn sent(&self) -> Vec<DataMessage> {
        lock(&self.state).sent.clone()
    }

    /// Removes and returns everything sent so far.
    pub fn take_sent(&self) -> Vec<DataMessage> {
        std::mem::take(&mut lock(&self.state).sent)
    }

    pub fn binary_bytes(&self) -> usize {
        lock(&self.state).binary_bytes
    }

    /// Simulates the network draining the send buffer.
    pub fn drain_buffer(&self) {
        lock(&self.state).buffered = 0;
    }

    pub fn set_open(&self, open: bool) {
        lock(&self.state).open = open;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

// ---- Peer connection ------------------------------------------------------

#[derive(Default)]
struct PcState {
    tracks: BTreeMap<TrackKind, Arc<LocalTrack>>,
    has_channel: bool,
    revision: u32,
    local_offer_pending: bool,
    local_descriptions: Vec<SessionDescription>,
    remote_descriptions: Vec<SessionDescription>,
    candidates: Vec<IceCandidate>,
    rollbacks: u32,
    closed: bool,
    channels: Vec<MockChannelProbe>,
    fail_op: Option<&'static str>,
}

impl PcState {
    fn check(&mut self, op: &'static str) -> Result<(), NegotiationError> {
        if self.closed {
            return Err(NegotiationError::adapter(op, "connection closed"));
        }
        if self.fail_op == Some(op) {
            self.fail_op = None;
            return Err(NegotiationError::adapter(op, "injected failure"));
        }
        Ok(())
    }

    fn describe(&mut self, kind: &str) -> String {
        self.revision += 1;
        let mut sdp = format!("v=0\r\ns={kind} {}\r\n", self.revision);
        for (k, t) in &self.tracks {
            sdp.push_str(&format!("m={k}\r\na=msid:{}\r\n", t.label()));
        }
        if self.has_channel {
            sdp.push_str("m=application\r\n");
        }
        sdp
    }
}

/// Peer connection that produces `v=0` descriptions listing its track kinds.
pub struct MockPeerConnection {
    state: Arc<Mutex<PcState>>,
}

impl MockPeerConnection {
    pub fn new(_remote_id: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(PcState::default())),
        }
    }

    pub fn probe(&self) -> MockPcProbe {
        MockPcProbe {
            state: self.state.clone(),
        }
    }
}

impl PeerConnection for MockPeerConnection {
    fn add_track(&mut self, track: &Arc<LocalTrack>) -> Result<(), NegotiationError> {
        let mut st = lock(&self.state);
        st.check("add_track")?;
        st.tracks.insert(track.kind(), track.clone());
        Ok(())
    }

    fn replace_track(
        &mut self,
        kind: TrackKind,
        track: &Arc<LocalTrack>,
    ) -> Result<(), NegotiationError> {
        let mut st = lock(&self.state);
        st.check("replace_track")?;
        if !st.tracks.contains_key(&kind) {
            return Err(NegotiationError::adapter("replace_track", "no sender"));
        }
        st.tracks.insert(kind, track.clone());
        Ok(())
    }

    fn remove_track(&mut self, kind: TrackKind) -> Result<(), NegotiationError> {
        let mut st = lock(&self.state);
        st.check("remove_track")?;
        st.tracks.remove(&kind);
        Ok(())
    }

    fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError> {
        let mut st = lock(&self.state);
        st.check("create_offer")?;
        Ok(SessionDescription::offer(st.describe("offer")))
    }

    fn create_answer(&mut self) -> Result<SessionDescription, NegotiationError> {
        let mut st = lock(&self.state);
        st.check("create_answer")?;
        Ok(SessionDescription::answer(st.describe("answer")))
    }

    fn set_local_description(&mut self, desc: &SessionDescription) -> Result<(), NegotiationError> {
        let mut st = lock(&self.state);
        st.check("set_local_description")?;
        st.local_offer_pending = desc.kind == SdpKind::Offer;
        st.local_descriptions.push(desc.clone());
        Ok(())
    }

    fn set_remote_description(
        &mut self,
        desc: &SessionDescription,
    ) -> Result<(), NegotiationError> {
        let mut st = lock(&self.state);
        st.check("set_remote_description")?;
        if !desc.sdp.starts_with("v=0") {
            return Err(NegotiationError::adapter(
                "set_remote_description",
                "unparseable sdp",
            ));
        }
        if desc.kind == SdpKind::Offer && st.local_offer_pending {
            return Err(NegotiationError::adapter(
                "set_remote_description",
                "offer in have-local-offer",
            ));
        }
        if desc.kind == SdpKind::Answer {
            st.local_offer_pending = false;
        }
        st.remote_descriptions.push(desc.clone());
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), NegotiationError> {
        let mut st = lock(&self.state);
        st.check("rollback")?;
        st.local_offer_pending = false;
        st.rollbacks += 1;
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), NegotiationError> {
        let mut st = lock(&self.state);
        st.check("add_ice_candidate")?;
        if st.remote_descriptions.is_empty() {
            return Err(NegotiationError::adapter(
                "add_ice_candidate",
                "no remote description",
            ));
        }
        st.candidates.push(candidate.clone());
        Ok(())
    }

    fn create_data_channel(&mut self, label: &str) -> Result<Box<dyn DataChannel>, NegotiationError> {
        let mut st = lock(&self.state);
        st.check("create_data_channel")?;
        let ch = MockDataChannel::connecting(label);
        st.channels.push(ch.probe());
        st.has_channel = true;
        Ok(Box::new(ch))
    }

    fn close(&mut self) {
        let mut st = lock(&self.state);
        st.closed = true;
        for ch in &st.channels {
            lock(&ch.state).closed = true;
        }
    }
}

#[derive(Clone)]
pub struct MockPcProbe {
    state: Arc<Mutex<PcState>>,
}

impl MockPcProbe {
    pub fn local_descriptions(&self) -> Vec<SessionDescription> {
        lock(&self.state).local_descriptions.clone()
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        lock(&self.state).remote_descriptions.clone()
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        lock(&self.state).candidates.clone()
    }

    pub fn outgoing(&self, kind: TrackKind) -> Option<Arc<LocalTrack>> {
        lock(&self.state).tracks.get(&kind).cloned()
    }

    pub fn rollbacks(&self) -> u32 {
        lock(&self.state).rollbacks
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn channels(&self) -> Vec<MockChannelProbe> {
        lock(&self.state).channels.clone()
    }

    /// Makes the next call of `op` fail.
    pub fn fail_next(&self, op: &'static str) {
        lock(&self.state).fail_op = Some(op);
    }
}

// ---- Factory --------------------------------------------------------------

#[derive(Default)]
struct FactoryState {
    created: Vec<(SessionId, MockPcProbe)>,
    fail_next: bool,
}

/// Factory handing out [`MockPeerConnection`]s; clones share the record of
/// what was created.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection created toward `remote_id`, oldest first.
    pub fn probes_for(&self, remote_id: &str) -> Vec<MockPcProbe> {
        lock(&self.state)
            .created
            .iter()
            .filter(|(id, _)| id == remote_id)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Latest connection toward `remote_id`.
    pub fn probe(&self, remote_id: &str) -> Option<MockPcProbe> {
        self.probes_for(remote_id).pop()
    }

    pub fn created_count(&self) -> usize {
        lock(&self.state).created.len()
    }

    pub fn fail_next_create(&self) {
        lock(&self.state).fail_next = true;
    }
}

impl PeerConnectionFactory for MockFactory {
    fn create(
        &mut self,
        remote_id: &SessionId,
        _stun_server: &str,
    ) -> Result<Box<dyn PeerConnection>, NegotiationError> {
        let mut st = lock(&self.state);
        if std::mem::take(&mut st.fail_next) {
            return Err(NegotiationError::Factory("injected failure".into()));
        }
        let pc = MockPeerConnection::new(remote_id);
        st.created.push((remote_id.clone(), pc.probe()));
        Ok(Box::new(pc))
    }
}
