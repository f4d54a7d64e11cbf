//! Seams to the peer-connection stack. The mesh never talks to ICE, DTLS or
//! codecs directly; an adapter implements these traits and feeds its
//! asynchronous notifications back as [`PeerEvent`]s.
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::file_transfer::TransferError;
use crate::media::track::{LocalTrack, TrackKind};
use crate::mesh::errors::NegotiationError;
use crate::signaling::protocol::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Relay payload: the SDP text; the kind travels in the message type.
    pub fn to_payload(&self) -> Vec<u8> {
        self.sdp.as_bytes().to_vec()
    }

    pub fn from_payload(kind: SdpKind, payload: Vec<u8>) -> Result<Self, NegotiationError> {
        let sdp = String::from_utf8(payload).map_err(|_| NegotiationError::MalformedDescription)?;
        if sdp.trim().is_empty() {
            return Err(NegotiationError::MalformedDescription);
        }
        Ok(Self { kind, sdp })
    }
}

/// A trickled candidate, relayed as `RTCIceCandidateInit`-shaped JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, NegotiationError> {
        serde_json::to_vec(self).map_err(|e| NegotiationError::MalformedCandidate(e.to_string()))
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, NegotiationError> {
        serde_json::from_slice(payload)
            .map_err(|e| NegotiationError::MalformedCandidate(e.to_string()))
    }
}

/// One peer connection as seen by the mesh. Description calls complete
/// synchronously; everything the connection learns later arrives as a
/// [`PeerEvent`].
pub trait PeerConnection: Send {
    fn add_track(&mut self, track: &Arc<LocalTrack>) -> Result<(), NegotiationError>;
    /// Swaps the sender of `kind` to `track` without renegotiation.
    fn replace_track(&mut self, kind: TrackKind, track: &Arc<LocalTrack>)
    -> Result<(), NegotiationError>;
    fn remove_track(&mut self, kind: TrackKind) -> Result<(), NegotiationError>;

    fn create_offer(&mut self) -> Result<SessionDescription, NegotiationError>;
    fn create_answer(&mut self) -> Result<SessionDescription, NegotiationError>;
    fn set_local_description(&mut self, desc: &SessionDescription) -> Result<(), NegotiationError>;
    fn set_remote_description(&mut self, desc: &SessionDescription)
    -> Result<(), NegotiationError>;
    /// Discards a local offer that has not been answered.
    fn rollback(&mut self) -> Result<(), NegotiationError>;
    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), NegotiationError>;

    fn create_data_channel(&mut self, label: &str) -> Result<Box<dyn DataChannel>, NegotiationError>;
    fn close(&mut self);
}

pub trait PeerConnectionFactory: Send {
    fn create(
        &mut self,
        remote_id: &SessionId,
        stun_server: &str,
    ) -> Result<Box<dyn PeerConnection>, NegotiationError>;
}

/// Reliable, ordered message channel riding on a peer connection.
pub trait DataChannel: Send {
    fn label(&self) -> &str;
    fn is_open(&self) -> bool;
    fn send_text(&mut self, text: &str) -> Result<(), TransferError>;
    fn send_binary(&mut self, data: Bytes) -> Result<(), TransferError>;
    /// Bytes queued but not yet handed to the network.
    fn buffered_amount(&self) -> usize;
    fn close(&mut self);
}

/// Messages read from a data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMessage {
    Text(String),
    Binary(Bytes),
}

/// Notifications from one peer connection, tagged by the session loop with
/// the remote id they belong to.
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack { kind: TrackKind, label: String },
    /// The remote side opened a data channel toward us.
    DataChannel(Box<dyn DataChannel>),
    ChannelOpen,
    Message(DataMessage),
    /// The channel's buffered amount fell below its low-water mark.
    BufferedAmountLow,
    ConnectionFailed(String),
}

impl std::fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerEvent::LocalCandidate(_) => write!(f, "LocalCandidate"),
            PeerEvent::RemoteTrack { kind, .. } => write!(f, "RemoteTrack({kind})"),
            PeerEvent::DataChannel(ch) => write!(f, "DataChannel({})", ch.label()),
            PeerEvent::ChannelOpen => write!(f, "ChannelOpen"),
            PeerEvent::Message(DataMessage::Text(_)) => write!(f, "Message(text)"),
            PeerEvent::Message(DataMessage::Binary(b)) => write!(f, "Message({} bytes)", b.len()),
            PeerEvent::BufferedAmountLow => write!(f, "BufferedAmountLow"),
            PeerEvent::ConnectionFailed(e) => write!(f, "ConnectionFailed({e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn candidate_payload_is_camel_case_json() {
        let c = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        };
        let payload = c.to_payload().unwrap();
        let text = String::from_utf8(payload.clone()).unwrap();
        assert!(text.contains("\"sdpMid\":\"0\""));
        assert!(text.contains("\"sdpMLineIndex\":0"));
        assert_eq!(IceCandidate::from_payload(&payload).unwrap(), c);
    }

    #[test]
    fn bad_payloads_are_rejected() {
        assert!(matches!(
            SessionDescription::from_payload(SdpKind::Offer, vec![0xff, 0xfe]),
            Err(NegotiationError::MalformedDescription)
        ));
        assert!(matches!(
            SessionDescription::from_payload(SdpKind::Answer, b"  ".to_vec()),
            Err(NegotiationError::MalformedDescription)
        ));
        assert!(matches!(
            IceCandidate::from_payload(b"{}"),
            Err(NegotiationError::MalformedCandidate(_))
        ));
    }
}
