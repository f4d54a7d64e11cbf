// ---- Public message enum --------------------------------------------------

use crate::signaling::protocol::{RoomId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMsg {
    // Handshake
    Hello {
        client_version: String,
        origin: String,
    },
    Welcome {
        session_id: SessionId,
    },
    HelloErr {
        code: u16, // maps from HelloErrorCode
    },

    // Room membership
    JoinRoom {
        room_id: RoomId,
    },
    /// Reply to the joiner only: everyone else already in the room.
    AllUsers {
        room_id: RoomId,
        session_ids: Vec<SessionId>,
    },
    JoinErr {
        code: u16, // maps from JoinErrorCode
    },
    LeaveRoom,
    /// The only broadcast the relay performs.
    PeerLeft {
        session_id: SessionId,
    },

    // Directed signaling. `to` is filled by the sender, `from` is stamped by
    // the relay; `sdp` and `candidate` are opaque and relayed verbatim.
    Offer {
        from: SessionId,
        to: SessionId,
        sdp: Vec<u8>,
    },
    Answer {
        from: SessionId,
        to: SessionId,
        sdp: Vec<u8>,
    },
    Ice {
        from: SessionId,
        to: SessionId,
        candidate: Vec<u8>,
    },

    // Keepalive
    Ping {
        nonce: u64,
    },
    Pong {
        nonce: u64,
    },
}

impl SignalingMsg {
    /// Short variant name for logging; never includes SDP or candidate text.
    pub fn name(&self) -> &'static str {
        use SignalingMsg::*;
        match self {
            Hello { .. } => "Hello",
            Welcome { .. } => "Welcome",
            HelloErr { .. } => "HelloErr",
            JoinRoom { .. } => "JoinRoom",
            AllUsers { .. } => "AllUsers",
            JoinErr { .. } => "JoinErr",
            LeaveRoom => "LeaveRoom",
            PeerLeft { .. } => "PeerLeft",
            Offer { .. } => "Offer",
            Answer { .. } => "Answer",
            Ice { .. } => "Ice",
            Ping { .. } => "Ping",
            Pong { .. } => "Pong",
        }
    }
}
