use crate::signaling::protocol::SignalingMsg;

/// Events produced by the signaling client's reader thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// A message delivered by the relay (`Pong` is swallowed by the client).
    Message(SignalingMsg),
    /// The relay connection is gone; no further events follow.
    Disconnected { reason: String },
}
