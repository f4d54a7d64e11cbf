use crate::signaling::protocol::SignalingMsg;

/// Commands issued by the session into the signaling client's writer thread.
#[derive(Debug)]
pub enum SignalingCommand {
    Send(SignalingMsg),
    Disconnect,
}
