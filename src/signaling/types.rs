use crate::signaling::protocol::SignalingMsg;

/// Internal identifier for a connected client (one TCP connection).
pub type ClientId = u64;

/// A message the relay wants to send to a client.
#[derive(Debug)]
pub struct OutgoingMsg {
    pub client_id_target: ClientId,
    pub msg: SignalingMsg,
}
